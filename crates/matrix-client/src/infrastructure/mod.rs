//! Infrastructure layer for the client.

pub mod remote;
