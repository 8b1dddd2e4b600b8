//! Infrastructure layer for the display server.
//!
//! Contains the panel driver seam (with an in-memory headless backend), the
//! TCP session loop and TOML configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `matrix_core`; the `application` layer only sees the display adapter.

pub mod display;
pub mod network;
pub mod storage;
