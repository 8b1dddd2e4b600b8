//! Application layer for the display server.
//!
//! - **`service`** – The one place that touches the display adapter.  Every
//!   operation takes the same lock, so at most one panel operation is ever in
//!   flight.
//! - **`idle`** – The pattern shown between sessions.

pub mod idle;
pub mod service;
