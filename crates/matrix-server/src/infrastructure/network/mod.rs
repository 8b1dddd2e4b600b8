//! Network infrastructure: the single-connection session loop.

pub mod session_loop;

pub use session_loop::{SessionLoop, SessionState};
