//! matrix-server library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the `matrixd` binary share the same module tree.
//!
//! # What does matrixd do?
//!
//! The server owns the LED panel.  It keeps a back canvas that requests draw
//! into, publishes it to the panel on `Present`, and shows a dim idle pattern
//! whenever nobody is connected.  Exactly one client is served at a time; the
//! next one waits in the listen backlog until the current session ends.

/// Application layer: the serialised matrix service and the idle pattern.
pub mod application;

/// Infrastructure layer: display driver seam, TCP session loop, config file.
pub mod infrastructure;
