//! matrix-client library entry point.
//!
//! A [`RemoteMatrix`](infrastructure::remote::RemoteMatrix) looks like a local
//! framebuffer: drawing calls only touch an in-memory mirror.  `swap()` ships
//! the whole mirror to `matrixd`, which presents it on the panel at the next
//! vertical sync.

/// Infrastructure layer: the TCP proxy for a remote display.
pub mod infrastructure;
