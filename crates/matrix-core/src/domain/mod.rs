//! Domain entities for Matrix-Over-IP.
//!
//! Everything in here is plain data plus the rules that keep it valid.  There
//! are no imports from hardware bindings, sockets, or async runtimes, so the
//! types can be tested on any machine without a panel attached.

pub mod color;
pub mod framebuffer;

/// Panel arrangement and the pixel size derived from it.
///
/// See [`geometry::Geometry`] for the main type.
pub mod geometry;
