//! # matrix-core
//!
//! Shared library for Matrix-Over-IP containing the pixel framebuffer, the
//! LED panel geometry, and the binary request/response protocol.
//!
//! This crate is used by both the server (`matrixd`) and the client proxy.
//! It has zero dependencies on OS APIs, hardware drivers, or network sockets.
//!
//! # Architecture overview
//!
//! Matrix-Over-IP turns an RGB LED matrix into a network framebuffer.  One
//! server process owns the panel; a remote client keeps a local copy of the
//! pixels and ships the whole frame over TCP whenever it wants the panel to
//! show it.
//!
//! - **`domain`** – Pure data types: [`Rgba`] colours, the panel
//!   [`Geometry`] (rows × columns × chain length × parallel chains) and the
//!   dense [`Framebuffer`] grid.
//!
//! - **`protocol`** – How bytes travel over the network.  Requests and replies
//!   are encoded into a compact binary format (16-byte header + payload) and
//!   decoded back into [`MatrixMessage`] values on the other end.

pub mod domain;
pub mod protocol;

pub use domain::color::Rgba;
pub use domain::framebuffer::{Framebuffer, FramebufferError};
pub use domain::geometry::{Geometry, GeometryError, Size};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::MatrixMessage;
