//! Serialised access to the display.
//!
//! [`MatrixService`] is the only owner of the [`DisplayAdapter`].  Every
//! operation that touches the adapter holds one mutex for its whole duration,
//! so at most one panel operation is in flight no matter how many callers
//! there are.  The display size is cached at construction and read without
//! the lock.  Operations
//! are synchronous and may block for one refresh period in `present`; async
//! callers run them on the blocking pool.
//!
//! [`MatrixService::dispatch`] maps a decoded protocol request onto these
//! operations and always produces a reply, never a panic.

use std::sync::{Mutex, MutexGuard};

use matrix_core::protocol::messages::{ErrorCode, MatrixMessage};
use matrix_core::{Framebuffer, Rgba, Size};
use thiserror::Error;
use tracing::{debug, warn};

use crate::infrastructure::display::{DisplayAdapter, DisplayError};

/// Errors surfaced by service operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// A full frame did not match the display size.
    #[error("frame is {actual} but the display is {expected}")]
    GeometryMismatch { expected: Size, actual: Size },

    #[error(transparent)]
    Display(#[from] DisplayError),
}

impl ServiceError {
    /// Wire code reported to the client.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServiceError::GeometryMismatch { .. } => ErrorCode::GeometryMismatch,
            ServiceError::Display(DisplayError::OutOfBounds { .. }) => ErrorCode::OutOfBounds,
            ServiceError::Display(_) => ErrorCode::DisplayFault,
        }
    }
}

/// Lock-guarded owner of the display adapter.
#[derive(Debug)]
pub struct MatrixService {
    adapter: Mutex<DisplayAdapter>,
    size: Size,
}

impl MatrixService {
    pub fn new(adapter: DisplayAdapter) -> Self {
        let size = adapter.bounds();
        Self {
            adapter: Mutex::new(adapter),
            size,
        }
    }

    /// Display size.  Never changes and needs no lock.
    pub fn query_geometry(&self) -> Size {
        self.size
    }

    pub fn clear(&self) {
        self.lock().clear_canvas();
    }

    pub fn fill(&self, color: Rgba) {
        self.lock().fill_canvas(color);
    }

    /// Writes one back-canvas pixel; nothing becomes visible until a present.
    ///
    /// # Errors
    ///
    /// [`DisplayError::OutOfBounds`] for coordinates outside the display.
    pub fn write_pixel(&self, x: i32, y: i32, color: Rgba) -> Result<(), ServiceError> {
        self.lock().write_pixel(x, y, color)?;
        Ok(())
    }

    /// Back-canvas read-back.
    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba> {
        self.lock().pixel(x, y)
    }

    /// Draws `frame` onto the back canvas and presents it.
    ///
    /// # Errors
    ///
    /// [`ServiceError::GeometryMismatch`] if the frame is not exactly the
    /// display size; the back canvas and the panel are left untouched.
    pub fn present_frame(&self, frame: &Framebuffer) -> Result<(), ServiceError> {
        if frame.size() != self.size {
            return Err(ServiceError::GeometryMismatch {
                expected: self.size,
                actual: frame.size(),
            });
        }
        let mut adapter = self.lock();
        adapter.draw_buffer(frame);
        adapter.present()?;
        Ok(())
    }

    pub fn present(&self) -> Result<(), ServiceError> {
        self.lock().present()?;
        Ok(())
    }

    /// Clears the canvas, draws `pattern` and presents it, all under one
    /// lock acquisition.
    pub fn show_idle(&self, pattern: &Framebuffer) -> Result<(), ServiceError> {
        let mut adapter = self.lock();
        adapter.clear_canvas();
        adapter.draw_buffer(pattern);
        adapter.present()?;
        Ok(())
    }

    /// Executes one request and builds its reply.
    pub fn dispatch(&self, request: &MatrixMessage) -> MatrixMessage {
        let result = match request {
            MatrixMessage::QueryGeometry => return MatrixMessage::Geometry(self.query_geometry()),
            MatrixMessage::PresentFrame(frame) => self.present_frame(frame),
            MatrixMessage::Clear => {
                self.clear();
                Ok(())
            }
            MatrixMessage::Fill(color) => {
                self.fill(*color);
                Ok(())
            }
            MatrixMessage::WritePixel(p) => self.write_pixel(p.x, p.y, p.color),
            MatrixMessage::Present => self.present(),
            reply @ (MatrixMessage::Geometry(_) | MatrixMessage::Ack | MatrixMessage::Error(_)) => {
                return MatrixMessage::error(
                    ErrorCode::InvalidMessage,
                    format!("{:?} is a reply, not a request", reply.message_type()),
                );
            }
        };

        match result {
            Ok(()) => MatrixMessage::Ack,
            Err(e) => {
                debug!("{:?} rejected: {e}", request.message_type());
                MatrixMessage::error(e.code(), e.to_string())
            }
        }
    }

    /// Releases the display.
    ///
    /// # Errors
    ///
    /// Propagates a driver failure reported while closing.
    pub fn shutdown(self) -> Result<(), DisplayError> {
        let adapter = self
            .adapter
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        adapter.close()
    }

    fn lock(&self) -> MutexGuard<'_, DisplayAdapter> {
        self.adapter.lock().unwrap_or_else(|poisoned| {
            warn!("display lock was poisoned by a panicking holder; recovering");
            poisoned.into_inner()
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
