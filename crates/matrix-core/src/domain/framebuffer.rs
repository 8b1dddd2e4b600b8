//! Dense, origin-anchored pixel grid.
//!
//! A [`Framebuffer`] is the unit of exchange between every component: the
//! server's display adapter keeps one as its back canvas, the remote proxy
//! keeps one as its local mirror, and a `PresentFrame` request carries one over
//! the wire.
//!
//! # Out-of-range writes
//!
//! [`Framebuffer::set`] silently ignores coordinates outside the canvas, which
//! is what drawing code usually wants (lines and shapes may be clipped by the
//! panel edge).  Callers that need to know use [`Framebuffer::try_set`], which
//! reports [`FramebufferError::OutOfBounds`].  Neither ever touches an
//! in-bounds pixel when given an out-of-range coordinate.
//!
//! The type has no interior synchronisation; the owning component decides how
//! it is shared.

use thiserror::Error;
use tracing::trace;

use crate::domain::color::Rgba;
use crate::domain::geometry::{Geometry, GeometryError, Size};

/// Errors produced when building or writing a framebuffer.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum FramebufferError {
    /// The requested dimensions do not describe a positive-area canvas.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),

    /// A checked write landed outside the canvas.
    #[error("pixel ({x}, {y}) is outside the {size} canvas")]
    OutOfBounds { x: i32, y: i32, size: Size },

    /// A pixel vector does not match the declared dimensions.
    #[error("expected {expected} pixels for a {size} canvas, got {actual}")]
    PixelCountMismatch {
        size: Size,
        expected: usize,
        actual: usize,
    },
}

/// Rectangular grid of [`Rgba`] pixels stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framebuffer {
    size: Size,
    pixels: Vec<Rgba>,
}

impl Framebuffer {
    /// Allocates a `width` × `height` canvas with every pixel black.
    ///
    /// # Errors
    ///
    /// Returns [`FramebufferError::InvalidGeometry`] if either side is zero.
    pub fn new(width: u32, height: u32) -> Result<Self, FramebufferError> {
        Self::with_size(Size::new(width, height))
    }

    /// Allocates a black canvas of the given size.
    ///
    /// # Errors
    ///
    /// Returns [`FramebufferError::InvalidGeometry`] if either side is zero.
    pub fn with_size(size: Size) -> Result<Self, FramebufferError> {
        let size = size.validate()?;
        let area = size.width as usize * size.height as usize;
        Ok(Self {
            size,
            pixels: vec![Rgba::BLACK; area],
        })
    }

    /// Allocates a black canvas sized to the panel arrangement.
    ///
    /// # Errors
    ///
    /// Returns [`FramebufferError::InvalidGeometry`] for zero or overflowing
    /// geometry fields.
    pub fn from_geometry(geometry: &Geometry) -> Result<Self, FramebufferError> {
        Self::with_size(geometry.size()?)
    }

    /// Adopts an existing row-major pixel vector.
    ///
    /// # Errors
    ///
    /// Returns [`FramebufferError::InvalidGeometry`] for a zero side and
    /// [`FramebufferError::PixelCountMismatch`] if `pixels.len()` is not
    /// `width * height`.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Rgba>) -> Result<Self, FramebufferError> {
        let size = Size::new(width, height).validate()?;
        let expected = size.width as usize * size.height as usize;
        if pixels.len() != expected {
            return Err(FramebufferError::PixelCountMismatch {
                size,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self { size, pixels })
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    /// Row-major view of every pixel.
    pub fn pixels(&self) -> &[Rgba] {
        &self.pixels
    }

    /// Iterates over rows, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[Rgba]> {
        self.pixels.chunks_exact(self.size.width as usize)
    }

    /// Returns the pixel at `(x, y)`, or `None` if the coordinate is outside
    /// the canvas.
    pub fn get(&self, x: i32, y: i32) -> Option<Rgba> {
        self.index(x, y).map(|i| self.pixels[i])
    }

    /// Sets the pixel at `(x, y)`; out-of-range coordinates are ignored.
    pub fn set(&mut self, x: i32, y: i32, color: Rgba) {
        match self.index(x, y) {
            Some(i) => self.pixels[i] = color,
            None => trace!("ignoring write outside {} canvas at ({x}, {y})", self.size),
        }
    }

    /// Sets the pixel at `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns [`FramebufferError::OutOfBounds`] without modifying the canvas
    /// if the coordinate is outside it.
    pub fn try_set(&mut self, x: i32, y: i32, color: Rgba) -> Result<(), FramebufferError> {
        let i = self.index(x, y).ok_or(FramebufferError::OutOfBounds {
            x,
            y,
            size: self.size,
        })?;
        self.pixels[i] = color;
        Ok(())
    }

    /// Sets every pixel to `color`.
    pub fn fill(&mut self, color: Rgba) {
        self.pixels.fill(color);
    }

    /// Sets every pixel to black.
    pub fn clear(&mut self) {
        self.fill(Rgba::BLACK);
    }

    /// Copies `other` onto this canvas, anchored at the origin.  Only the
    /// overlapping region is written.
    pub fn copy_from(&mut self, other: &Framebuffer) {
        let width = self.size.width.min(other.size.width) as usize;
        let height = self.size.height.min(other.size.height) as usize;
        for y in 0..height {
            let dst = y * self.size.width as usize;
            let src = y * other.size.width as usize;
            self.pixels[dst..dst + width].copy_from_slice(&other.pixels[src..src + width]);
        }
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if !self.size.contains(x, y) {
            return None;
        }
        Some(y as usize * self.size.width as usize + x as usize)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
