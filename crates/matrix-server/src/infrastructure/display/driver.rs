//! Panel driver seam.
//!
//! A real RGB matrix is driven by a board-specific library that owns two
//! hardware canvases: the one being scanned out and an off-screen one that
//! can be written freely.  [`MatrixDriver`] captures exactly that contract;
//! [`MatrixBackend`] is the factory that opens a driver for a set of
//! [`MatrixOptions`].
//!
//! # Testability
//!
//! The server binary uses [`super::HeadlessBackend`] unless a hardware backend
//! is linked in.  Unit tests use the `mockall`-generated `MockMatrixDriver`.

use matrix_core::{Geometry, Size};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::adapter::DisplayError;

/// Failures reported by a driver or backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The backend could not bring the panel up.
    #[error("panel initialisation failed: {0}")]
    Init(String),

    /// The driver failed while the panel was running.
    #[error("panel fault: {0}")]
    Fault(String),

    /// The driver has already been released.
    #[error("panel driver already closed")]
    Closed,
}

/// Off-screen canvas access plus the vsync-synchronised swap.
///
/// Coordinates passed to [`set_pixel`](Self::set_pixel) are always inside
/// [`size`](Self::size); the display adapter clips before calling.
#[cfg_attr(test, mockall::automock)]
pub trait MatrixDriver: Send {
    /// Pixel dimensions the hardware actually reports.
    fn size(&self) -> Size;

    /// Writes one pixel of the off-screen canvas.
    fn set_pixel(&mut self, x: u32, y: u32, r: u8, g: u8, b: u8);

    /// Makes the off-screen canvas visible at the next vertical sync.
    ///
    /// Blocks for at most one refresh period.
    fn swap_on_vsync(&mut self) -> Result<(), DriverError>;

    /// Blanks the panel and releases the hardware.
    fn close(&mut self) -> Result<(), DriverError>;
}

/// Opens drivers.  One backend may open several drivers over its lifetime,
/// but never more than one at a time.
pub trait MatrixBackend: Send + Sync {
    /// Short name used in log lines (`"headless"`, `"hzeller"`, ...).
    fn name(&self) -> &str;

    /// Brings up the panel described by `options`.
    fn create(&self, options: &MatrixOptions) -> Result<Box<dyn MatrixDriver>, DriverError>;
}

/// Panel arrangement and electrical options handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixOptions {
    pub geometry: Geometry,
    /// Brightness percentage, 1–100.
    pub brightness: u8,
    /// PWM bits per colour channel, 1–11.  Fewer bits refresh faster.
    pub pwm_bits: u8,
    /// Duration of the least significant PWM bit in nanoseconds.
    pub pwm_lsb_nanoseconds: u32,
}

impl MatrixOptions {
    /// A single 32×32 panel at full brightness.
    pub const DEFAULT: MatrixOptions = MatrixOptions {
        geometry: Geometry::DEFAULT,
        brightness: 100,
        pwm_bits: 11,
        pwm_lsb_nanoseconds: 130,
    };

    pub const fn with_geometry(geometry: Geometry) -> Self {
        Self {
            geometry,
            ..Self::DEFAULT
        }
    }

    /// Checks every option and returns the canvas size the geometry implies.
    ///
    /// # Errors
    ///
    /// Returns [`DisplayError::InvalidGeometry`] for zero or overflowing
    /// geometry and [`DisplayError::InvalidOption`] for an option outside its
    /// allowed range.
    pub fn validate(&self) -> Result<Size, DisplayError> {
        let size = self.geometry.size()?;
        check_range("brightness", self.brightness.into(), 1, 100)?;
        check_range("pwm_bits", self.pwm_bits.into(), 1, 11)?;
        check_range("pwm_lsb_nanoseconds", self.pwm_lsb_nanoseconds, 1, u32::MAX)?;
        Ok(size)
    }
}

impl Default for MatrixOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn check_range(name: &'static str, value: u32, min: u32, max: u32) -> Result<(), DisplayError> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(DisplayError::InvalidOption {
            name,
            value,
            min,
            max,
        })
    }
}
