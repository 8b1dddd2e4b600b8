//! Owned handle to one LED panel.
//!
//! The adapter keeps its own back canvas as a [`Framebuffer`].  Drawing
//! operations only touch that canvas; [`DisplayAdapter::present`] copies it in
//! full to the driver's off-screen canvas and swaps on vertical sync.  Because
//! the whole canvas is rewritten on each present, presenting twice without
//! drawing in between shows the same image both times.
//!
//! The driver is released exactly once: by [`DisplayAdapter::close`], or by
//! `Drop` if the adapter goes away without being closed.

use matrix_core::{Framebuffer, GeometryError, Rgba, Size};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::driver::{DriverError, MatrixBackend, MatrixDriver, MatrixOptions};

/// Errors reported by the display adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DisplayError {
    /// The configured geometry does not describe a positive-area canvas.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),

    /// A panel option is outside its allowed range.
    #[error("{name} must be within {min}..={max}, got {value}")]
    InvalidOption {
        name: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// The backend could not open a usable driver.
    #[error("display initialisation failed: {0}")]
    InitializationFailed(String),

    /// A pixel write landed outside the panel.
    #[error("pixel ({x}, {y}) is outside the {size} display")]
    OutOfBounds { x: i32, y: i32, size: Size },

    /// The driver failed after initialisation.
    #[error("display driver error: {0}")]
    Driver(#[from] DriverError),
}

/// Exclusive owner of a panel driver and its back canvas.
pub struct DisplayAdapter {
    driver: Option<Box<dyn MatrixDriver>>,
    back: Framebuffer,
    options: MatrixOptions,
}

impl DisplayAdapter {
    /// Validates `options`, opens a driver through `backend` and allocates
    /// the back canvas.
    ///
    /// # Errors
    ///
    /// - [`DisplayError::InvalidGeometry`] / [`DisplayError::InvalidOption`]
    ///   before any hardware is touched.
    /// - [`DisplayError::InitializationFailed`] if the backend fails or the
    ///   driver reports a size other than the one the geometry implies.  In
    ///   the latter case the driver is closed before returning.
    pub fn open(options: MatrixOptions, backend: &dyn MatrixBackend) -> Result<Self, DisplayError> {
        let size = options.validate()?;
        let back = Framebuffer::with_size(size)
            .map_err(|e| DisplayError::InitializationFailed(e.to_string()))?;

        let mut driver = backend
            .create(&options)
            .map_err(|e| DisplayError::InitializationFailed(e.to_string()))?;

        let reported = driver.size();
        if reported != size {
            if let Err(e) = driver.close() {
                warn!("closing mismatched {} driver failed: {e}", backend.name());
            }
            return Err(DisplayError::InitializationFailed(format!(
                "geometry implies {size} but the {} driver reports {reported}",
                backend.name()
            )));
        }

        info!(
            "opened {size} display via {} backend (brightness {}%, pwm bits {})",
            backend.name(),
            options.brightness,
            options.pwm_bits
        );
        Ok(Self {
            driver: Some(driver),
            back,
            options,
        })
    }

    /// Canvas dimensions; constant for the adapter's lifetime.
    pub fn bounds(&self) -> Size {
        self.back.size()
    }

    pub fn options(&self) -> &MatrixOptions {
        &self.options
    }

    /// Writes one back-canvas pixel.
    ///
    /// # Errors
    ///
    /// Returns [`DisplayError::OutOfBounds`] and leaves the canvas untouched
    /// if `(x, y)` is outside [`bounds`](Self::bounds).
    pub fn write_pixel(&mut self, x: i32, y: i32, color: Rgba) -> Result<(), DisplayError> {
        self.back
            .try_set(x, y, color)
            .map_err(|_| DisplayError::OutOfBounds {
                x,
                y,
                size: self.back.size(),
            })
    }

    /// Back-canvas read-back; `None` outside the bounds.
    pub fn pixel(&self, x: i32, y: i32) -> Option<Rgba> {
        self.back.get(x, y)
    }

    pub fn fill_canvas(&mut self, color: Rgba) {
        self.back.fill(color);
    }

    pub fn clear_canvas(&mut self) {
        self.back.clear();
    }

    /// Copies `frame` onto the back canvas over the overlapping region.
    pub fn draw_buffer(&mut self, frame: &Framebuffer) {
        if frame.size() != self.back.size() {
            debug!("drawing {} frame onto {} canvas", frame.size(), self.back.size());
        }
        self.back.copy_from(frame);
    }

    /// Publishes the back canvas.
    ///
    /// # Errors
    ///
    /// Returns [`DisplayError::Driver`] if the swap fails.
    pub fn present(&mut self) -> Result<(), DisplayError> {
        let driver = self.driver.as_deref_mut().ok_or(DriverError::Closed)?;
        for (y, row) in self.back.rows().enumerate() {
            for (x, px) in row.iter().enumerate() {
                driver.set_pixel(x as u32, y as u32, px.r, px.g, px.b);
            }
        }
        driver.swap_on_vsync()?;
        Ok(())
    }

    /// Releases the driver.
    ///
    /// # Errors
    ///
    /// Returns [`DisplayError::Driver`] if the driver reports a failure while
    /// shutting down.  The driver is considered released either way.
    pub fn close(mut self) -> Result<(), DisplayError> {
        match self.driver.take() {
            Some(mut driver) => {
                info!("closing {} display", self.back.size());
                driver.close()?;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Drop for DisplayAdapter {
    fn drop(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            warn!("display adapter dropped without close(); releasing driver");
            if let Err(e) = driver.close() {
                warn!("driver close failed during drop: {e}");
            }
        }
    }
}

impl std::fmt::Debug for DisplayAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayAdapter")
            .field("size", &self.back.size())
            .field("options", &self.options)
            .field("open", &self.driver.is_some())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
