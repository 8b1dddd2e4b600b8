//! LED panel geometry.
//!
//! RGB matrix panels are daisy-chained horizontally (`chain_length`) and the
//! driver board can feed several chains in parallel (`parallel`), stacked
//! vertically.  The visible canvas is therefore:
//!
//! ```text
//! width  = columns * chain_length
//! height = rows    * parallel
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a geometry does not describe a positive-area canvas.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum GeometryError {
    /// One of the panel fields is zero.
    #[error("geometry field `{field}` must be positive")]
    ZeroField { field: &'static str },

    /// The derived width or height does not fit the address space.
    #[error("geometry {rows}x{columns} (chain {chain_length}, parallel {parallel}) overflows")]
    Overflow {
        rows: u32,
        columns: u32,
        chain_length: u32,
        parallel: u32,
    },

    /// A width/height pair with a zero side.
    #[error("invalid canvas size {width}x{height}")]
    EmptySize { width: u32, height: u32 },
}

/// Pixel dimensions of a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels, or `None` if it does not fit in `usize`.
    pub fn area(&self) -> Option<usize> {
        (self.width as usize).checked_mul(self.height as usize)
    }

    /// Returns `true` if `(x, y)` lies inside `[0, width) x [0, height)`.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height
    }

    pub(crate) fn validate(self) -> Result<Self, GeometryError> {
        if self.width == 0 || self.height == 0 || self.area().is_none() {
            return Err(GeometryError::EmptySize {
                width: self.width,
                height: self.height,
            });
        }
        Ok(self)
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Arrangement of the physical panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Geometry {
    /// Rows on a single panel.
    pub rows: u32,
    /// Columns on a single panel.
    pub columns: u32,
    /// Number of daisy-chained panels.
    pub chain_length: u32,
    /// Number of parallel chains.
    pub parallel: u32,
}

impl Geometry {
    /// One 32×32 panel.
    pub const DEFAULT: Geometry = Geometry {
        rows: 32,
        columns: 32,
        chain_length: 1,
        parallel: 1,
    };

    pub const fn new(rows: u32, columns: u32, chain_length: u32, parallel: u32) -> Self {
        Self {
            rows,
            columns,
            chain_length,
            parallel,
        }
    }

    /// Derives the canvas size.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::ZeroField`] if any field is zero and
    /// [`GeometryError::Overflow`] if the product does not fit in `u32`.
    pub fn size(&self) -> Result<Size, GeometryError> {
        for (field, value) in [
            ("rows", self.rows),
            ("columns", self.columns),
            ("chain_length", self.chain_length),
            ("parallel", self.parallel),
        ] {
            if value == 0 {
                return Err(GeometryError::ZeroField { field });
            }
        }

        let overflow = || GeometryError::Overflow {
            rows: self.rows,
            columns: self.columns,
            chain_length: self.chain_length,
            parallel: self.parallel,
        };
        let width = self.columns.checked_mul(self.chain_length).ok_or_else(overflow)?;
        let height = self.rows.checked_mul(self.parallel).ok_or_else(overflow)?;
        Size::new(width, height).validate().map_err(|_| overflow())
    }

    /// Canvas width in pixels (`columns * chain_length`, saturating).
    pub fn width(&self) -> u32 {
        self.columns.saturating_mul(self.chain_length)
    }

    /// Canvas height in pixels (`rows * parallel`, saturating).
    pub fn height(&self) -> u32 {
        self.rows.saturating_mul(self.parallel)
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::DEFAULT
    }
}
