//! Pattern shown on the panel while no client is connected.
//!
//! The default `Frame` pattern is a one-pixel border with both diagonals in
//! dim red, which makes it obvious from across a room that the server is up
//! and which way round the panels are mounted.

use matrix_core::{Framebuffer, FramebufferError, Rgba, Size};
use serde::{Deserialize, Serialize};

/// Dim red: full red at quarter opacity, pre-composited onto black.
pub const DEFAULT_IDLE_COLOR: Rgba = Rgba::rgb(0x40, 0x00, 0x00);

/// What to draw between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdlePattern {
    /// Border rectangle plus both diagonals.
    #[default]
    Frame,
    /// Panel off.
    Blank,
    /// Every pixel in the idle colour.
    Solid,
}

impl IdlePattern {
    /// Renders the pattern into a new canvas of `size`.
    ///
    /// # Errors
    ///
    /// Returns [`FramebufferError::InvalidGeometry`] if `size` has a zero side.
    pub fn render(self, size: Size, color: Rgba) -> Result<Framebuffer, FramebufferError> {
        let mut fb = Framebuffer::with_size(size)?;
        match self {
            IdlePattern::Blank => {}
            IdlePattern::Solid => fb.fill(color),
            IdlePattern::Frame => {
                let right = size.width as i32 - 1;
                let bottom = size.height as i32 - 1;
                draw_line(&mut fb, (0, 0), (right, 0), color);
                draw_line(&mut fb, (right, 0), (right, bottom), color);
                draw_line(&mut fb, (right, bottom), (0, bottom), color);
                draw_line(&mut fb, (0, bottom), (0, 0), color);
                draw_line(&mut fb, (0, 0), (right, bottom), color);
                draw_line(&mut fb, (right, 0), (0, bottom), color);
            }
        }
        Ok(fb)
    }
}

/// Integer line rasterisation (Bresenham), both endpoints inclusive.
fn draw_line(fb: &mut Framebuffer, from: (i32, i32), to: (i32, i32), color: Rgba) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        fb.set(x, y, color);
        if (x, y) == to {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}
