//! 8-bit-per-channel pixel colour.

use serde::{Deserialize, Serialize};

/// An RGBA colour with 8 bits per channel.
///
/// Alpha is carried through framebuffers and over the wire but never
/// composited; LED drivers only receive the RGB part (see [`Rgba::to_rgb`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    /// All channels zero.  Every new framebuffer starts filled with this.
    pub const BLACK: Rgba = Rgba::new(0, 0, 0, 0);
    pub const WHITE: Rgba = Rgba::rgb(0xFF, 0xFF, 0xFF);
    pub const RED: Rgba = Rgba::rgb(0xFF, 0x00, 0x00);
    pub const GREEN: Rgba = Rgba::rgb(0x00, 0xFF, 0x00);
    pub const BLUE: Rgba = Rgba::rgb(0x00, 0x00, 0xFF);

    /// Size of one encoded pixel on the wire.
    pub const ENCODED_LEN: usize = 4;

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque colour from RGB components.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 0xFF)
    }

    /// Returns the `(r, g, b)` triple handed to the panel driver.
    pub const fn to_rgb(self) -> (u8, u8, u8) {
        (self.r, self.g, self.b)
    }

    /// Returns the colour as `[r, g, b, a]` bytes.
    pub const fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

impl From<(u8, u8, u8)> for Rgba {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Rgba::rgb(r, g, b)
    }
}

impl From<[u8; 3]> for Rgba {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Rgba::rgb(r, g, b)
    }
}

impl From<(u8, u8, u8, u8)> for Rgba {
    fn from((r, g, b, a): (u8, u8, u8, u8)) -> Self {
        Rgba::new(r, g, b, a)
    }
}
