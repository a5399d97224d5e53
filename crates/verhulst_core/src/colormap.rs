//! Linear color maps from a scalar domain to RGB.

use crate::error::ConfigError;
use crate::interp::lin_interp;
use image::Rgb;
use serde::{Deserialize, Serialize};

/// Interpolates between a start and an end color.
///
/// Channels are the magnitude of the interpolated value truncated to an
/// integer. Nothing is clamped: sweeping past `end` keeps extrapolating, so a
/// channel may exceed 255 or fold back up from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorMap {
    pub start: [u8; 3],
    pub end: [u8; 3],
}

impl ColorMap {
    pub const BLACK: ColorMap = ColorMap::new([0, 0, 0], [0, 0, 0]);
    pub const WHITE_TO_BLACK: ColorMap = ColorMap::new([0, 0, 0], [255, 255, 255]);
    pub const BLUE_TO_RED: ColorMap = ColorMap::new([0, 0, 255], [255, 0, 0]);
    pub const CYAN_TO_RED: ColorMap = ColorMap::new([0, 255, 255], [255, 0, 0]);
    pub const BLACK_TO_RED: ColorMap = ColorMap::new([0, 0, 0], [255, 0, 0]);
    pub const RED_TO_BLACK: ColorMap = ColorMap::new([255, 0, 0], [0, 0, 0]);
    pub const BLUE_TO_BLACK: ColorMap = ColorMap::new([0, 0, 255], [0, 0, 0]);
    pub const ORANGE_TO_BLACK: ColorMap = ColorMap::new([255, 165, 0], [0, 0, 0]);

    pub const PRESETS: [(&'static str, ColorMap); 8] = [
        ("black", ColorMap::BLACK),
        ("white_to_black", ColorMap::WHITE_TO_BLACK),
        ("blue_to_red", ColorMap::BLUE_TO_RED),
        ("cyan_to_red", ColorMap::CYAN_TO_RED),
        ("black_to_red", ColorMap::BLACK_TO_RED),
        ("red_to_black", ColorMap::RED_TO_BLACK),
        ("blue_to_black", ColorMap::BLUE_TO_BLACK),
        ("orange_to_black", ColorMap::ORANGE_TO_BLACK),
    ];

    pub const fn new(start: [u8; 3], end: [u8; 3]) -> Self {
        Self { start, end }
    }

    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        Self::PRESETS
            .iter()
            .find(|(preset, _)| *preset == name)
            .map(|(_, cmap)| *cmap)
            .ok_or_else(|| ConfigError::UnknownColorMap(name.to_string()))
    }

    /// Color for `x` positioned within `[start, end]`.
    pub fn map(&self, x: f64, start: f64, end: f64) -> [u32; 3] {
        let mut out = [0u32; 3];
        for (c, slot) in out.iter_mut().enumerate() {
            let value = lin_interp(
                x,
                start,
                end,
                f64::from(self.start[c]),
                f64::from(self.end[c]),
            );
            // Saturating cast: non-finite input lands on 0 or u32::MAX.
            *slot = value.abs() as u32;
        }
        out
    }

    /// [`ColorMap::map`] narrowed to an 8-bit pixel, saturating at 255.
    pub fn pixel(&self, x: f64, start: f64, end: f64) -> Rgb<u8> {
        let [r, g, b] = self.map(x, start, end);
        Rgb([saturate(r), saturate(g), saturate(b)])
    }
}

fn saturate(channel: u32) -> u8 {
    channel.min(u32::from(u8::MAX)) as u8
}
