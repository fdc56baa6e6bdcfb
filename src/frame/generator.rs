// src/frame/generator.rs

//! Synthetic test pattern for the renderer.
//!
//! The visible area is a solid field crossed by a highlighted horizontal line
//! and a highlighted vertical band; everything in the stride and height padding
//! is painted in a distinct pad colour so misreported strides show up on screen.

use super::AnimationState;
use crate::layout::{FrameLayout, PlaneLayout};

/// One colour expressed as I420 sample values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YuvColor {
    pub y: u8,
    pub u: u8,
    pub v: u8,
}

impl YuvColor {
    pub const WHITE: YuvColor = YuvColor { y: 255, u: 128, v: 128 };
    pub const GREEN: YuvColor = YuvColor { y: 149, u: 43, v: 21 };
    pub const RED: YuvColor = YuvColor { y: 76, u: 84, v: 255 };
}

/// Width of the vertical highlight band in luma samples.
const LUMA_BAND: usize = 2;
/// Width of the vertical highlight band in chroma samples.
const CHROMA_BAND: usize = 1;

/// Writes the test pattern into frame buffers.
#[derive(Debug, Clone, Copy)]
pub struct FrameGenerator {
    /// Visible area.
    pub foreground: YuvColor,
    /// Stride and height padding.
    pub pad: YuvColor,
    /// The moving line.
    pub highlight: YuvColor,
}

impl Default for FrameGenerator {
    fn default() -> Self {
        Self {
            foreground: YuvColor::WHITE,
            pad: YuvColor::GREEN,
            highlight: YuvColor::RED,
        }
    }
}

/// Sample values for one plane.
#[derive(Clone, Copy)]
struct PlaneColors {
    foreground: u8,
    pad: u8,
    highlight: u8,
}

/// Geometry of the pattern within one plane.
struct PlanePattern {
    visible_width: usize,
    visible_height: usize,
    line_row: LineRow,
    band_start: usize,
    band_width: usize,
}

/// How a row is matched against the horizontal line position.
#[derive(Clone, Copy)]
enum LineRow {
    /// Line covers the row pair containing this row (luma).
    Pair(usize),
    /// Line covers exactly this row (chroma).
    Exact(usize),
}

impl LineRow {
    fn contains(self, row: usize) -> bool {
        match self {
            LineRow::Pair(line) => row / 2 == line / 2,
            LineRow::Exact(line) => row == line,
        }
    }
}

impl FrameGenerator {
    /// Overwrites every plane byte of `image` with the pattern for `anim`.
    ///
    /// `image` must be at least `layout.buffer_size()` bytes long.
    pub fn render(&self, layout: &FrameLayout, anim: &AnimationState, image: &mut [u8]) {
        debug_assert!(image.len() >= layout.buffer_size());

        let width = layout.width as usize;
        let height = layout.height as usize;
        let line_x = anim.line_x as usize;
        let line_y = anim.line_y as usize;

        let luma = PlanePattern {
            visible_width: width,
            visible_height: height,
            line_row: LineRow::Pair(line_y),
            band_start: line_x,
            band_width: LUMA_BAND,
        };
        let chroma = PlanePattern {
            visible_width: width / 2,
            visible_height: height / 2,
            line_row: LineRow::Exact(line_y / 2),
            band_start: line_x / 2,
            band_width: CHROMA_BAND,
        };

        let channels = [
            (self.foreground.y, self.pad.y, self.highlight.y),
            (self.foreground.u, self.pad.u, self.highlight.u),
            (self.foreground.v, self.pad.v, self.highlight.v),
        ];

        for (i, (plane, (foreground, pad, highlight))) in
            layout.planes.iter().zip(channels).enumerate()
        {
            let pattern = if i == 0 { &luma } else { &chroma };
            let colors = PlaneColors {
                foreground,
                pad,
                highlight,
            };
            fill_plane(&mut image[plane.offset as usize..plane.end()], plane, pattern, colors);
        }
    }
}

fn fill_plane(bytes: &mut [u8], plane: &PlaneLayout, pattern: &PlanePattern, colors: PlaneColors) {
    let stride = plane.stride as usize;
    let visible = pattern.visible_width.min(stride);
    let band_start = pattern.band_start.min(visible);
    let band_end = (pattern.band_start + pattern.band_width).min(visible);

    for (i, row) in bytes.chunks_exact_mut(stride).enumerate() {
        let color = if pattern.line_row.contains(i) {
            colors.highlight
        } else if i < pattern.visible_height {
            colors.foreground
        } else {
            colors.pad
        };

        row[..band_start].fill(color);
        row[band_start..band_end].fill(colors.highlight);
        row[band_end..visible].fill(color);
        row[visible..].fill(colors.pad);
    }
}
