// src/layout.rs

//! Plane layout planning for the I420 input format.
//!
//! The renderer wants the luma plane padded to a 32-byte stride and a 16-row
//! height; the two chroma planes are exactly half of that in both directions.
//! Planes are packed back to back inside a single buffer.

use std::fmt;

/// Number of planes in an I420 image (Y, U, V).
pub const PLANE_COUNT: usize = 3;

/// Luma stride alignment in bytes.
pub const LUMA_STRIDE_ALIGN: u32 = 32;
/// Luma height alignment in rows.
pub const LUMA_HEIGHT_ALIGN: u32 = 16;

/// Offset, stride and padded height of one plane inside a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaneLayout {
    pub offset: u32,
    pub stride: u32,
    pub height: u32,
}

impl PlaneLayout {
    /// Number of bytes the plane occupies, padding included.
    pub fn len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    pub fn end(&self) -> usize {
        self.offset as usize + self.len()
    }
}

/// The requested frame does not fit the 32-bit offsets of the buffer metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutError {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frame {}x{} is too large to lay out in one buffer",
            self.width, self.height
        )
    }
}

impl std::error::Error for LayoutError {}

/// Complete layout of one frame: visible size, plane placement and total size.
///
/// Computed once at startup and shared read-only by the producer and the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub width: u32,
    pub height: u32,
    pub planes: [PlaneLayout; PLANE_COUNT],
    pub image_size: u32,
}

impl FrameLayout {
    /// Plans the plane layout for a `width` x `height` frame.
    ///
    /// Both dimensions must be positive; the caller applies defaults before
    /// getting here. Fails when the padded frame does not fit in `u32` bytes.
    pub fn plan(width: u32, height: u32) -> Result<Self, LayoutError> {
        let too_large = LayoutError { width, height };
        let plane_end = |plane: &PlaneLayout| {
            plane
                .stride
                .checked_mul(plane.height)
                .and_then(|len| len.checked_add(plane.offset))
                .ok_or(too_large)
        };

        let luma = PlaneLayout {
            offset: 0,
            stride: align_up(width, LUMA_STRIDE_ALIGN).ok_or(too_large)?,
            height: align_up(height, LUMA_HEIGHT_ALIGN).ok_or(too_large)?,
        };

        let mut planes = [luma; PLANE_COUNT];
        for i in 1..PLANE_COUNT {
            planes[i] = PlaneLayout {
                offset: plane_end(&planes[i - 1])?,
                stride: luma.stride / 2,
                height: luma.height / 2,
            };
        }
        let image_size = plane_end(&planes[PLANE_COUNT - 1])?;

        Ok(Self {
            width,
            height,
            planes,
            image_size,
        })
    }

    pub fn luma(&self) -> &PlaneLayout {
        &self.planes[0]
    }

    /// Total buffer size in bytes.
    pub fn buffer_size(&self) -> usize {
        self.image_size as usize
    }
}

/// Rounds `x` up to the next multiple of `to`, or `None` on overflow.
pub fn align_up(x: u32, to: u32) -> Option<u32> {
    match x % to {
        0 => Some(x),
        rem => x.checked_add(to - rem),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn align_up_rounds_to_boundary() {
        assert_eq!(align_up(0, 32), Some(0));
        assert_eq!(align_up(1, 32), Some(32));
        assert_eq!(align_up(32, 32), Some(32));
        assert_eq!(align_up(1080, 16), Some(1088));
        assert_eq!(align_up(1921, 32), Some(1952));
        assert_eq!(align_up(u32::MAX, 32), None);
    }

    #[test]
    fn full_hd_layout_matches_renderer_expectations() {
        let layout = FrameLayout::plan(1920, 1080).unwrap();

        assert_eq!(layout.planes[0], PlaneLayout { offset: 0, stride: 1920, height: 1088 });
        assert_eq!(
            layout.planes[1],
            PlaneLayout { offset: 1920 * 1088, stride: 960, height: 544 }
        );
        assert_eq!(
            layout.planes[2],
            PlaneLayout { offset: 1920 * 1088 + 960 * 544, stride: 960, height: 544 }
        );
        assert_eq!(layout.image_size, 1920 * 1088 + 2 * 960 * 544);
        assert_eq!(layout.buffer_size(), 3_133_440);
    }

    #[test]
    fn layout_invariants_hold_for_odd_sizes() {
        let sizes = [(1, 1), (2, 2), (17, 9), (33, 31), (640, 480), (1279, 719), (4096, 2160)];
        for (width, height) in sizes {
            let layout = FrameLayout::plan(width, height).unwrap();
            let luma = layout.planes[0];

            assert_eq!(luma.offset, 0);
            assert_eq!(luma.stride % 32, 0, "{}x{}", width, height);
            assert_eq!(luma.height % 16, 0, "{}x{}", width, height);
            assert!(luma.stride >= width && luma.height >= height);

            for i in 1..PLANE_COUNT {
                let plane = layout.planes[i];
                assert_eq!(plane.stride % 16, 0);
                assert_eq!(plane.height % 8, 0);
                assert_eq!(plane.stride * 2, luma.stride);
                assert_eq!(plane.height * 2, luma.height);
                assert_eq!(plane.offset as usize, layout.planes[i - 1].end());
            }

            assert_eq!(layout.buffer_size(), layout.planes[2].end());
            let lower_bound = width as u64 * height as u64 * 3 / 2;
            assert!(layout.image_size as u64 >= lower_bound);
        }
    }

    #[test]
    fn oversized_frames_are_rejected() {
        for (width, height) in [(65536, 65536), (u32::MAX, 1), (1, u32::MAX)] {
            assert_eq!(
                FrameLayout::plan(width, height),
                Err(LayoutError { width, height })
            );
        }
        // Just under 4 GiB including both chroma planes.
        assert!(FrameLayout::plan(65536, 43680).is_ok());
    }
}
