// src/frame/mod.rs

//! Frame buffers and the synthetic content written into them.
//!
//! A `FrameBuffer` is a move-only value: whoever holds it (producer, sink or
//! pool) is the only party that can touch its bytes. Ownership changes hands
//! at acquire, submit and release.

pub mod animation;
pub mod generator;

pub use animation::AnimationState;
pub use generator::{FrameGenerator, YuvColor};

use crate::layout::{FrameLayout, PLANE_COUNT};
use bitflags::bitflags;
use std::fmt;

/// Maximum number of planes the submission metadata can describe.
pub const MAX_PLANES: usize = 4;

bitflags! {
    /// Per-submission payload flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        const FRAME_START = 1 << 1;
        const FRAME_END = 1 << 2;
        /// A complete frame in a single buffer.
        const FRAME = Self::FRAME_START.bits() | Self::FRAME_END.bits();
    }
}

/// Stable identity of a buffer slot: the owning pool and the slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId {
    pub pool: u32,
    pub slot: u32,
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool{}#{}", self.pool, self.slot)
    }
}

/// Video plane description attached to a buffer for one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoMetadata {
    pub planes: u32,
    pub flags: u32,
    pub offset: [u32; MAX_PLANES],
    pub pitch: [u32; MAX_PLANES],
}

impl VideoMetadata {
    /// Metadata describing `layout`, with unused plane slots zeroed.
    pub fn from_layout(layout: &FrameLayout) -> Self {
        let mut meta = VideoMetadata {
            planes: PLANE_COUNT as u32,
            ..Default::default()
        };
        for (i, plane) in layout.planes.iter().enumerate() {
            meta.offset[i] = plane.offset;
            meta.pitch[i] = plane.stride;
        }
        meta
    }
}

/// A hardware-backed frame buffer on loan from a `BufferPool`.
pub struct FrameBuffer {
    id: BufferId,
    payload: Box<[u8]>,
    /// Number of valid payload bytes for this submission.
    pub length: usize,
    pub flags: BufferFlags,
    pub video: VideoMetadata,
}

impl FrameBuffer {
    pub(crate) fn new(id: BufferId, payload: Box<[u8]>) -> Self {
        Self {
            id,
            payload,
            length: 0,
            flags: BufferFlags::empty(),
            video: VideoMetadata::default(),
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    /// Size of the backing memory.
    pub fn capacity(&self) -> usize {
        self.payload.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.payload
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    /// Clears the per-submission fields and stamps the plane layout.
    pub fn stamp_layout(&mut self, layout: &FrameLayout) {
        self.video = VideoMetadata::from_layout(layout);
        self.length = 0;
        self.flags = BufferFlags::empty();
    }

    /// Marks the buffer as carrying one complete frame of `length` bytes.
    pub fn mark_complete_frame(&mut self, length: usize) {
        self.length = length;
        self.flags = BufferFlags::FRAME;
    }

    pub(crate) fn into_payload(self) -> Box<[u8]> {
        self.payload
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("id", &self.id)
            .field("capacity", &self.payload.len())
            .field("length", &self.length)
            .field("flags", &self.flags)
            .finish()
    }
}
