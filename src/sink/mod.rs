// src/sink/mod.rs
//! RendererSink trait - interface to the hardware video renderer.
//!
//! The sink is an external component with its own execution context. All
//! traffic back from it (released buffers, asynchronous faults) arrives as
//! `SinkEvent`s on channels handed over when its ports are enabled.
//!
//! ## Lifecycle
//! 1. `create_component()`
//! 2. `enable_control_port(events)` - fault reporting
//! 3. `commit_input_format(format)`
//! 4. `enable_input_port(events)` - buffer release notifications
//! 5. `enable_component()`
//! 6. `submit(buffer)` repeatedly
//! 7. Teardown in reverse: disable component, control port, input port
//!    (which flushes every buffer the sink still holds), release component.

pub mod headless;
#[cfg(test)]
pub(crate) mod mock;

pub use headless::{HeadlessSettings, HeadlessSink};

use crate::frame::{BufferId, FrameBuffer};
use crate::pool::PayloadAllocator;
use std::fmt;
use std::sync::mpsc::Sender;
use std::sync::Arc;

/// Kind of component to instantiate on the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    VideoRenderer,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::VideoRenderer => write!(f, "vc.ril.video_render"),
        }
    }
}

/// Pixel encodings accepted on the input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Planar 4:2:0, Y then U then V.
    I420,
}

impl Encoding {
    pub fn fourcc(self) -> [u8; 4] {
        match self {
            Encoding::I420 => *b"I420",
        }
    }
}

/// Visible region of the input frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crop {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Format committed on the sink's input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFormat {
    pub encoding: Encoding,
    pub width: u32,
    pub height: u32,
    pub crop: Crop,
    /// Number of buffers the producer will cycle through the port.
    pub buffer_count: usize,
}

impl InputFormat {
    /// I420 input of `width` x `height` with the crop covering the whole frame.
    pub fn i420(width: u32, height: u32, buffer_count: usize) -> Self {
        Self {
            encoding: Encoding::I420,
            width,
            height,
            crop: Crop {
                x: 0,
                y: 0,
                width,
                height,
            },
            buffer_count,
        }
    }
}

/// Notifications posted by the sink from its own context.
#[derive(Debug)]
pub enum SinkEvent {
    /// The sink finished with a buffer; ownership returns to the producer side.
    BufferReleased(FrameBuffer),
    /// Asynchronous fault reported on the control port.
    ControlError(SinkError),
}

pub type SinkEventSender = Sender<SinkEvent>;

/// Errors reported by a renderer sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Operation issued in the wrong lifecycle state.
    InvalidState(&'static str),
    /// The component kind is not provided by this sink.
    UnsupportedComponent(ComponentKind),
    /// The input format was refused on commit.
    FormatRejected(String),
    /// Payload memory budget exhausted.
    OutOfMemory { requested: usize, available: usize },
    /// A submitted buffer did not match the committed format.
    InvalidBuffer { id: BufferId, reason: String },
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::InvalidState(what) => write!(f, "invalid sink state: {}", what),
            SinkError::UnsupportedComponent(kind) => {
                write!(f, "component {} is not available", kind)
            }
            SinkError::FormatRejected(reason) => write!(f, "input format rejected: {}", reason),
            SinkError::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "out of payload memory (requested {} bytes, {} available)",
                requested, available
            ),
            SinkError::InvalidBuffer { id, reason } => {
                write!(f, "invalid buffer {}: {}", id, reason)
            }
        }
    }
}

impl std::error::Error for SinkError {}

/// A submission the sink refused. The buffer is handed back so it can be
/// returned to its pool instead of being lost.
#[derive(Debug)]
pub struct SubmitRejected {
    pub buffer: FrameBuffer,
    pub reason: SinkError,
}

impl fmt::Display for SubmitRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "submit of {} rejected: {}", self.buffer.id(), self.reason)
    }
}

impl std::error::Error for SubmitRejected {}

/// Hardware renderer the pipeline streams frames into.
pub trait RendererSink: Send {
    fn create_component(&mut self, kind: ComponentKind) -> Result<(), SinkError>;

    /// Enables fault reporting. Control errors are posted to `events`.
    fn enable_control_port(&mut self, events: SinkEventSender) -> Result<(), SinkError>;

    fn commit_input_format(&mut self, format: &InputFormat) -> Result<(), SinkError>;

    /// Enables the input port. Every accepted buffer is eventually posted back
    /// to `events` as `SinkEvent::BufferReleased`.
    fn enable_input_port(&mut self, events: SinkEventSender) -> Result<(), SinkError>;

    fn enable_component(&mut self) -> Result<(), SinkError>;

    /// Allocator for payload memory the sink can consume directly.
    fn payload_allocator(&self) -> Result<Arc<dyn PayloadAllocator>, SinkError>;

    /// Hands `buffer` to the sink. On failure the buffer comes back in the error.
    fn submit(&mut self, buffer: FrameBuffer) -> Result<(), SubmitRejected>;

    fn disable_component(&mut self) -> Result<(), SinkError>;

    fn disable_control_port(&mut self) -> Result<(), SinkError>;

    /// Disables the input port. Buffers still held by the sink are released
    /// before this returns.
    fn disable_input_port(&mut self) -> Result<(), SinkError>;

    fn release_component(&mut self) -> Result<(), SinkError>;
}
