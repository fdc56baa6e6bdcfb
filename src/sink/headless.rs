// src/sink/headless.rs
//! Headless renderer sink.
//!
//! Behaves like a video renderer component without a display: submitted
//! buffers are validated against the committed format, "shown" for one refresh
//! interval on a dedicated display thread and released back through the input
//! port's event channel. With `retain_last_frame` the frame on screen is kept
//! until the next one replaces it, as a real renderer does.

use super::{
    ComponentKind, InputFormat, RendererSink, SinkError, SinkEvent, SinkEventSender,
    SubmitRejected,
};
use crate::config::HeadlessConfig;
use crate::frame::{BufferFlags, FrameBuffer, VideoMetadata};
use crate::layout::FrameLayout;
use crate::pool::PayloadAllocator;
use log::*;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Runtime settings for `HeadlessSink`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadlessSettings {
    /// Time each frame stays on screen. Zero disables pacing.
    pub frame_interval: Duration,
    pub retain_last_frame: bool,
    /// Total payload memory the allocator may hand out.
    pub payload_budget_bytes: Option<usize>,
}

impl Default for HeadlessSettings {
    fn default() -> Self {
        Self::from_config(&HeadlessConfig::default())
    }
}

impl HeadlessSettings {
    pub fn from_config(config: &HeadlessConfig) -> Self {
        let frame_interval = if config.refresh_hz > 0.0 {
            Duration::from_secs_f64(1.0 / config.refresh_hz)
        } else {
            Duration::ZERO
        };
        Self {
            frame_interval,
            retain_last_frame: config.retain_last_frame,
            payload_budget_bytes: config.payload_budget_bytes.map(|b| b as usize),
        }
    }
}

/// Payload allocator with an optional byte budget.
pub struct HeadlessAllocator {
    budget: Option<usize>,
    live_bytes: AtomicUsize,
}

impl HeadlessAllocator {
    fn new(budget: Option<usize>) -> Self {
        Self {
            budget,
            live_bytes: AtomicUsize::new(0),
        }
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes.load(Ordering::SeqCst)
    }
}

impl PayloadAllocator for HeadlessAllocator {
    fn alloc_payload(&self, size: usize) -> Result<Box<[u8]>, SinkError> {
        let budget = self.budget.unwrap_or(usize::MAX);
        self.live_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                live.checked_add(size).filter(|&total| total <= budget)
            })
            .map_err(|live| SinkError::OutOfMemory {
                requested: size,
                available: budget.saturating_sub(live),
            })?;
        Ok(vec![0u8; size].into_boxed_slice())
    }

    fn free_payload(&self, payload: Box<[u8]>) {
        self.live_bytes.fetch_sub(payload.len(), Ordering::SeqCst);
    }
}

/// Control port sender shared with the display thread.
type ControlSlot = Arc<Mutex<Option<SinkEventSender>>>;

fn post_control_error(control: &ControlSlot, error: SinkError) {
    let slot = control.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(events) = slot.as_ref() {
        if events.send(SinkEvent::ControlError(error)).is_err() {
            debug!("HeadlessSink: control event receiver gone");
        }
    }
}

struct DisplayThread {
    work_tx: Sender<FrameBuffer>,
    handle: JoinHandle<()>,
}

struct Component {
    enabled: bool,
    control: ControlSlot,
    control_enabled: bool,
    format: Option<InputFormat>,
    layout: Option<FrameLayout>,
    display: Option<DisplayThread>,
}

pub struct HeadlessSink {
    settings: HeadlessSettings,
    allocator: Arc<HeadlessAllocator>,
    frames_displayed: Arc<AtomicU64>,
    component: Option<Component>,
}

impl HeadlessSink {
    pub fn new(settings: HeadlessSettings) -> Self {
        info!("HeadlessSink::new() with {:?}", settings);
        Self {
            allocator: Arc::new(HeadlessAllocator::new(settings.payload_budget_bytes)),
            settings,
            frames_displayed: Arc::new(AtomicU64::new(0)),
            component: None,
        }
    }

    pub fn frames_displayed(&self) -> u64 {
        self.frames_displayed.load(Ordering::Relaxed)
    }

    pub fn allocator(&self) -> &Arc<HeadlessAllocator> {
        &self.allocator
    }

    fn component(&mut self) -> Result<&mut Component, SinkError> {
        self.component
            .as_mut()
            .ok_or(SinkError::InvalidState("component not created"))
    }
}

impl RendererSink for HeadlessSink {
    fn create_component(&mut self, kind: ComponentKind) -> Result<(), SinkError> {
        if self.component.is_some() {
            return Err(SinkError::InvalidState("component already created"));
        }
        match kind {
            ComponentKind::VideoRenderer => {}
        }
        self.component = Some(Component {
            enabled: false,
            control: Arc::new(Mutex::new(None)),
            control_enabled: false,
            format: None,
            layout: None,
            display: None,
        });
        info!("HeadlessSink: created component {}", kind);
        Ok(())
    }

    fn enable_control_port(&mut self, events: SinkEventSender) -> Result<(), SinkError> {
        let component = self.component()?;
        if component.control_enabled {
            return Err(SinkError::InvalidState("control port already enabled"));
        }
        *component
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(events);
        component.control_enabled = true;
        debug!("HeadlessSink: control port enabled");
        Ok(())
    }

    fn commit_input_format(&mut self, format: &InputFormat) -> Result<(), SinkError> {
        let component = self.component()?;
        if component.display.is_some() {
            return Err(SinkError::InvalidState("input port enabled"));
        }
        if format.width == 0 || format.height == 0 {
            return Err(SinkError::FormatRejected(format!(
                "empty frame {}x{}",
                format.width, format.height
            )));
        }
        let crop = format.crop;
        let fits = |start: u32, len: u32, limit: u32| {
            start.checked_add(len).is_some_and(|end| end <= limit)
        };
        if !fits(crop.x, crop.width, format.width) || !fits(crop.y, crop.height, format.height) {
            return Err(SinkError::FormatRejected(format!(
                "crop {:?} outside {}x{} frame",
                crop, format.width, format.height
            )));
        }
        if format.buffer_count == 0 {
            return Err(SinkError::FormatRejected("no buffers".to_string()));
        }

        let layout = FrameLayout::plan(format.width, format.height)
            .map_err(|e| SinkError::FormatRejected(e.to_string()))?;

        component.format = Some(*format);
        component.layout = Some(layout);
        info!(
            "HeadlessSink: input format {} {}x{}, {} buffers",
            String::from_utf8_lossy(&format.encoding.fourcc()),
            format.width,
            format.height,
            format.buffer_count
        );
        Ok(())
    }

    fn enable_input_port(&mut self, events: SinkEventSender) -> Result<(), SinkError> {
        let settings = self.settings;
        let frames_displayed = self.frames_displayed.clone();
        let component = self.component()?;
        if component.display.is_some() {
            return Err(SinkError::InvalidState("input port already enabled"));
        }
        let layout = component
            .layout
            .ok_or(SinkError::InvalidState("input format not committed"))?;

        let (work_tx, work_rx) = channel();
        let display = DisplayLoop {
            layout,
            settings,
            events,
            control: component.control.clone(),
            frames_displayed,
        };
        let handle = thread::Builder::new()
            .name("headless-display".to_string())
            .spawn(move || display.run(work_rx))
            .map_err(|_| SinkError::InvalidState("failed to spawn display thread"))?;

        component.display = Some(DisplayThread { work_tx, handle });
        debug!("HeadlessSink: input port enabled");
        Ok(())
    }

    fn enable_component(&mut self) -> Result<(), SinkError> {
        self.component()?.enabled = true;
        info!("HeadlessSink: component enabled");
        Ok(())
    }

    fn payload_allocator(&self) -> Result<Arc<dyn PayloadAllocator>, SinkError> {
        if self.component.is_none() {
            return Err(SinkError::InvalidState("component not created"));
        }
        Ok(self.allocator.clone())
    }

    fn submit(&mut self, buffer: FrameBuffer) -> Result<(), SubmitRejected> {
        let display = match self.component.as_ref() {
            Some(Component {
                enabled: true,
                display: Some(display),
                ..
            }) => display,
            _ => {
                return Err(SubmitRejected {
                    buffer,
                    reason: SinkError::InvalidState("input not accepting buffers"),
                })
            }
        };

        display.work_tx.send(buffer).map_err(|e| SubmitRejected {
            buffer: e.0,
            reason: SinkError::InvalidState("display thread stopped"),
        })
    }

    fn disable_component(&mut self) -> Result<(), SinkError> {
        self.component()?.enabled = false;
        info!("HeadlessSink: component disabled");
        Ok(())
    }

    fn disable_control_port(&mut self) -> Result<(), SinkError> {
        let component = self.component()?;
        component
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        component.control_enabled = false;
        debug!("HeadlessSink: control port disabled");
        Ok(())
    }

    fn disable_input_port(&mut self) -> Result<(), SinkError> {
        let component = self.component()?;
        let Some(DisplayThread { work_tx, handle }) = component.display.take() else {
            return Ok(());
        };

        // Closing the work channel makes the display thread flush what it holds.
        drop(work_tx);
        if handle.join().is_err() {
            error!("HeadlessSink: display thread panicked");
        }
        debug!("HeadlessSink: input port disabled");
        Ok(())
    }

    fn release_component(&mut self) -> Result<(), SinkError> {
        if self.component.is_none() {
            return Err(SinkError::InvalidState("component not created"));
        }
        self.disable_input_port()?;
        self.component = None;
        info!(
            "HeadlessSink: component released after {} frames",
            self.frames_displayed()
        );
        Ok(())
    }
}

impl Drop for HeadlessSink {
    fn drop(&mut self) {
        if self.component.is_some() {
            debug!("HeadlessSink dropped with live component, releasing");
            let _ = self.release_component();
        }
    }
}

/// State owned by the display thread.
struct DisplayLoop {
    layout: FrameLayout,
    settings: HeadlessSettings,
    events: SinkEventSender,
    control: ControlSlot,
    frames_displayed: Arc<AtomicU64>,
}

impl DisplayLoop {
    fn run(self, work_rx: Receiver<FrameBuffer>) {
        debug!("HeadlessSink: display thread started");
        let mut on_screen: Option<FrameBuffer> = None;

        for buffer in work_rx.iter() {
            if let Err(reason) = check_buffer(&buffer, &self.layout) {
                warn!("HeadlessSink: dropping frame {}: {}", buffer.id(), reason);
                post_control_error(
                    &self.control,
                    SinkError::InvalidBuffer {
                        id: buffer.id(),
                        reason,
                    },
                );
                self.release(buffer);
                continue;
            }

            if !self.settings.frame_interval.is_zero() {
                thread::sleep(self.settings.frame_interval);
            }
            self.frames_displayed.fetch_add(1, Ordering::Relaxed);
            trace!("HeadlessSink: displayed {}", buffer.id());

            if self.settings.retain_last_frame {
                if let Some(previous) = on_screen.replace(buffer) {
                    self.release(previous);
                }
            } else {
                self.release(buffer);
            }
        }

        if let Some(last) = on_screen.take() {
            self.release(last);
        }
        debug!("HeadlessSink: display thread exiting");
    }

    fn release(&self, buffer: FrameBuffer) {
        let id = buffer.id();
        if self.events.send(SinkEvent::BufferReleased(buffer)).is_err() {
            warn!("HeadlessSink: release of {} lost, event receiver gone", id);
        }
    }
}

/// Verifies a submission against the committed layout.
fn check_buffer(buffer: &FrameBuffer, layout: &FrameLayout) -> Result<(), String> {
    let expected = VideoMetadata::from_layout(layout);
    if buffer.video.planes != expected.planes {
        return Err(format!("{} planes, expected {}", buffer.video.planes, expected.planes));
    }
    if buffer.video.offset != expected.offset || buffer.video.pitch != expected.pitch {
        return Err(format!(
            "plane offsets {:?} / pitches {:?} do not match the input format",
            buffer.video.offset, buffer.video.pitch
        ));
    }
    if buffer.length != layout.buffer_size() || buffer.length > buffer.capacity() {
        return Err(format!(
            "length {} (capacity {}), expected {}",
            buffer.length,
            buffer.capacity(),
            layout.buffer_size()
        ));
    }
    if !buffer.flags.contains(BufferFlags::FRAME_END) {
        return Err("frame end flag missing".to_string());
    }
    Ok(())
}
