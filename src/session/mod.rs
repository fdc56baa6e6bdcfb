// src/session/mod.rs
//! RenderSession - brings up the sink, runs the pipeline and tears it all down.
//!
//! Startup sequence:
//! 1. create the video renderer component
//! 2. enable its control port
//! 3. plan the layout and commit the I420 input format
//! 4. enable the input port, then the component
//! 5. create the buffer pool through the sink's payload allocator
//! 6. spawn the release actor on the sink's event channel
//!
//! A failure at any step tears down whatever already exists and is returned
//! to the caller.

use crate::cli::RunArgs;
use crate::config::PipelineConfig;
use crate::flow::{AbortToken, FlowController};
use crate::layout::FrameLayout;
use crate::pipeline::{PipelineStatus, ReleaseActor, ReleaseStats, RenderPipeline};
use crate::pool::BufferPool;
use crate::shutdown::{ShutdownCoordinator, SinkResources};
use crate::sink::{ComponentKind, InputFormat, RendererSink, SinkEvent, SinkEventSender};
use anyhow::{Context, Result};
use log::*;
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::time::Duration;

/// Everything `RenderSession::start` needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub buffer_count: usize,
    pub width: u32,
    pub height: u32,
    pub fps_report_interval: Duration,
    pub drain_poll_interval: Duration,
}

impl SessionSettings {
    pub fn new(args: &RunArgs, config: &PipelineConfig) -> Self {
        Self {
            buffer_count: args.buffer_count,
            width: args.width,
            height: args.height,
            fps_report_interval: config.fps_report_interval(),
            drain_poll_interval: config.drain_poll_interval(),
        }
    }
}

/// Summary handed back by `RenderSession::shutdown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionReport {
    pub status: PipelineStatus,
    pub frames_submitted: u64,
    pub release: Option<ReleaseStats>,
}

pub struct RenderSession {
    sink: Box<dyn RendererSink>,
    pipeline: RenderPipeline,
    coordinator: ShutdownCoordinator,
    release_actor: Option<ReleaseActor>,
}

impl RenderSession {
    pub fn start(
        mut sink: Box<dyn RendererSink>,
        settings: &SessionSettings,
        flow: Arc<FlowController>,
    ) -> Result<Self> {
        info!(
            "RenderSession: starting {}x{} with {} buffers",
            settings.width, settings.height, settings.buffer_count
        );

        let mut coordinator = ShutdownCoordinator::new(settings.drain_poll_interval);
        let (events_tx, events_rx) = mpsc::channel();

        let (layout, pool) = match bring_up(sink.as_mut(), settings, events_tx, &mut coordinator) {
            Ok(up) => up,
            Err(e) => {
                error!("RenderSession: startup failed: {:#}", e);
                coordinator.teardown(sink.as_mut());
                log_pending_events(&events_rx);
                return Err(e);
            }
        };

        let release_actor = match ReleaseActor::spawn(events_rx, pool.clone(), flow.clone()) {
            Ok(actor) => actor,
            Err(e) => {
                coordinator.teardown(sink.as_mut());
                return Err(e);
            }
        };

        let pipeline = RenderPipeline::new(layout, pool, flow, settings.fps_report_interval);
        Ok(Self {
            sink,
            pipeline,
            coordinator,
            release_actor: Some(release_actor),
        })
    }

    /// Runs the producer loop until `abort` is requested or the sink fails.
    pub fn run(&mut self, abort: &AbortToken) -> Result<()> {
        self.pipeline.run(self.sink.as_mut(), abort)
    }

    pub fn status(&self) -> PipelineStatus {
        self.pipeline.status()
    }

    pub fn frames_submitted(&self) -> u64 {
        self.pipeline.frames_submitted()
    }

    /// Drains and tears everything down, then waits for the release actor.
    pub fn shutdown(mut self) -> SessionReport {
        self.coordinator.teardown(self.sink.as_mut());
        self.pipeline.mark_stopped();
        let release = self.release_actor.take().and_then(ReleaseActor::join);

        SessionReport {
            status: self.pipeline.status(),
            frames_submitted: self.pipeline.frames_submitted(),
            release,
        }
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        self.coordinator.teardown(self.sink.as_mut());
        self.release_actor.take();
    }
}

/// Runs the startup sequence, recording each resource with `coordinator`.
/// `events` is moved in so only the sink holds senders once startup is over.
fn bring_up(
    sink: &mut dyn RendererSink,
    settings: &SessionSettings,
    events: SinkEventSender,
    coordinator: &mut ShutdownCoordinator,
) -> Result<(FrameLayout, Arc<BufferPool>)> {
    let kind = ComponentKind::VideoRenderer;
    sink.create_component(kind)
        .with_context(|| format!("Failed to create {} component", kind))?;
    coordinator.record(SinkResources::COMPONENT);

    sink.enable_control_port(events.clone())
        .context("Failed to enable control port")?;
    coordinator.record(SinkResources::CONTROL_PORT);

    let layout = FrameLayout::plan(settings.width, settings.height)
        .context("Failed to plan frame layout")?;
    let format = InputFormat::i420(settings.width, settings.height, settings.buffer_count);
    sink.commit_input_format(&format)
        .context("Failed to commit input format")?;
    debug!(
        "RenderSession: input format committed, luma stride {} height {}, {} bytes per frame",
        layout.luma().stride,
        layout.luma().height,
        layout.buffer_size()
    );

    sink.enable_input_port(events)
        .context("Failed to enable input port")?;
    coordinator.record(SinkResources::INPUT_PORT);

    sink.enable_component()
        .context("Failed to enable component")?;
    coordinator.record(SinkResources::COMPONENT_ENABLED);

    let allocator = sink
        .payload_allocator()
        .context("Failed to get payload allocator")?;
    let pool = BufferPool::create(settings.buffer_count, layout.buffer_size(), allocator)
        .context("Failed to create buffer pool")?;
    let pool = Arc::new(pool);
    coordinator.adopt_pool(pool.clone());

    Ok((layout, pool))
}

/// Logs control errors the sink reported before startup gave up.
fn log_pending_events(events: &Receiver<SinkEvent>) {
    for event in events.try_iter() {
        match event {
            SinkEvent::ControlError(e) => error!("Sink control error: {}", e),
            SinkEvent::BufferReleased(buffer) => {
                warn!("RenderSession: dropping buffer {} released during startup", buffer.id())
            }
        }
    }
}
