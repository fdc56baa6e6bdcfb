// src/pipeline/mod.rs
//! RenderPipeline - the producer loop.
//!
//! Each iteration takes a free buffer from the pool, stamps the plane layout,
//! draws the test pattern, waits for the flow controller to admit it and hands
//! it to the sink. Abort is checked once per iteration at the loop head; a
//! producer blocked on flow control is also woken by the abort request.
//!
//! States: `Running` while producing, `Draining` once the loop has stopped
//! and buffers are on their way back, `Stopped` after the drain completed.

pub mod fps;
pub mod release_actor;

pub use fps::FrameRateMeter;
pub use release_actor::{ReleaseActor, ReleaseStats};

use crate::flow::{AbortToken, FlowController, SubmitGate};
use crate::frame::{AnimationState, FrameBuffer, FrameGenerator};
use crate::layout::FrameLayout;
use crate::pool::BufferPool;
use crate::sink::{RendererSink, SubmitRejected};
use anyhow::Result;
use log::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Running,
    Draining,
    Stopped,
}

pub struct RenderPipeline {
    layout: FrameLayout,
    pool: Arc<BufferPool>,
    flow: Arc<FlowController>,
    generator: FrameGenerator,
    animation: AnimationState,
    fps_report_interval: Duration,
    status: PipelineStatus,
    frames_submitted: u64,
}

impl RenderPipeline {
    pub fn new(
        layout: FrameLayout,
        pool: Arc<BufferPool>,
        flow: Arc<FlowController>,
        fps_report_interval: Duration,
    ) -> Self {
        Self {
            layout,
            pool,
            flow,
            generator: FrameGenerator::default(),
            animation: AnimationState::default(),
            fps_report_interval,
            status: PipelineStatus::Running,
            frames_submitted: 0,
        }
    }

    /// Produces frames into `sink` until `abort` is requested or the sink
    /// refuses a buffer. Leaves the pipeline in `Draining` either way.
    pub fn run(&mut self, sink: &mut dyn RendererSink, abort: &AbortToken) -> Result<()> {
        self.status = PipelineStatus::Running;
        info!(
            "RenderPipeline: producing {}x{} frames ({} bytes, {} buffers)",
            self.layout.width,
            self.layout.height,
            self.layout.buffer_size(),
            self.pool.capacity()
        );

        let result = self.produce(sink, abort);
        self.status = PipelineStatus::Draining;
        info!(
            "RenderPipeline: stopped after {} frames",
            self.frames_submitted
        );
        result
    }

    fn produce(&mut self, sink: &mut dyn RendererSink, abort: &AbortToken) -> Result<()> {
        let mut meter = FrameRateMeter::new(self.fps_report_interval, Instant::now());

        while !abort.is_aborted() {
            let mut buffer = self.pool.acquire();
            buffer.stamp_layout(&self.layout);
            self.generator
                .render(&self.layout, &self.animation, buffer.data_mut());
            buffer.mark_complete_frame(self.layout.buffer_size());

            if self.flow.begin_submit() == SubmitGate::Aborted {
                self.return_unsubmitted(buffer);
                break;
            }

            if let Err(SubmitRejected { buffer, reason }) = sink.submit(buffer) {
                self.flow.cancel_submit();
                let id = buffer.id();
                self.return_unsubmitted(buffer);
                return Err(anyhow::Error::new(reason).context(format!("Sink rejected buffer {}", id)));
            }

            self.frames_submitted += 1;
            self.animation.advance(self.layout.width, self.layout.height);

            if let Some(fps) = meter.record_frame(Instant::now()) {
                println!("fps: {:.6}", fps);
                debug!("RenderPipeline: {} frames submitted", self.frames_submitted);
            }
        }

        debug!("RenderPipeline: abort observed at loop head");
        Ok(())
    }

    fn return_unsubmitted(&self, buffer: FrameBuffer) {
        if let Err(e) = self.pool.release(buffer) {
            error!("RenderPipeline: could not return unsubmitted buffer: {}", e);
        }
    }

    /// Records that every buffer has come back after the loop stopped.
    pub fn mark_stopped(&mut self) {
        self.status = PipelineStatus::Stopped;
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn animation(&self) -> AnimationState {
        self.animation
    }
}
