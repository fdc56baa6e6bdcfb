// src/pipeline/release_actor.rs
//! ReleaseActor - consumes sink events on a dedicated thread.
//!
//! Released buffers go back to the pool first and only then to the flow
//! controller, so a producer woken by the lower in-use count always finds the
//! buffer already queued. Control errors are logged and otherwise ignored.
//!
//! The thread exits once every `SinkEvent` sender is gone, which happens when
//! the sink's ports are disabled and its component released.

use crate::flow::FlowController;
use crate::pool::BufferPool;
use crate::sink::SinkEvent;
use anyhow::{Context, Result};
use log::*;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub struct ReleaseActor {
    thread_handle: Option<JoinHandle<ReleaseStats>>,
}

/// Totals reported by the actor when it stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseStats {
    pub buffers_released: u64,
    pub control_errors: u64,
}

impl ReleaseActor {
    pub fn spawn(
        events: Receiver<SinkEvent>,
        pool: Arc<BufferPool>,
        flow: Arc<FlowController>,
    ) -> Result<Self> {
        let thread_handle = thread::Builder::new()
            .name("release".to_string())
            .spawn(move || run(events, &pool, &flow))
            .context("Failed to spawn release thread")?;

        debug!("ReleaseActor spawned");
        Ok(Self {
            thread_handle: Some(thread_handle),
        })
    }

    /// Waits for the actor to see its channel close.
    pub fn join(mut self) -> Option<ReleaseStats> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> Option<ReleaseStats> {
        let handle = self.thread_handle.take()?;
        match handle.join() {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!("ReleaseActor thread panicked: {:?}", e);
                None
            }
        }
    }
}

impl Drop for ReleaseActor {
    fn drop(&mut self) {
        self.join_inner();
    }
}

fn run(events: Receiver<SinkEvent>, pool: &BufferPool, flow: &FlowController) -> ReleaseStats {
    info!("ReleaseActor: started");
    let mut stats = ReleaseStats::default();

    for event in events.iter() {
        match event {
            SinkEvent::BufferReleased(buffer) => match pool.release(buffer) {
                Ok(()) => {
                    flow.on_released();
                    stats.buffers_released += 1;
                }
                Err(e) => error!("ReleaseActor: {}", e),
            },
            SinkEvent::ControlError(e) => {
                stats.control_errors += 1;
                error!("Sink control error: {}", e);
            }
        }
    }

    info!(
        "ReleaseActor: event channel closed after {} releases, {} control errors",
        stats.buffers_released, stats.control_errors
    );
    stats
}
