// src/shutdown.rs
//! ShutdownCoordinator - ordered, guarded teardown of the sink and pool.
//!
//! Startup records each resource as it comes up. Teardown then undoes only
//! what was recorded, in this order:
//!
//! 1. disable the component (no new buffers accepted)
//! 2. disable the control port
//! 3. disable the input port (the sink flushes what it holds)
//! 4. drain the pool until every buffer is back
//! 5. destroy the pool
//! 6. release the component
//!
//! Each step clears its record when it runs, so calling `teardown` again, or
//! after a failed startup, is safe.

use crate::pool::BufferPool;
use crate::sink::{RendererSink, SinkError};
use bitflags::bitflags;
use log::*;
use std::sync::Arc;
use std::time::Duration;

bitflags! {
    /// Sink-side resources brought up during startup.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SinkResources: u8 {
        const COMPONENT = 1 << 0;
        const CONTROL_PORT = 1 << 1;
        const INPUT_PORT = 1 << 2;
        const COMPONENT_ENABLED = 1 << 3;
    }
}

pub struct ShutdownCoordinator {
    created: SinkResources,
    pool: Option<Arc<BufferPool>>,
    drain_poll_interval: Duration,
}

impl ShutdownCoordinator {
    pub fn new(drain_poll_interval: Duration) -> Self {
        Self {
            created: SinkResources::empty(),
            pool: None,
            drain_poll_interval,
        }
    }

    /// Records that `resource` now exists and must be undone on teardown.
    pub fn record(&mut self, resource: SinkResources) {
        self.created |= resource;
    }

    /// Takes responsibility for draining and destroying `pool`.
    pub fn adopt_pool(&mut self, pool: Arc<BufferPool>) {
        self.pool = Some(pool);
    }

    pub fn created(&self) -> SinkResources {
        self.created
    }

    pub fn has_pool(&self) -> bool {
        self.pool.is_some()
    }

    /// Tears down everything recorded so far. Step failures are logged and
    /// the remaining steps still run.
    pub fn teardown(&mut self, sink: &mut dyn RendererSink) {
        if self.created.is_empty() && self.pool.is_none() {
            trace!("ShutdownCoordinator: nothing to tear down");
            return;
        }
        info!("ShutdownCoordinator: tearing down {:?}", self.created);

        if self.take(SinkResources::COMPONENT_ENABLED) {
            log_step("disable component", sink.disable_component());
        }
        if self.take(SinkResources::CONTROL_PORT) {
            log_step("disable control port", sink.disable_control_port());
        }
        if self.take(SinkResources::INPUT_PORT) {
            log_step("disable input port", sink.disable_input_port());
        }

        if let Some(pool) = self.pool.take() {
            let reports = pool.drain(self.drain_poll_interval);
            debug!("ShutdownCoordinator: pool drained ({} progress reports)", reports);
            pool.destroy();
        }

        if self.take(SinkResources::COMPONENT) {
            log_step("release component", sink.release_component());
        }
        debug!("ShutdownCoordinator: teardown complete");
    }

    fn take(&mut self, resource: SinkResources) -> bool {
        let present = self.created.contains(resource);
        self.created.remove(resource);
        present
    }
}

fn log_step(step: &str, result: Result<(), SinkError>) {
    if let Err(e) = result {
        warn!("ShutdownCoordinator: failed to {}: {}", step, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::mock::{CountingAllocator, MockSink};
    use crate::sink::ComponentKind;
    use std::sync::mpsc;
    use test_log::test;

    #[test]
    fn nothing_recorded_means_no_sink_calls() {
        let (mut sink, handle) = MockSink::new();
        let mut coordinator = ShutdownCoordinator::new(Duration::from_millis(10));
        coordinator.teardown(&mut sink);
        assert!(handle.calls().is_empty());
    }

    #[test]
    fn partial_startup_only_undoes_what_exists() {
        let (mut sink, handle) = MockSink::new();
        let (tx, _rx) = mpsc::channel();
        let mut coordinator = ShutdownCoordinator::new(Duration::from_millis(10));

        sink.create_component(ComponentKind::VideoRenderer).unwrap();
        coordinator.record(SinkResources::COMPONENT);
        sink.enable_control_port(tx).unwrap();
        coordinator.record(SinkResources::CONTROL_PORT);

        coordinator.teardown(&mut sink);
        assert_eq!(
            handle.calls(),
            vec![
                "create_component",
                "enable_control_port",
                "disable_control_port",
                "release_component",
            ]
        );
        assert!(coordinator.created().is_empty());
    }

    #[test]
    fn full_teardown_order_and_idempotence() {
        let allocator = CountingAllocator::new();
        let (mut sink, handle) = MockSink::with_allocator(allocator.clone());
        let pool = Arc::new(BufferPool::create(2, 64, allocator.clone()).unwrap());
        let mut coordinator = ShutdownCoordinator::new(Duration::from_millis(10));
        coordinator.record(SinkResources::all());
        coordinator.adopt_pool(pool.clone());

        coordinator.teardown(&mut sink);
        coordinator.teardown(&mut sink);

        assert_eq!(
            handle.calls(),
            vec![
                "disable_component",
                "disable_control_port",
                "disable_input_port",
                "release_component",
            ]
        );
        assert!(pool.is_destroyed());
        assert_eq!(allocator.freed(), 2);
        assert!(!coordinator.has_pool());
    }
}
