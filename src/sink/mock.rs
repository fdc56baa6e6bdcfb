// src/sink/mock.rs

//! Test doubles: a scriptable sink and a counting payload allocator.

use super::*;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Allocator that counts live allocations and can be told to fail.
#[derive(Default)]
pub(crate) struct CountingAllocator {
    allocated: AtomicUsize,
    freed: AtomicUsize,
    fail_after: Option<usize>,
}

impl CountingAllocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Succeeds `n` times, then fails every allocation.
    pub fn failing_after(n: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_after: Some(n),
            ..Default::default()
        })
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn freed(&self) -> usize {
        self.freed.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.allocated() - self.freed()
    }
}

impl PayloadAllocator for CountingAllocator {
    fn alloc_payload(&self, size: usize) -> Result<Box<[u8]>, SinkError> {
        if let Some(limit) = self.fail_after {
            if self.allocated() >= limit {
                return Err(SinkError::OutOfMemory {
                    requested: size,
                    available: 0,
                });
            }
        }
        self.allocated.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0u8; size].into_boxed_slice())
    }

    fn free_payload(&self, _payload: Box<[u8]>) {
        self.freed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Startup step a `MockSink` can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockStep {
    CreateComponent,
    EnableControlPort,
    CommitInputFormat,
    EnableInputPort,
    EnableComponent,
}

#[derive(Default)]
pub(crate) struct MockState {
    pub calls: Vec<&'static str>,
    pub held: VecDeque<FrameBuffer>,
    pub submitted: usize,
    pub format: Option<InputFormat>,
    input_events: Option<SinkEventSender>,
    control_events: Option<SinkEventSender>,
}

/// Sink whose buffer releases are driven by the test through `MockSinkHandle`.
pub(crate) struct MockSink {
    state: Arc<Mutex<MockState>>,
    allocator: Arc<CountingAllocator>,
    fail_at: Option<MockStep>,
    /// Release the previous buffer whenever a new one arrives.
    retain_last: bool,
    /// Release everything held when the input port is disabled.
    flush_on_disable: bool,
}

/// Test-side view of a `MockSink` after it has been boxed into a session.
#[derive(Clone)]
pub(crate) struct MockSinkHandle {
    state: Arc<Mutex<MockState>>,
    pub allocator: Arc<CountingAllocator>,
}

impl MockSink {
    pub fn new() -> (Self, MockSinkHandle) {
        Self::with_allocator(CountingAllocator::new())
    }

    pub fn with_allocator(allocator: Arc<CountingAllocator>) -> (Self, MockSinkHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let handle = MockSinkHandle {
            state: state.clone(),
            allocator: allocator.clone(),
        };
        let sink = Self {
            state,
            allocator,
            fail_at: None,
            retain_last: false,
            flush_on_disable: true,
        };
        (sink, handle)
    }

    pub fn failing_at(mut self, step: MockStep) -> Self {
        self.fail_at = Some(step);
        self
    }

    pub fn retaining_last(mut self) -> Self {
        self.retain_last = true;
        self
    }

    pub fn holding_on_disable(mut self) -> Self {
        self.flush_on_disable = false;
        self
    }

    fn step(&self, name: &'static str, step: Option<MockStep>) -> Result<MutexGuard<'_, MockState>, SinkError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(name);
        if step.is_some() && step == self.fail_at {
            return Err(SinkError::InvalidState(name));
        }
        Ok(state)
    }
}

fn post_release(state: &mut MockState, buffer: FrameBuffer) {
    if let Some(events) = &state.input_events {
        let _ = events.send(SinkEvent::BufferReleased(buffer));
    }
}

impl RendererSink for MockSink {
    fn create_component(&mut self, _kind: ComponentKind) -> Result<(), SinkError> {
        self.step("create_component", Some(MockStep::CreateComponent))?;
        Ok(())
    }

    fn enable_control_port(&mut self, events: SinkEventSender) -> Result<(), SinkError> {
        self.step("enable_control_port", Some(MockStep::EnableControlPort))?
            .control_events = Some(events);
        Ok(())
    }

    fn commit_input_format(&mut self, format: &InputFormat) -> Result<(), SinkError> {
        self.step("commit_input_format", Some(MockStep::CommitInputFormat))?
            .format = Some(*format);
        Ok(())
    }

    fn enable_input_port(&mut self, events: SinkEventSender) -> Result<(), SinkError> {
        self.step("enable_input_port", Some(MockStep::EnableInputPort))?
            .input_events = Some(events);
        Ok(())
    }

    fn enable_component(&mut self) -> Result<(), SinkError> {
        self.step("enable_component", Some(MockStep::EnableComponent))?;
        Ok(())
    }

    fn payload_allocator(&self) -> Result<Arc<dyn PayloadAllocator>, SinkError> {
        self.step("payload_allocator", None)?;
        Ok(self.allocator.clone())
    }

    fn submit(&mut self, buffer: FrameBuffer) -> Result<(), SubmitRejected> {
        let mut state = self.state.lock().unwrap();
        if state.input_events.is_none() {
            return Err(SubmitRejected {
                buffer,
                reason: SinkError::InvalidState("input port disabled"),
            });
        }
        state.submitted += 1;
        state.held.push_back(buffer);
        if self.retain_last && state.held.len() > 1 {
            if let Some(previous) = state.held.pop_front() {
                post_release(&mut state, previous);
            }
        }
        Ok(())
    }

    fn disable_component(&mut self) -> Result<(), SinkError> {
        self.step("disable_component", None)?;
        Ok(())
    }

    fn disable_control_port(&mut self) -> Result<(), SinkError> {
        self.step("disable_control_port", None)?.control_events = None;
        Ok(())
    }

    fn disable_input_port(&mut self) -> Result<(), SinkError> {
        let mut state = self.step("disable_input_port", None)?;
        if self.flush_on_disable {
            while let Some(buffer) = state.held.pop_front() {
                post_release(&mut state, buffer);
            }
        }
        Ok(())
    }

    fn release_component(&mut self) -> Result<(), SinkError> {
        let mut state = self.step("release_component", None)?;
        state.input_events = None;
        state.control_events = None;
        Ok(())
    }
}

impl MockSinkHandle {
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn submitted(&self) -> usize {
        self.state.lock().unwrap().submitted
    }

    pub fn held(&self) -> usize {
        self.state.lock().unwrap().held.len()
    }

    /// Runs `f` over the buffers the sink currently holds, oldest first.
    pub fn with_held<R>(&self, f: impl FnOnce(&VecDeque<FrameBuffer>) -> R) -> R {
        f(&self.state.lock().unwrap().held)
    }

    pub fn format(&self) -> Option<InputFormat> {
        self.state.lock().unwrap().format
    }

    /// Posts a release for the oldest held buffer. Returns false if none is held.
    pub fn release_oldest(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.held.pop_front() {
            Some(buffer) => {
                post_release(&mut state, buffer);
                true
            }
            None => false,
        }
    }

    pub fn post_control_error(&self, error: SinkError) {
        let state = self.state.lock().unwrap();
        if let Some(events) = &state.control_events {
            let _ = events.send(SinkEvent::ControlError(error));
        }
    }

    /// Polls until the sink holds `count` buffers or `timeout` expires.
    pub fn wait_for_held(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.held() >= count {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        self.held() >= count
    }
}
