// src/flow.rs
//! FlowController - bounds how many buffers are outstanding at the sink.
//!
//! Two buffers may be in flight at once: the one the sink is consuming and the
//! next one queued behind it. The producer blocks in `begin_submit()` on a
//! condition variable until a release brings the count below the ceiling, so
//! production is paced by the sink's consumption rate.
//!
//! The abort flag lives under the same mutex. Requesting abort wakes a blocked
//! producer so shutdown does not depend on further release traffic.

use log::*;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Maximum number of buffers outstanding at the sink.
pub const FLOW_CONTROL_CEILING: usize = 2;

/// State shared between the producer and the release path.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineState {
    pub buffers_in_use: usize,
    pub aborted: bool,
}

/// Outcome of `FlowController::begin_submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SubmitGate {
    /// The submission was counted; hand the buffer to the sink.
    Granted,
    /// Abort was requested while waiting; the buffer must not be submitted.
    Aborted,
}

pub struct FlowController {
    state: Mutex<PipelineState>,
    may_submit: Condvar,
}

impl FlowController {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PipelineState::default()),
            may_submit: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Call before handing a buffer to the sink.
    ///
    /// Blocks while the ceiling is reached, then counts the submission. If
    /// abort is requested during the wait, returns `SubmitGate::Aborted`
    /// without counting anything.
    pub fn begin_submit(&self) -> SubmitGate {
        let mut state = self.lock();
        while state.buffers_in_use >= FLOW_CONTROL_CEILING && !state.aborted {
            trace!(
                "FlowController: {} buffers in flight, waiting",
                state.buffers_in_use
            );
            state = self
                .may_submit
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if state.buffers_in_use >= FLOW_CONTROL_CEILING {
            debug!("FlowController: abort requested while waiting to submit");
            return SubmitGate::Aborted;
        }

        state.buffers_in_use += 1;
        SubmitGate::Granted
    }

    /// Undoes a granted submission the sink refused.
    pub fn cancel_submit(&self) {
        self.on_released();
    }

    /// Call when the sink releases a buffer.
    pub fn on_released(&self) {
        let mut state = self.lock();
        match state.buffers_in_use.checked_sub(1) {
            Some(remaining) => state.buffers_in_use = remaining,
            None => {
                error!("FlowController: release without a matching submit");
                return;
            }
        }
        if state.buffers_in_use < FLOW_CONTROL_CEILING {
            self.may_submit.notify_one();
        }
    }

    /// Sets the abort flag and wakes a producer blocked in `begin_submit`.
    /// Returns true the first time only.
    pub fn request_abort(&self) -> bool {
        let mut state = self.lock();
        if state.aborted {
            return false;
        }
        state.aborted = true;
        self.may_submit.notify_all();
        true
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    pub fn buffers_in_use(&self) -> usize {
        self.lock().buffers_in_use
    }

    pub fn snapshot(&self) -> PipelineState {
        *self.lock()
    }

    pub fn abort_token(self: &Arc<Self>) -> AbortToken {
        AbortToken {
            flow: Arc::clone(self),
        }
    }
}

/// Cooperative cancellation handle for the render loop.
///
/// Cloned into the signal handler thread; the pipeline checks it once per
/// iteration.
#[derive(Clone)]
pub struct AbortToken {
    flow: Arc<FlowController>,
}

impl AbortToken {
    /// Returns true if this call set the flag.
    pub fn request_abort(&self) -> bool {
        self.flow.request_abort()
    }

    pub fn is_aborted(&self) -> bool {
        self.flow.is_aborted()
    }
}
