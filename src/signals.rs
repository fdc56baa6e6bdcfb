// src/signals.rs
//! SignalActor - turns SIGINT/SIGTERM into an abort request.
//!
//! The termination signals are blocked in every thread and collected
//! synchronously with `sigwait` on a dedicated thread, so no code runs in
//! signal-handler context. The first signal requests a cooperative abort; a
//! second one arriving while shutdown is still in progress aborts the process.
//!
//! `block_termination_signals()` must run on the main thread before any other
//! thread is spawned so that every thread inherits the mask.

use crate::flow::AbortToken;
use anyhow::{Context, Result};
use log::*;
use nix::sys::signal::{SigSet, Signal};
use std::thread::{self, JoinHandle};

/// Blocks SIGINT and SIGTERM on the calling thread and returns the set.
pub fn block_termination_signals() -> Result<SigSet> {
    let mut mask = SigSet::empty();
    mask.add(Signal::SIGINT);
    mask.add(Signal::SIGTERM);
    mask.thread_block()
        .context("Failed to block termination signals")?;
    Ok(mask)
}

pub struct SignalActor {
    // Never joined: the thread sits in sigwait for the life of the process.
    _thread_handle: JoinHandle<()>,
}

impl SignalActor {
    pub fn spawn(mask: SigSet, abort: AbortToken) -> Result<Self> {
        let thread_handle = thread::Builder::new()
            .name("signals".to_string())
            .spawn(move || run(mask, abort))
            .context("Failed to spawn signal thread")?;

        debug!("SignalActor spawned");
        Ok(Self {
            _thread_handle: thread_handle,
        })
    }
}

/// What to do about a termination signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: the abort flag was just set.
    Shutdown,
    /// Shutdown was already under way.
    Terminate,
}

/// Sets the abort flag on the first signal and escalates on any later one.
pub fn on_termination_signal(abort: &AbortToken) -> SignalAction {
    if abort.request_abort() {
        SignalAction::Shutdown
    } else {
        SignalAction::Terminate
    }
}

fn run(mask: SigSet, abort: AbortToken) {
    loop {
        let signal = match mask.wait() {
            Ok(signal) => signal,
            Err(e) => {
                error!("SignalActor: sigwait failed: {}", e);
                return;
            }
        };

        match on_termination_signal(&abort) {
            SignalAction::Shutdown => info!("SignalActor: {} received, shutting down", signal),
            SignalAction::Terminate => {
                error!("SignalActor: {} received during shutdown, aborting", signal);
                std::process::abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowController;
    use test_log::test;

    #[test]
    fn second_signal_escalates() {
        let flow = FlowController::new();
        let abort = flow.abort_token();

        assert_eq!(on_termination_signal(&abort), SignalAction::Shutdown);
        assert!(flow.is_aborted());
        assert_eq!(on_termination_signal(&abort), SignalAction::Terminate);
        assert_eq!(on_termination_signal(&abort), SignalAction::Terminate);
    }

    #[test]
    fn signal_after_abort_requested_elsewhere_terminates() {
        let flow = FlowController::new();
        flow.request_abort();
        assert_eq!(on_termination_signal(&flow.abort_token()), SignalAction::Terminate);
    }
}
