//! Signal handling for graceful shutdown (SIGINT/SIGTERM)
//!
//! On the first signal the cancellation flag is raised: the poll loop and the
//! fetcher stop at their next check, tunnel guards drop and the process exits
//! with [`EXIT_CODE_CANCELLED`]. A second signal kills every tracked helper
//! process and exits immediately with the same code. The submitted job itself
//! is left running.

use std::process::Child;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Exit code for cancelled runs
pub const EXIT_CODE_CANCELLED: i32 = 80;

/// Signal handler state
#[derive(Debug, Default)]
pub struct SignalState {
    cancel_requested: AtomicBool,
    immediate_exit: AtomicBool,
    signal_count: AtomicU8,
    children: Mutex<Vec<(u32, Arc<Mutex<Child>>)>>,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Check if immediate exit has been requested (second signal)
    pub fn is_immediate_exit(&self) -> bool {
        self.immediate_exit.load(Ordering::SeqCst)
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Track a helper process that must not outlive an immediate exit.
    pub fn track_child(&self, pid: u32, child: Arc<Mutex<Child>>) {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((pid, child));
    }

    /// Stop tracking `pid`, once its owner has reaped it.
    pub fn untrack_child(&self, pid: u32) {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(tracked, _)| *tracked != pid);
    }

    pub fn tracked_children(&self) -> usize {
        self.children.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Kill every tracked helper process. Returns how many were signalled.
    pub fn kill_children(&self) -> usize {
        // Release the registry before locking any child.
        let children = std::mem::take(&mut *self.children.lock().unwrap_or_else(PoisonError::into_inner));
        for (pid, child) in &children {
            let mut child = child.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = child.kill() {
                tracing::debug!(pid, error = %e, "helper process already gone");
            }
        }
        children.len()
    }

    /// Record one SIGINT/SIGTERM and return what to do about it.
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.signal_count.fetch_add(1, Ordering::SeqCst);

        match count {
            0 => {
                self.cancel_requested.store(true, Ordering::SeqCst);
                SignalAction::InitiateCancellation
            }
            1 => {
                self.immediate_exit.store(true, Ordering::SeqCst);
                SignalAction::ImmediateExit
            }
            _ => SignalAction::Ignore,
        }
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    InitiateCancellation,
    ImmediateExit,
    Ignore,
}

/// Installs the process-wide handler and hands out the shared state.
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SignalState::new()),
        }
    }

    pub fn state(&self) -> Arc<SignalState> {
        Arc::clone(&self.state)
    }

    /// Install the SIGINT/SIGTERM handler. Call once at startup.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::InitiateCancellation => {
                tracing::warn!("received interrupt, cancelling (job keeps running in the cluster)");
            }
            SignalAction::ImmediateExit => {
                eprintln!("\nReceived second interrupt, exiting immediately");
                state.kill_children();
                std::process::exit(EXIT_CODE_CANCELLED);
            }
            SignalAction::Ignore => {}
        })
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
