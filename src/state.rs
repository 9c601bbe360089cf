//! Shared run configuration and run-state flags.
//!
//! A single [`SharedState`] instance is created at startup and passed (behind
//! an `Arc`) to every task. The foreground control loop is the only writer of
//! [`Settings`]; the background harness loop takes snapshots each tick. The
//! boolean flags are atomics so the two loops never contend on a lock for
//! them.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Mutable run configuration, mutated only by control-loop command handlers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    /// Desired number of live subscriber worker processes
    pub num_subscribers: usize,
    /// Desired number of live publisher connections
    pub num_publishers: usize,
    /// Messages sent per `run` burst
    pub num_messages: usize,
    /// Sleep between consecutive burst messages, in seconds (> 0)
    pub seconds_between_publishes: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            num_subscribers: crate::defaults::NUM_SUBSCRIBERS,
            num_publishers: crate::defaults::NUM_PUBLISHERS,
            num_messages: crate::defaults::NUM_MESSAGES,
            seconds_between_publishes: crate::defaults::SECONDS_BETWEEN_PUBLISHES,
        }
    }
}

/// Run-state flags shared between the foreground and background loops.
///
/// `running` doubles as the cooperative cancellation signal: background tasks
/// check it once per tick and exit when it clears. The request flags are
/// set by command handlers and consumed (swapped to false) by the background
/// stats-servicing step.
#[derive(Debug, Default)]
pub struct AppState {
    running: AtomicBool,
    reset_requested: AtomicBool,
    show_requested: AtomicBool,
}

/// The shared context object threaded into every task.
#[derive(Debug)]
pub struct SharedState {
    settings: RwLock<Settings>,
    app: AppState,
}

impl SharedState {
    pub fn new(settings: Settings) -> Self {
        let app = AppState::default();
        app.running.store(true, Ordering::SeqCst);
        Self {
            settings: RwLock::new(settings),
            app,
        }
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    /// Apply a single mutation to the settings under the write lock.
    ///
    /// Each command handler performs exactly one such mutation; no operation
    /// spans the foreground and a background tick as one transaction.
    pub fn update_settings<F>(&self, f: F)
    where
        F: FnOnce(&mut Settings),
    {
        f(&mut self.settings.write());
    }

    pub fn is_running(&self) -> bool {
        self.app.running.load(Ordering::SeqCst)
    }

    /// Signal cooperative shutdown; observed at the next tick boundary.
    pub fn shutdown(&self) {
        self.app.running.store(false, Ordering::SeqCst);
    }

    pub fn request_reset(&self) {
        self.app.reset_requested.store(true, Ordering::SeqCst);
    }

    pub fn request_show(&self) {
        self.app.show_requested.store(true, Ordering::SeqCst);
    }

    /// Consume a pending reset request, if any.
    pub fn take_reset_request(&self) -> bool {
        self.app.reset_requested.swap(false, Ordering::SeqCst)
    }

    /// Consume a pending show request, if any.
    pub fn take_show_request(&self) -> bool {
        self.app.show_requested.swap(false, Ordering::SeqCst)
    }
}
