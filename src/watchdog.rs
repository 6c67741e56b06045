//! Execution deadlines and host-side interruption.
//!
//! A [`Watchdog`] is armed for the duration of one operation. If the
//! operation is still running when the deadline passes, the watchdog thread
//! terminates execution in the isolate. It is disarmed as soon as the
//! operation returns and never outlives it.

#![warn(clippy::all, rust_2018_idioms)]

use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::warn;

pub(crate) struct Watchdog {
    disarm: mpsc::Sender<()>,
    thread: JoinHandle<bool>,
}

impl Watchdog {
    pub(crate) fn arm(handle: v8::IsolateHandle, timeout: Duration) -> Self {
        let (disarm, disarmed) = mpsc::channel::<()>();

        let thread = thread::spawn(move || match disarmed.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => {
                warn!(?timeout, "script exceeded its deadline, terminating");
                handle.terminate_execution();
                true
            }
            // Disarmed, or the sender went away with the operation.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => false,
        });

        Self { disarm, thread }
    }

    /// Stop the watchdog. Returns `true` if it fired.
    pub(crate) fn disarm(self) -> bool {
        let _ = self.disarm.send(());
        self.thread.join().unwrap_or(false)
    }
}

/// Terminates JavaScript running in a [`Context`](crate::Context) from any thread.
///
/// Interrupting while nothing runs makes the next operation on the context
/// fail with [`Error::Terminated`](crate::Error::Terminated); the context
/// stays usable afterwards.
#[derive(Clone)]
pub struct InterruptHandle {
    handle: v8::IsolateHandle,
}

impl InterruptHandle {
    pub(crate) fn new(handle: v8::IsolateHandle) -> Self {
        Self { handle }
    }

    /// Request termination. Returns `false` if the isolate no longer exists.
    pub fn interrupt(&self) -> bool {
        self.handle.terminate_execution()
    }
}

impl std::fmt::Debug for InterruptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptHandle").finish_non_exhaustive()
    }
}
