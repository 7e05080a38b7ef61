//! Cooperative periodic-task scheduler
//!
//! Runs an update operation on a jittered interval in a background
//! thread, strictly serialized: a new cycle never starts while the
//! previous update is in flight. Stopping interrupts the sleep but
//! never aborts an in-flight update.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LooperError {
    #[error("looper is already running")]
    AlreadyRunning,

    #[error("looper is already stopping")]
    AlreadyStopping,
}

/// One-shot stop signal with an interruptible wait.
pub struct ShutdownSignal {
    flag: Mutex<bool>,
    cv: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn trigger(&self) {
        let mut flag = self.flag.lock().unwrap_or_else(|e| e.into_inner());
        *flag = true;
        self.cv.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.flag.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Re-arm after a trigger. Callers must ensure no waiter from the
    /// previous run is still blocked on the signal.
    pub fn reset(&self) {
        *self.flag.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }

    /// Wait for up to `timeout`. Returns true if the signal fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let flag = self.flag.lock().unwrap_or_else(|e| e.into_inner());
        if *flag {
            return true;
        }
        let (flag, _) = self
            .cv
            .wait_timeout_while(flag, timeout, |triggered| !*triggered)
            .unwrap_or_else(|e| e.into_inner());
        *flag
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs an update operation every `interval`, jittered to
/// 0.75x-1.25x, until stopped.
pub struct Looper {
    interval: Duration,
    signal: Arc<ShutdownSignal>,
    handle: Option<JoinHandle<()>>,
    stop_requested: bool,
}

impl Looper {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            signal: Arc::new(ShutdownSignal::new()),
            handle: None,
            stop_requested: false,
        }
    }

    /// Start the loop. Update failures are routed to `on_error` and do
    /// not stop the loop.
    pub fn start<F, E, C>(&mut self, mut update: F, on_error: C) -> Result<(), LooperError>
    where
        F: FnMut() -> Result<(), E> + Send + 'static,
        C: Fn(E) + Send + 'static,
        E: Send + 'static,
    {
        if self.handle.is_some() {
            return Err(LooperError::AlreadyRunning);
        }
        self.signal = Arc::new(ShutdownSignal::new());
        self.stop_requested = false;

        let signal = Arc::clone(&self.signal);
        let interval = self.interval;
        self.handle = Some(thread::spawn(move || loop {
            let jitter = 0.75 + 0.5 * rand::thread_rng().gen::<f64>();
            if signal.wait_timeout(interval.mul_f64(jitter)) {
                break;
            }
            if let Err(e) = update() {
                on_error(e);
            }
            if signal.is_triggered() {
                break;
            }
        }));
        Ok(())
    }

    /// Request termination. No further cycles start; an in-flight
    /// update is left to finish.
    pub fn stop(&mut self) -> Result<(), LooperError> {
        if self.handle.is_none() || self.stop_requested {
            return Err(LooperError::AlreadyStopping);
        }
        self.stop_requested = true;
        self.signal.trigger();
        Ok(())
    }

    /// Wait for the loop thread to exit. Returns immediately when the
    /// loop is not running.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.stop_requested = false;
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Looper {
    fn drop(&mut self) {
        let _ = self.stop();
        self.join();
    }
}
