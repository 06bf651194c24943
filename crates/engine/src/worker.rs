//! Background workers for long operations.
//!
//! A worker runs one closure against a clone of the session on its own
//! thread and reports the result over a channel, so the caller can wait a
//! bounded time instead of blocking on `join`. The clone carries a fresh
//! one-shot cancel flag, so requests made on other handles neither reach
//! nor are lowered by the worker.

use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::{debug, warn};

use crate::{CancelFlag, Session};

/// Handle to a running background operation.
pub struct Worker<T> {
    name: String,
    cancel: CancelFlag,
    done: Receiver<T>,
    handle: Option<JoinHandle<()>>,
}

impl<T> fmt::Debug for Worker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl<T> Worker<T> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Asks the worker to stop. Stays in effect for every long operation
    /// the worker runs afterwards.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once the operation has returned (or panicked).
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Waits up to `timeout` for the result.
    ///
    /// Returns `Ok(None)` on timeout; the worker keeps running and can be
    /// waited on again.
    ///
    /// # Errors
    ///
    /// Fails if the operation panicked or its result was already taken.
    pub fn wait(&mut self, timeout: Duration) -> Result<Option<T>> {
        match self.done.recv_timeout(timeout) {
            Ok(value) => {
                if let Some(h) = self.handle.take() {
                    h.join()
                        .map_err(|_| anyhow!("worker {} panicked after reporting", self.name))?;
                }
                debug!(worker = %self.name, "worker finished");
                Ok(Some(value))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                self.handle.take();
                Err(anyhow!("worker {} ended without a result", self.name))
            }
        }
    }
}

impl Session {
    /// Runs `op` on a new thread against a handle to this session.
    ///
    /// # Errors
    ///
    /// Fails if the thread cannot be spawned.
    pub fn spawn<T, F>(&self, name: &str, op: F) -> Result<Worker<T>>
    where
        T: Send + 'static,
        F: FnOnce(&Session) -> T + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let cancel = CancelFlag::one_shot();
        let session = Session {
            cancel: cancel.clone(),
            ..self.clone()
        };
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let out = op(&session);
                // the receiver may be gone after an abandoned shutdown
                let _ = tx.send(out);
            })
            .with_context(|| format!("spawning worker {}", name))?;

        debug!(worker = name, "worker started");
        Ok(Worker {
            name: name.to_string(),
            cancel,
            done: rx,
            handle: Some(handle),
        })
    }

    /// Cancels `worker` and waits up to `timeout` for it.
    ///
    /// Returns the worker's result, or `None` if it did not stop in time or
    /// failed. A worker that does not stop is detached.
    pub fn shutdown<T>(&self, mut worker: Worker<T>, timeout: Duration) -> Option<T> {
        worker.cancel();
        match worker.wait(timeout) {
            Ok(Some(value)) => Some(value),
            Ok(None) => {
                warn!(worker = %worker.name, ?timeout, "worker did not stop in time, detaching");
                None
            }
            Err(e) => {
                warn!(worker = %worker.name, error = %e, "worker failed during shutdown");
                None
            }
        }
    }

    /// [`Session::shutdown`] with the configured timeout.
    pub fn shutdown_default<T>(&self, worker: Worker<T>) -> Option<T> {
        let timeout = self.config.shutdown_timeout;
        self.shutdown(worker, timeout)
    }
}
