//! Event task handles.
//!
//! A browser keeps an event alive while the promise passed to `waitUntil` is
//! pending. Here every handler spawns its work and hands back an
//! [`EventTask`]; the host awaits [`EventTask::finished`] before it treats the
//! event as done or tears the worker down.

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::{Result, ServiceWorkerError};

/// Handle to the pending work of one dispatched event.
#[derive(Debug)]
#[must_use = "the event is only finished once the task has been awaited"]
pub struct EventTask<T> {
    event: &'static str,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> EventTask<T> {
    /// Spawn the work for an event on the current runtime.
    pub(crate) fn spawn<F>(event: &'static str, work: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        debug!(event, "Dispatching event");
        Self {
            event,
            handle: tokio::spawn(work),
        }
    }

    /// Name of the event this task belongs to.
    pub fn event(&self) -> &'static str {
        self.event
    }

    /// Whether the work has completed.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the event's work to run to completion.
    pub async fn finished(self) -> Result<T> {
        let event = self.event;
        match self.handle.await {
            Ok(value) => {
                debug!(event, "Event settled");
                Ok(value)
            }
            Err(e) => {
                error!(event, error = %e, "Event task did not complete");
                Err(ServiceWorkerError::TaskFailed {
                    event,
                    message: e.to_string(),
                })
            }
        }
    }
}
