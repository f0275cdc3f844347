//! Generic input message reassembly
//!
//! Devices can idle silently, answer in fragments, or disconnect mid
//! transfer. [`InputMessageListener`] copes with all three: it drives a data
//! provider in a timed polling loop, aggregates whatever arrives, and hands
//! the aggregate to a handler which decides how much of it forms a complete
//! message. Unconsumed remainder data is carried into the next round.
//!
//! The loop races each provider call against a housekeeping timer. When the
//! timer fires first the still-pending call is kept and re-awaited on the
//! next iteration, so a slow device never causes two provider calls to be in
//! flight at once. Cancellation via [`InputMessageListener::dispose`] is
//! observed at loop boundaries only; a pending call is abandoned, never
//! interrupted, and its eventual result is discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{debug, error};

use crate::channel::CommunicationOptions;
use crate::error::CommunicationError;

/// Produces the next batch of input items from a device.
///
/// Typically a thin closure over a channel's `receive`.
pub type DataProvider<TInput> =
    Box<dyn FnMut() -> BoxFuture<'static, Result<Vec<TInput>, CommunicationError>> + Send>;

/// Consumes the current aggregate of input items.
///
/// The handler is not required to be stateful: it may indicate that more
/// data is expected by returning the incomplete tail as remainder, which the
/// listener prefixes onto the next aggregate.
pub type InputHandler<TInput> =
    Box<dyn FnMut(Vec<TInput>) -> BoxFuture<'static, HandlerResponse<TInput>> + Send>;

/// The handler's verdict on an aggregate.
#[derive(Debug, Default)]
pub struct HandlerResponse<TInput> {
    /// Unconsumed data to keep for the next round. `None` or empty means the
    /// aggregate was fully consumed.
    pub remainder: Option<Vec<TInput>>,
}

struct ListenerWork<TInput> {
    provider: DataProvider<TInput>,
    handler: InputHandler<TInput>,
}

/// Continuously polls a data provider and reassembles its output into
/// messages.
///
/// One listener owns one polling loop; `start` launches it as a detached
/// background task. Failures inside the loop never surface to the caller of
/// `start` - they dispose the listener and are logged.
pub struct InputMessageListener<TInput> {
    work: Mutex<Option<ListenerWork<TInput>>>,
    disposed: Arc<AtomicBool>,
    wait_timeout: Duration,
}

impl<TInput: Send + 'static> InputMessageListener<TInput> {
    /// Create a listener over a provider/handler pair using the wait timeout
    /// from `options`.
    pub fn new(
        provider: DataProvider<TInput>,
        handler: InputHandler<TInput>,
        options: &CommunicationOptions,
    ) -> Self {
        Self {
            work: Mutex::new(Some(ListenerWork { provider, handler })),
            disposed: Arc::new(AtomicBool::new(false)),
            wait_timeout: Duration::from_millis(options.message_wait_timeout_ms),
        }
    }

    /// Whether this listener has been disposed, either explicitly or by a
    /// provider error.
    pub fn disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Stop the polling loop. Idempotent; a provider call already in flight
    /// is abandoned and its eventual result discarded.
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    /// Launch the polling loop as a detached background task and return
    /// immediately. Calling `start` more than once is a no-op.
    pub fn start(&self) {
        let Some(mut work) = self.work.lock().expect("listener work lock").take() else {
            return;
        };

        let disposed = self.disposed.clone();
        let wait_timeout = self.wait_timeout;

        tokio::spawn(async move {
            let mut aggregate: Vec<TInput> = Vec::new();
            let mut in_flight: Option<
                BoxFuture<'static, Result<Vec<TInput>, CommunicationError>>,
            > = None;

            while !disposed.load(Ordering::Acquire) {
                // Resume awaiting an already-in-progress call rather than
                // starting a second one.
                let mut pending = in_flight.take().unwrap_or_else(|| (work.provider)());

                let result = match tokio::time::timeout(wait_timeout, &mut pending).await {
                    // Housekeeping tick: the device is idle. Keep the pending
                    // call for the next round and re-check disposal.
                    Err(_elapsed) => {
                        in_flight = Some(pending);
                        continue;
                    }
                    Ok(result) => result,
                };

                let batch = match result {
                    Ok(batch) => batch,
                    Err(err) => {
                        // Fatal for this listener only; the owner observes it
                        // through the disposed flag.
                        error!("error getting data from source: {err}");
                        disposed.store(true, Ordering::Release);
                        break;
                    }
                };

                if batch.is_empty() {
                    continue;
                }

                aggregate.extend(batch);
                debug!(
                    "got data from provider, {} items in receive buffer",
                    aggregate.len()
                );

                // The handler decides whether the aggregate was sufficient.
                let response = (work.handler)(std::mem::take(&mut aggregate)).await;
                let remainder = response.remainder.unwrap_or_default();
                if !remainder.is_empty() {
                    debug!(
                        "input handler returned a {} item incomplete buffer",
                        remainder.len()
                    );
                }
                aggregate = remainder;
            }

            debug!("input message listener loop stopped");
        });
    }
}
