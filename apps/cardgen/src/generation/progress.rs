//! Progress notifications emitted while a generation is in flight.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// A retryable failure happened and attempt `count` of `max` retries is starting.
    Retry { count: u32, max: u32, reason: String },
}

/// Receiver of progress events. Delivery is fire-and-forget: a sink must not
/// block and its failures never affect the generation.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, event: GenerationEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn notify(&self, _event: GenerationEvent) {}
}

impl ProgressSink for UnboundedSender<GenerationEvent> {
    fn notify(&self, event: GenerationEvent) {
        if self.send(event).is_err() {
            debug!("progress receiver dropped, event discarded");
        }
    }
}
