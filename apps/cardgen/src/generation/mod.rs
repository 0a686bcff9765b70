// Card generation: one topic + keyword in, one validated and normalized
// `GenerationResult` out. All model calls go through `CompletionProvider`.

pub mod orchestrator;
pub mod progress;

use serde::{Deserialize, Serialize};

pub use crate::content::GenerationResult;
pub use orchestrator::{generate, RetryPolicy, RetryState};
pub use progress::{GenerationEvent, NoopSink, ProgressSink};

/// What the user asked a card to be about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub topic: String,
    pub keyword: String,
}

impl GenerationRequest {
    pub fn new(topic: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            keyword: keyword.into(),
        }
    }
}
