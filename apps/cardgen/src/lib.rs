//! cardgen: topic + keyword in, paginated social-card pages out.
//!
//! Pipeline: `generation` asks the model for `{title, content}` and retries
//! until `content` recovers a complete card; `content` normalizes the HTML;
//! `layout` measures and packs it into card pages; `export` hands each page
//! to a `Rasterizer`. `CardStudio` wires the stages together.

pub mod config;
pub mod content;
pub mod errors;
pub mod export;
pub mod generation;
pub mod layout;
pub mod llm_client;
pub mod studio;
pub mod telemetry;

pub use config::Config;
pub use errors::{CardError, ErrorKind};
pub use export::{ExportOptions, Rasterizer, RenderRequest, RenderedImage};
pub use generation::{GenerationEvent, GenerationRequest, GenerationResult, ProgressSink, RetryPolicy};
pub use layout::{CardGeometry, PaginationConfig, PaginationSession, TextMeasurer};
pub use llm_client::{CompletionProvider, CompletionRequest, LlmClient};
pub use studio::CardStudio;
pub use telemetry::init_tracing;
