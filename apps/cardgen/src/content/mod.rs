//! Content pipeline: recover the model's payload, check it is complete, and
//! bring its HTML into the canonical card form.

pub(crate) mod emoji;
pub(crate) mod html;
pub mod normalizer;
pub mod parser;
pub mod plain_text;
pub mod validator;

pub use emoji::is_emoji;
pub use normalizer::{normalize, parse_blocks, BlockKind, ContentBlock, LIST_ITEM_CLASS};
pub use parser::{parse, GenerationResult};
pub use plain_text::extract_plain_text;
pub use validator::{check_completeness, ends_mid_tag, is_complete, IncompleteReason};
