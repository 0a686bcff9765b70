//! Page Fill: spreads leftover vertical space on an under-filled page.
//!
//! A page whose blocks use less than 90% of the content area looks top-heavy.
//! The leftover space is either shared out between blocks or, for a lone short
//! block, split above and below it.

use serde::{Deserialize, Serialize};

/// Below this fill ratio a page gets spacing adjustments.
pub const FILL_THRESHOLD: f32 = 0.9;
/// A single block is centered only when it fills less than this.
pub const CENTER_THRESHOLD: f32 = 0.7;

/// How the renderer should space the blocks of one page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SpacingPlan {
    /// Render with default spacing.
    NoAction,
    /// Add `extra_per_gap` pixels between each pair of adjacent blocks.
    DistributeGaps { extra_per_gap: f32 },
    /// Pad the single block by `vertical_padding` pixels above and below.
    CenterSingle { vertical_padding: f32 },
}

/// Decides how to use the space a page's content leaves empty.
pub fn plan_spacing(content_height: f32, container_height: f32, block_count: usize) -> SpacingPlan {
    if block_count == 0
        || container_height <= 0.0
        || content_height >= container_height
        || content_height >= container_height * FILL_THRESHOLD
    {
        return SpacingPlan::NoAction;
    }

    let leftover = container_height - content_height;
    if block_count >= 2 {
        return SpacingPlan::DistributeGaps {
            extra_per_gap: leftover / (block_count - 1) as f32,
        };
    }

    if content_height < container_height * CENTER_THRESHOLD {
        SpacingPlan::CenterSingle {
            vertical_padding: leftover / 2.0,
        }
    } else {
        SpacingPlan::NoAction
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
