// Card layout: fixed geometry, block measurement, page packing, the preview
// session and per-page spacing.
// Everything here is synchronous and pure apart from `PaginationSession`.

pub mod font_metrics;
pub mod geometry;
pub mod measure;
pub mod page_fill;
pub mod paginator;
pub mod session;

// Re-export the public API consumed by the studio and export modules.
pub use geometry::{CardGeometry, FontSpec, PaginationConfig};
pub use measure::{MetricMeasurer, TextMeasurer};
pub use page_fill::{plan_spacing, SpacingPlan};
pub use paginator::{paginate, CardExtension, MeasuredBlock, Page, Pagination, PLACEHOLDER_HTML};
pub use session::PaginationSession;
