//! Export: renders every card page to PNG through an external rasterizer.
//!
//! Pages are shown one at a time in the session, given a settle delay, and
//! captured in order. Whatever happens, the page the user was looking at is
//! shown again afterwards.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::CardError;
use crate::layout::{
    paginator::measure_blocks, plan_spacing, CardGeometry, PaginationConfig, PaginationSession,
    SpacingPlan, TextMeasurer,
};

/// Used as the file stem when the title has nothing usable left.
pub const FALLBACK_FILE_STEM: &str = "card";

static FILE_NAME_FORBIDDEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[\\/:*?"<>|]"#).expect("FILE_NAME_FORBIDDEN: hardcoded regex is valid")
});

static UNDERSCORE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\s_]+").expect("UNDERSCORE_RUN: hardcoded regex is valid")
});

// ────────────────────────────────────────────────────────────────────────────
// Rasterizer seam
// ────────────────────────────────────────────────────────────────────────────

/// One page handed to the rasterizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderRequest {
    pub page_index: usize,
    pub page_count: usize,
    pub title: String,
    pub html: String,
    /// Card size in CSS pixels.
    pub width: f32,
    pub height: f32,
    /// Output pixels per CSS pixel.
    pub pixel_ratio: f32,
    pub spacing: SpacingPlan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub page_index: usize,
    pub page_count: usize,
    /// Output size in device pixels.
    pub width: u32,
    pub height: u32,
    pub png: Bytes,
    pub file_stem: String,
}

impl RenderedImage {
    /// Download name, e.g. `Small_habits.png` or `Small_habits_page2.png`.
    pub fn file_name(&self) -> String {
        if self.page_count > 1 {
            format!("{}_page{}.png", self.file_stem, self.page_index + 1)
        } else {
            format!("{}.png", self.file_stem)
        }
    }
}

/// Renders one card fragment at a fixed size.
///
/// Implementations own the actual drawing (headless browser, native renderer,
/// etc.) and report any failure as `CardError::RenderFailure`.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, request: &RenderRequest) -> Result<RenderedImage, CardError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Options
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Wait between showing a page and capturing it.
    pub settle_delay: Duration,
    pub pixel_ratio: f32,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            pixel_ratio: 2.0,
        }
    }
}

/// Layout inputs needed to size and space each exported page.
#[derive(Clone, Copy)]
pub struct ExportLayout<'a> {
    pub geometry: &'a CardGeometry,
    pub measurer: &'a dyn TextMeasurer,
    pub config: &'a PaginationConfig,
}

// ────────────────────────────────────────────────────────────────────────────
// Export
// ────────────────────────────────────────────────────────────────────────────

/// Renders every page of `session` in order.
///
/// The session's current page is restored on success and on failure. The first
/// rasterizer error aborts the export and is reported as `RenderFailure`.
pub async fn export_pages(
    session: &mut PaginationSession,
    title: &str,
    layout: ExportLayout<'_>,
    options: &ExportOptions,
    rasterizer: &dyn Rasterizer,
) -> Result<Vec<RenderedImage>, CardError> {
    let original_index = session.current_index();
    let result = render_all(session, title, layout, options, rasterizer).await;
    session.show(original_index);

    match result {
        Ok(images) => {
            info!(pages = images.len(), "card export finished");
            Ok(images)
        }
        Err(e) => {
            warn!(error = %e, "card export failed");
            Err(match e {
                CardError::RenderFailure(msg) => CardError::RenderFailure(msg),
                other => CardError::RenderFailure(other.to_string()),
            })
        }
    }
}

async fn render_all(
    session: &mut PaginationSession,
    title: &str,
    layout: ExportLayout<'_>,
    options: &ExportOptions,
    rasterizer: &dyn Rasterizer,
) -> Result<Vec<RenderedImage>, CardError> {
    let page_count = session.page_count();
    let (width, height) = card_size(session, layout.geometry);
    let stem = file_stem(title);
    let mut images = Vec::with_capacity(page_count);

    for index in 0..page_count {
        session.show(index);
        tokio::time::sleep(options.settle_delay).await;

        let page = session.current_page();
        let spacing = if session.has_multiple_pages() {
            let measured = measure_blocks(page.blocks.clone(), layout.geometry, layout.measurer, layout.config);
            let content_height: f32 = measured.iter().map(|m| m.with_margin).sum();
            plan_spacing(content_height, layout.geometry.available_height(), measured.len())
        } else {
            SpacingPlan::NoAction
        };

        let request = RenderRequest {
            page_index: index,
            page_count,
            title: title.to_string(),
            html: page.html(),
            width,
            height,
            pixel_ratio: options.pixel_ratio,
            spacing,
        };
        debug!(page = index + 1, page_count, ?spacing, "rasterizing page");

        let mut image = rasterizer.rasterize(&request).await?;
        image.page_index = index;
        image.page_count = page_count;
        image.file_stem = stem.clone();
        images.push(image);
    }
    Ok(images)
}

/// Card size in CSS pixels, taller when the session carries an extension.
fn card_size(session: &PaginationSession, geometry: &CardGeometry) -> (f32, f32) {
    let height = session
        .extension()
        .map_or(geometry.card_height, |ext| ext.height);
    (geometry.card_width, height)
}

/// Makes `title` safe as a file name: forbidden characters removed,
/// whitespace and underscore runs collapsed into one underscore.
pub fn file_stem(title: &str) -> String {
    let cleaned = FILE_NAME_FORBIDDEN.replace_all(title.trim(), "");
    let joined = UNDERSCORE_RUN.replace_all(&cleaned, "_");
    let stem = joined.trim_matches('_');
    if stem.is_empty() {
        FALLBACK_FILE_STEM.to_string()
    } else {
        stem.to_string()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::content::html;
    use crate::layout::{paginate, FontSpec, MetricMeasurer, Pagination};

    /// Height = number in the block text.
    struct NumberMeasurer;

    impl TextMeasurer for NumberMeasurer {
        fn measure(&self, html: &str, _width: f32, _font: &FontSpec) -> f32 {
            html::strip_tags(html).trim().parse().unwrap_or(0.0)
        }
    }

    /// Records requests and fails on the page index given, if any.
    #[derive(Default)]
    struct FakeRasterizer {
        fail_on: Option<usize>,
        seen: Mutex<Vec<RenderRequest>>,
    }

    #[async_trait]
    impl Rasterizer for FakeRasterizer {
        async fn rasterize(&self, request: &RenderRequest) -> Result<RenderedImage, CardError> {
            self.seen.lock().unwrap().push(request.clone());
            if self.fail_on == Some(request.page_index) {
                return Err(CardError::RenderFailure("canvas lost".into()));
            }
            Ok(RenderedImage {
                page_index: request.page_index,
                page_count: request.page_count,
                width: (request.width * request.pixel_ratio) as u32,
                height: (request.height * request.pixel_ratio) as u32,
                png: Bytes::from_static(b"\x89PNG"),
                file_stem: String::new(),
            })
        }
    }

    fn session_for(content: &str) -> PaginationSession {
        let pagination: Pagination = paginate(
            content,
            &CardGeometry::default(),
            &NumberMeasurer,
            &PaginationConfig::default(),
        );
        PaginationSession::from_pagination(pagination)
    }

    fn three_pages() -> PaginationSession {
        // 4 blocks of 115 with margin; page limit 322.5 fits two, the last sits alone.
        session_for("<p>100</p><p>100</p><p>100</p><p>100</p><p>200</p>")
    }

    async fn run(
        session: &mut PaginationSession,
        rasterizer: &FakeRasterizer,
    ) -> Result<Vec<RenderedImage>, CardError> {
        let geometry = CardGeometry::default();
        let config = PaginationConfig::default();
        let layout = ExportLayout {
            geometry: &geometry,
            measurer: &NumberMeasurer,
            config: &config,
        };
        export_pages(session, "Small habits: a guide?", layout, &ExportOptions::default(), rasterizer).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_exports_every_page_in_order_and_restores_index() {
        let mut session = three_pages();
        assert_eq!(session.page_count(), 3);
        session.show(1);

        let rasterizer = FakeRasterizer::default();
        let images = run(&mut session, &rasterizer).await.unwrap();

        assert_eq!(images.len(), 3);
        assert_eq!(session.current_index(), 1);
        let indices: Vec<usize> = images.iter().map(|i| i.page_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(images[0].width, 840);
        assert_eq!(images[1].file_name(), "Small_habits_a_guide_page2.png");

        let seen = rasterizer.seen.lock().unwrap();
        assert_eq!(seen[0].html, "<p>100</p><p>100</p>");
        assert_eq!(seen[2].html, "<p>200</p>");
        assert_eq!(seen[0].pixel_ratio, 2.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_failure_restores_index() {
        let mut session = three_pages();
        session.show(2);

        let rasterizer = FakeRasterizer {
            fail_on: Some(1),
            ..Default::default()
        };
        let err = run(&mut session, &rasterizer).await.unwrap_err();

        assert!(matches!(err, CardError::RenderFailure(_)));
        assert_eq!(session.current_index(), 2);
        assert_eq!(rasterizer.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_delay_precedes_each_capture() {
        let mut session = three_pages();
        let rasterizer = FakeRasterizer::default();
        let start = tokio::time::Instant::now();
        run(&mut session, &rasterizer).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_last_page_gets_centered() {
        let mut session = three_pages();
        let rasterizer = FakeRasterizer::default();
        run(&mut session, &rasterizer).await.unwrap();

        let seen = rasterizer.seen.lock().unwrap();
        // 215 of 332.5 is under 70%.
        assert!(matches!(seen[2].spacing, SpacingPlan::CenterSingle { .. }));
        // 230 of 332.5 is under 90%, two blocks share the rest.
        assert!(matches!(seen[0].spacing, SpacingPlan::DistributeGaps { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_card_keeps_default_spacing_and_extended_height() {
        // 5 x 76.475 = 1.15x the available height: one taller card.
        let mut session = session_for(&"<p>61.475</p>".repeat(5));
        let rasterizer = FakeRasterizer::default();
        let images = run(&mut session, &rasterizer).await.unwrap();

        assert_eq!(images.len(), 1);
        assert_eq!(images[0].file_name(), "Small_habits_a_guide.png");
        let seen = rasterizer.seen.lock().unwrap();
        assert_eq!(seen[0].spacing, SpacingPlan::NoAction);
        assert!((seen[0].height - 560.0 * 1.15).abs() < 0.1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metric_measurer_export_smoke() {
        let mut session = session_for("<p>Short and sweet.</p>");
        let geometry = CardGeometry::default();
        let config = PaginationConfig::default();
        let measurer = MetricMeasurer::default();
        let layout = ExportLayout {
            geometry: &geometry,
            measurer: &measurer,
            config: &config,
        };
        let rasterizer = FakeRasterizer::default();
        let images = export_pages(&mut session, "", layout, &ExportOptions::default(), &rasterizer)
            .await
            .unwrap();
        assert_eq!(images[0].file_name(), "card.png");
    }

    #[test]
    fn test_file_stem_sanitizes_title() {
        assert_eq!(file_stem("  My  card / draft  "), "My_card_draft");
        assert_eq!(file_stem("a__b"), "a_b");
        assert_eq!(file_stem("???"), FALLBACK_FILE_STEM);
        assert_eq!(file_stem("早起 习惯"), "早起_习惯");
    }
}
