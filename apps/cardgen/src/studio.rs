use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::content::{extract_plain_text, normalize};
use crate::errors::CardError;
use crate::export::{export_pages, ExportLayout, ExportOptions, Rasterizer, RenderedImage};
use crate::generation::{generate, GenerationRequest, GenerationResult, ProgressSink, RetryPolicy};
use crate::layout::{paginate, CardGeometry, MetricMeasurer, PaginationConfig, PaginationSession, TextMeasurer};
use crate::llm_client::{CompletionProvider, LlmClient};

/// Owns one card being edited: its text, its pages and the collaborators that
/// produce them. The only mutable layout state lives in `session`.
pub struct CardStudio {
    provider: Arc<dyn CompletionProvider>,
    measurer: Arc<dyn TextMeasurer>,
    geometry: CardGeometry,
    pagination_config: PaginationConfig,
    retry_policy: RetryPolicy,
    export_options: ExportOptions,
    title: String,
    content: String,
    session: PaginationSession,
}

impl CardStudio {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        let measurer: Arc<dyn TextMeasurer> = Arc::new(MetricMeasurer::default());
        let geometry = CardGeometry::default();
        let pagination_config = PaginationConfig::default();
        let session = PaginationSession::from_pagination(paginate(
            "",
            &geometry,
            measurer.as_ref(),
            &pagination_config,
        ));
        Self {
            provider,
            measurer,
            geometry,
            pagination_config,
            retry_policy: RetryPolicy::default(),
            export_options: ExportOptions::default(),
            title: String::new(),
            content: String::new(),
            session,
        }
    }

    /// Studio backed by the HTTP client and knobs from `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = LlmClient::from_config(config)?;
        info!(model = client.model(), "card studio ready");
        Ok(Self::new(Arc::new(client))
            .with_retry_policy(config.retry_policy())
            .with_pagination_config(config.pagination_config()))
    }

    pub fn with_measurer(mut self, measurer: Arc<dyn TextMeasurer>) -> Self {
        self.measurer = measurer;
        self.repaginate();
        self
    }

    pub fn with_geometry(mut self, geometry: CardGeometry) -> Self {
        self.geometry = geometry;
        self.repaginate();
        self
    }

    pub fn with_pagination_config(mut self, config: PaginationConfig) -> Self {
        self.pagination_config = config;
        self.repaginate();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_export_options(mut self, options: ExportOptions) -> Self {
        self.export_options = options;
        self
    }

    // ── generation ─────────────────────────────────────────────────────────

    /// Generates a card and previews it. On failure the current card is kept.
    pub async fn generate_card(
        &mut self,
        topic: &str,
        keyword: &str,
        sink: &dyn ProgressSink,
    ) -> Result<GenerationResult, CardError> {
        let request = GenerationRequest::new(topic, keyword);
        let result = generate(self.provider.as_ref(), &request, &self.retry_policy, sink).await?;
        self.update_preview(&result.title, &result.content);
        Ok(result)
    }

    // ── preview ────────────────────────────────────────────────────────────

    /// Replaces the card text, then re-normalizes and re-paginates it.
    /// The preview starts again at the first page.
    pub fn update_preview(&mut self, title: &str, content: &str) -> &PaginationSession {
        self.title = title.trim().to_string();
        self.content = normalize(content);
        self.repaginate();
        &self.session
    }

    fn repaginate(&mut self) {
        let pagination = paginate(
            &self.content,
            &self.geometry,
            self.measurer.as_ref(),
            &self.pagination_config,
        );
        self.session = PaginationSession::from_pagination(pagination);
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Normalized content HTML.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn session(&self) -> &PaginationSession {
        &self.session
    }

    pub fn show_page(&mut self, index: usize) -> bool {
        self.session.show(index)
    }

    pub fn next_page(&mut self) -> bool {
        self.session.next()
    }

    pub fn previous_page(&mut self) -> bool {
        self.session.previous()
    }

    pub fn plain_text(&self) -> String {
        extract_plain_text(&self.title, &self.content)
    }

    // ── export ─────────────────────────────────────────────────────────────

    pub async fn export(&mut self, rasterizer: &dyn Rasterizer) -> Result<Vec<RenderedImage>, CardError> {
        let layout = ExportLayout {
            geometry: &self.geometry,
            measurer: self.measurer.as_ref(),
            config: &self.pagination_config,
        };
        export_pages(
            &mut self.session,
            &self.title,
            layout,
            &self.export_options,
            rasterizer,
        )
        .await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;

    use super::*;
    use crate::export::RenderRequest;
    use crate::generation::NoopSink;
    use crate::layout::PLACEHOLDER_HTML;
    use crate::llm_client::CompletionRequest;

    struct FixedProvider(Result<String, CardError>);

    #[async_trait]
    impl CompletionProvider for FixedProvider {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, CardError> {
            self.0.clone()
        }
    }

    #[derive(Default)]
    struct CountingRasterizer {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Rasterizer for CountingRasterizer {
        async fn rasterize(&self, request: &RenderRequest) -> Result<RenderedImage, CardError> {
            *self.calls.lock().unwrap() += 1;
            Ok(RenderedImage {
                page_index: request.page_index,
                page_count: request.page_count,
                width: 840,
                height: 1120,
                png: Bytes::new(),
                file_stem: String::new(),
            })
        }
    }

    fn long_content() -> String {
        (0..12)
            .map(|i| format!("<p>Paragraph {i}: {}</p>", "Small steps compound into large results. ".repeat(4)))
            .collect()
    }

    fn studio_with(reply: Result<String, CardError>) -> CardStudio {
        CardStudio::new(Arc::new(FixedProvider(reply))).with_retry_policy(RetryPolicy {
            max_retries: 1,
            ..RetryPolicy::default()
        })
    }

    #[test]
    fn test_new_studio_shows_placeholder() {
        let studio = studio_with(Err(CardError::NetworkOrTimeout("offline".into())));
        assert_eq!(studio.session().page_count(), 1);
        assert_eq!(studio.session().current_page().html(), PLACEHOLDER_HTML);
    }

    #[test]
    fn test_update_preview_normalizes_and_paginates() {
        let mut studio = studio_with(Err(CardError::NetworkOrTimeout("offline".into())));
        studio.update_preview(" Habits ", "<p>One <b>bold</b> idea</p><ul><li>first</li></ul>");
        assert_eq!(studio.title(), "Habits");
        assert_eq!(
            studio.content(),
            "<p>One <strong>bold</strong> idea</p><div class=\"custom-list-item\">first</div>"
        );
        assert_eq!(studio.plain_text(), "Habits\n\nOne bold idea\n\n• first");
    }

    #[test]
    fn test_navigation_and_repagination_reset() {
        let mut studio = studio_with(Err(CardError::NetworkOrTimeout("offline".into())));
        studio.update_preview("Long", &long_content());
        assert!(studio.session().has_multiple_pages());
        assert!(studio.next_page());
        assert!(!studio.show_page(99));
        assert_eq!(studio.session().current_index(), 1);

        studio.update_preview("Long", &long_content());
        assert_eq!(studio.session().current_index(), 0);
        assert!(!studio.previous_page());
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_card_updates_preview() {
        let reply = serde_json::json!({ "title": "Habits", "content": long_content() }).to_string();
        let mut studio = studio_with(Ok(reply));
        let result = studio.generate_card("Morning", "habits", &NoopSink).await.unwrap();

        assert_eq!(result.title, "Habits");
        assert_eq!(studio.title(), "Habits");
        assert_eq!(studio.content(), result.content);
        assert!(studio.session().has_multiple_pages());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_generation_keeps_current_card() {
        let mut studio = studio_with(Ok(r#"{"title":"X","content":"<p>wor"#.into()));
        studio.update_preview("Mine", "<p>My own words.</p>");

        let err = studio.generate_card("Morning", "habits", &NoopSink).await.unwrap_err();
        assert!(matches!(err, CardError::RetryExhausted { attempts: 2, .. }));
        assert_eq!(studio.title(), "Mine");
        assert_eq!(studio.content(), "<p>My own words.</p>");
        assert!(err.user_message().contains("2 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_renders_all_pages_and_keeps_position() {
        let mut studio = studio_with(Err(CardError::NetworkOrTimeout("offline".into())));
        studio.update_preview("Long", &long_content());
        studio.show_page(1);
        let pages = studio.session().page_count();

        let rasterizer = CountingRasterizer::default();
        let images = studio.export(&rasterizer).await.unwrap();

        assert_eq!(images.len(), pages);
        assert_eq!(*rasterizer.calls.lock().unwrap(), pages);
        assert_eq!(studio.session().current_index(), 1);
        assert_eq!(images[0].file_name(), "Long_page1.png");
    }
}
