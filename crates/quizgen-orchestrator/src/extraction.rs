//! Content extraction registry and the built-in extractors.
//!
//! Manual text and URLs are handled here. Files, activities and bulk scans
//! belong to the host and are registered as additional extractors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use quizgen_core::{
    ContentExtractor, ContentSource, Error, ExtractedSection, ExtractionContext, Result,
    SourceKind,
};

/// Registry mapping source kinds to their extractor implementations.
pub struct ExtractionRegistry {
    extractors: HashMap<SourceKind, Arc<dyn ContentExtractor>>,
}

impl ExtractionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
        }
    }

    /// Registry with the manual text and URL extractors.
    pub fn with_builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(ManualTextExtractor));
        registry.register(Arc::new(UrlExtractor::new()?));
        Ok(registry)
    }

    /// Register an extractor. Replaces any existing extractor for the same kind.
    pub fn register(&mut self, extractor: Arc<dyn ContentExtractor>) {
        self.extractors.insert(extractor.kind(), extractor);
    }

    pub fn has_extractor(&self, kind: SourceKind) -> bool {
        self.extractors.contains_key(&kind)
    }

    /// Extract one source with the extractor registered for its kind.
    pub async fn extract(
        &self,
        source: &ContentSource,
        ctx: &ExtractionContext,
    ) -> Result<Vec<ExtractedSection>> {
        let kind = source.kind();
        let extractor = self.extractors.get(&kind).ok_or_else(|| {
            Error::Validation(format!("no content extractor registered for {} sources", kind))
        })?;
        extractor.extract(source, ctx).await
    }

    /// Extract every source in order; the first failure aborts.
    pub async fn extract_all(
        &self,
        sources: &[ContentSource],
        ctx: &ExtractionContext,
    ) -> Result<Vec<ExtractedSection>> {
        let mut sections = Vec::new();
        for source in sources {
            let extracted = self.extract(source, ctx).await?;
            debug!(
                subsystem = "orchestrator",
                component = "extraction",
                kind = %source.kind(),
                result_count = extracted.len(),
                "Source extracted"
            );
            sections.extend(extracted);
        }
        Ok(sections)
    }
}

impl Default for ExtractionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Join sections under `=== TOPIC: name (kind) ===` markers, capped at `max_chars`.
pub fn combine_sections(sections: &[ExtractedSection], max_chars: usize) -> String {
    let combined = sections
        .iter()
        .filter(|s| !s.text.trim().is_empty())
        .map(|s| format!("=== TOPIC: {} ({}) ===\n{}", s.name, s.kind_label, s.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");
    match combined.char_indices().nth(max_chars) {
        Some((cut, _)) => combined[..cut].to_string(),
        None => combined,
    }
}

/// Text typed or pasted by the user.
pub struct ManualTextExtractor;

#[async_trait]
impl ContentExtractor for ManualTextExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::ManualText
    }

    async fn extract(
        &self,
        source: &ContentSource,
        _ctx: &ExtractionContext,
    ) -> Result<Vec<ExtractedSection>> {
        match source {
            ContentSource::ManualText { text } => Ok(vec![ExtractedSection {
                name: source.label(),
                kind_label: "Text".to_string(),
                text: text.trim().to_string(),
            }]),
            other => Err(Error::Internal(format!(
                "manual text extractor given a {} source",
                other.kind()
            ))),
        }
    }
}

static SCRIPT_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)>")
        .expect("valid regex")
});
static TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));
static BLOCK_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)</(p|div|li|h[1-6]|tr|section|article)>|<br\s*/?>").expect("valid regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n+").expect("valid regex"));
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\r\f]+").expect("valid regex"));

/// Reduce an HTML document to readable text.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_STYLE.replace_all(html, " ");
    let text = BLOCK_END.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'");
    let text = SPACES.replace_all(&text, " ");
    let text = BLANK_LINES.replace_all(&text, "\n\n");
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Fetches a web page and extracts its text.
pub struct UrlExtractor {
    client: reqwest::Client,
}

impl UrlExtractor {
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ContentExtractor for UrlExtractor {
    fn kind(&self) -> SourceKind {
        SourceKind::Url
    }

    async fn extract(
        &self,
        source: &ContentSource,
        _ctx: &ExtractionContext,
    ) -> Result<Vec<ExtractedSection>> {
        let ContentSource::Url { url } = source else {
            return Err(Error::Internal(format!(
                "URL extractor given a {} source",
                source.kind()
            )));
        };
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("could not fetch {}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "could not fetch {}: HTTP {}",
                url,
                status.as_u16()
            )));
        }
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(true, |ct| ct.contains("html"));
        let body = response.text().await?;

        let name = if is_html {
            TITLE
                .captures(&body)
                .and_then(|c| c.get(1))
                .map(|m| html_to_text(m.as_str()))
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| url.clone())
        } else {
            url.clone()
        };
        let text = if is_html { html_to_text(&body) } else { body.trim().to_string() };
        if text.is_empty() {
            return Err(Error::Upstream(format!("{} contained no readable text", url)));
        }
        Ok(vec![ExtractedSection {
            name,
            kind_label: "URL".to_string(),
            text,
        }])
    }
}
