// Per-platform extraction.
//
// Each extractor resolves `author` and `content` (or media) through an
// ordered chain of tiers: embedded structured data, DOM selectors, meta tags,
// the page title, then the reference URL. The first non-empty tier wins and
// lower tiers are never evaluated.

mod instagram;
mod linkedin;
mod reddit;
mod x;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lynkbin_common::{ExtractedPost, Platform, UNKNOWN_AUTHOR};
use tracing::{debug, info};

use crate::error::{ExtractionError, Result};
use crate::render::{Fetcher, RenderOptions, RenderedPage, Renderer};

pub use instagram::InstagramExtractor;
pub use linkedin::LinkedinExtractor;
pub use reddit::RedditExtractor;
pub use x::XExtractor;

pub(crate) const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[async_trait]
pub trait Extractor: Send + Sync {
    /// Turn a reference into author, content and media references.
    async fn extract(&self, reference: &str) -> Result<ExtractedPost>;
}

/// Knobs shared by every extractor.
#[derive(Debug, Clone)]
pub struct ExtractSettings {
    /// Upper bound on a single render or page fetch.
    pub timeout: Duration,
    /// Upstream proxy handed to the browser.
    pub proxy: Option<String>,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            proxy: None,
        }
    }
}

/// One extractor per platform, selected by tag.
pub struct Extractors {
    linkedin: LinkedinExtractor,
    x: XExtractor,
    reddit: RedditExtractor,
    instagram: InstagramExtractor,
    notes: NotesExtractor,
    others: OthersExtractor,
}

impl Extractors {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        fetcher: Arc<dyn Fetcher>,
        settings: ExtractSettings,
    ) -> Self {
        Self {
            linkedin: LinkedinExtractor::new(renderer.clone(), settings.clone()),
            x: XExtractor::new(renderer.clone(), settings.clone()),
            reddit: RedditExtractor::new(renderer, settings.clone()),
            instagram: InstagramExtractor::new(fetcher, settings),
            notes: NotesExtractor,
            others: OthersExtractor,
        }
    }

    pub fn for_platform(&self, platform: Platform) -> &dyn Extractor {
        match platform {
            Platform::Linkedin => &self.linkedin,
            Platform::X => &self.x,
            Platform::Reddit => &self.reddit,
            Platform::Instagram => &self.instagram,
            Platform::Notes => &self.notes,
            Platform::Others => &self.others,
        }
    }

    pub async fn extract(&self, platform: Platform, reference: &str) -> Result<ExtractedPost> {
        info!(%platform, reference, "Extracting post");
        let post = self.for_platform(platform).extract(reference).await?;
        info!(
            %platform,
            author = %post.author,
            content_chars = post.content.chars().count(),
            media = post.media.len(),
            "Extraction complete"
        );
        Ok(post)
    }
}

/// Free-text notes are their own content and have no author.
pub struct NotesExtractor;

#[async_trait]
impl Extractor for NotesExtractor {
    async fn extract(&self, reference: &str) -> Result<ExtractedPost> {
        Ok(ExtractedPost {
            author: String::new(),
            content: reference.to_string(),
            media: Vec::new(),
        })
    }
}

/// Unrecognised sites are archived as-is without reading the page.
pub struct OthersExtractor;

#[async_trait]
impl Extractor for OthersExtractor {
    async fn extract(&self, _reference: &str) -> Result<ExtractedPost> {
        Ok(ExtractedPost::default())
    }
}

// --- Tier resolution ---

pub(crate) type Tier<'a> = (&'static str, &'a dyn Fn() -> Option<String>);

/// Walk `tiers` in order and return the first trimmed, non-empty value.
pub(crate) fn resolve(field: &'static str, tiers: &[Tier<'_>]) -> Option<String> {
    for (tier, attempt) in tiers {
        if let Some(value) = attempt()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        {
            debug!(field, tier, "Resolved");
            return Some(value);
        }
        debug!(field, tier, "Tier empty");
    }
    None
}

/// Author resolution never fails the extraction.
pub(crate) fn resolve_author(tiers: &[Tier<'_>]) -> String {
    resolve("author", tiers).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string())
}

/// Content is mandatory on text platforms.
pub(crate) fn resolve_content(tiers: &[Tier<'_>], url: &str) -> Result<String> {
    resolve("content", tiers).ok_or_else(|| {
        ExtractionError::ExtractionFailed(format!("no post content found at {url}")).into()
    })
}

/// `index`-th piece of `s` split on `separator`, if present and non-blank.
pub(crate) fn segment(s: &str, separator: &str, index: usize) -> Option<String> {
    s.split(separator)
        .nth(index)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Text before `marker`, when the marker is present.
pub(crate) fn before(s: &str, marker: &str) -> Option<String> {
    s.find(marker).map(|idx| s[..idx].trim().to_string())
}

/// Non-empty path segments of a URL.
pub(crate) fn path_segments(url: &str) -> Vec<String> {
    url::Url::parse(url)
        .ok()
        .map(|u| {
            u.path_segments()
                .map(|segs| segs.filter(|s| !s.is_empty()).map(String::from).collect())
                .unwrap_or_default()
        })
        .unwrap_or_default()
}

/// Render with a hard deadline, treating error statuses as navigation failures.
pub(crate) async fn render_page(
    renderer: &dyn Renderer,
    url: &str,
    options: &RenderOptions,
    deadline: Duration,
) -> Result<RenderedPage> {
    let page = tokio::time::timeout(deadline, renderer.render(url, options))
        .await
        .map_err(|_| ExtractionError::navigation(url, format!("render timed out after {deadline:?}")))??;

    if let Some(status) = page.status.filter(|s| *s >= 400) {
        return Err(ExtractionError::navigation(url, format!("page returned HTTP {status}")).into());
    }
    Ok(page)
}
