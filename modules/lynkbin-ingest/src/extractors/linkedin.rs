use std::sync::Arc;

use async_trait::async_trait;
use lynkbin_common::ExtractedPost;
use serde_json::Value;

use super::{
    before, render_page, resolve_author, resolve_content, segment, ExtractSettings, Extractor,
};
use crate::error::{ExtractionError, Result};
use crate::render::{Dom, RenderOptions, Renderer};

const GOOGLEBOT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

/// Requests matching these are aborted inside the browser, so a redirect to
/// the sign-in wall never replaces the post.
const AUTH_WALL_PATTERNS: [&str; 2] = ["authwall", "li-auth-wall"];

const AUTHOR_SELECTORS: [&str; 3] = [
    ".update-components-actor__name span[aria-hidden='true']",
    "a[data-tracking-control-name='public_post_feed-actor-name']",
    ".base-main-card__title",
];

const CONTENT_SELECTORS: [&str; 3] = [
    "[data-test-id='main-feed-activity-card__commentary']",
    ".feed-shared-update-v2__description-wrapper",
    ".attributed-text-segment-list__content",
];

pub struct LinkedinExtractor {
    renderer: Arc<dyn Renderer>,
    settings: ExtractSettings,
}

impl LinkedinExtractor {
    pub fn new(renderer: Arc<dyn Renderer>, settings: ExtractSettings) -> Self {
        Self { renderer, settings }
    }

    fn render_options(&self) -> RenderOptions {
        let mut options = RenderOptions {
            user_agent: Some(GOOGLEBOT_USER_AGENT.to_string()),
            proxy: self.settings.proxy.clone(),
            reject_request_patterns: AUTH_WALL_PATTERNS.iter().map(|p| p.to_string()).collect(),
            timeout: Some(self.settings.timeout),
            ..Default::default()
        };
        options
            .headers
            .insert("Referer".into(), "https://www.google.com/".into());
        options
    }
}

#[async_trait]
impl Extractor for LinkedinExtractor {
    async fn extract(&self, reference: &str) -> Result<ExtractedPost> {
        let page = render_page(
            self.renderer.as_ref(),
            reference,
            &self.render_options(),
            self.settings.timeout,
        )
        .await?;

        if AUTH_WALL_PATTERNS.iter().any(|p| page.final_url.contains(p)) {
            return Err(ExtractionError::navigation(reference, "redirected to sign-in wall").into());
        }

        extract_from_page(&page.dom(), reference)
    }
}

pub(crate) fn extract_from_page(dom: &Dom, url: &str) -> Result<ExtractedPost> {
    let ld = dom.json_ld();

    let author = resolve_author(&[
        ("structured", &|| ld.iter().find_map(ld_author)),
        ("dom", &|| AUTHOR_SELECTORS.iter().find_map(|s| dom.text(s))),
        ("meta", &|| dom.meta("og:title").and_then(|t| segment(&t, " | ", 1))),
        ("title", &|| dom.title().and_then(|t| segment(&t, " | ", 1))),
        ("url", &|| author_from_url(url)),
    ]);

    let content = resolve_content(
        &[
            ("structured", &|| ld.iter().find_map(ld_body)),
            ("meta", &|| dom.meta("description")),
            ("og", &|| dom.meta("og:description")),
            ("dom", &|| CONTENT_SELECTORS.iter().find_map(|s| dom.text(s))),
        ],
        url,
    )?;

    Ok(ExtractedPost {
        author,
        content,
        media: Vec::new(),
    })
}

fn ld_author(item: &Value) -> Option<String> {
    let author = item.get("author")?;
    let first = match author {
        Value::Array(list) => list.first()?,
        other => other,
    };
    match first {
        Value::String(name) => Some(name.clone()),
        other => other.get("name")?.as_str().map(String::from),
    }
}

fn ld_body(item: &Value) -> Option<String> {
    ["articleBody", "text"]
        .iter()
        .find_map(|key| item.get(*key)?.as_str().map(String::from))
}

/// Public post URLs embed the author slug: `/posts/jane-doe-1a2b3c_title-activity-…`.
/// The last dash-separated piece of the slug is a profile id and is dropped.
fn author_from_url(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/posts/")?;
    let slug = before(rest, "_")?;
    let parts: Vec<&str> = slug.split('-').filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        [] => None,
        [only] => Some(only.to_string()),
        [name @ .., _id] => Some(name.join(" ")),
    }
}
