use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lynkbin_common::ExtractedPost;

use super::{
    before, path_segments, render_page, resolve_author, resolve_content, ExtractSettings,
    Extractor, DESKTOP_USER_AGENT,
};
use crate::error::Result;
use crate::render::{Dom, RenderOptions, Renderer};

const AUTHOR_SELECTORS: [&str; 3] = [
    "article[data-testid='tweet'] div[data-testid='User-Name'] a[role='link'] span",
    "article[data-testid='tweet'] a[role='link'][href*='/'] span",
    "div[data-testid='User-Name'] a span",
];

const TWEET_TEXT_SELECTOR: &str = "article[data-testid='tweet'] div[data-testid='tweetText']";

/// First path segments that are routes rather than handles.
const RESERVED_PATHS: [&str; 4] = ["i", "status", "home", "search"];

/// The timeline is client-rendered; give it a moment after load.
const SETTLE: Duration = Duration::from_secs(3);

pub struct XExtractor {
    renderer: Arc<dyn Renderer>,
    settings: ExtractSettings,
}

impl XExtractor {
    pub fn new(renderer: Arc<dyn Renderer>, settings: ExtractSettings) -> Self {
        Self { renderer, settings }
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            user_agent: Some(DESKTOP_USER_AGENT.to_string()),
            proxy: self.settings.proxy.clone(),
            timeout: Some(self.settings.timeout),
            wait_after_load: Some(SETTLE),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Extractor for XExtractor {
    async fn extract(&self, reference: &str) -> Result<ExtractedPost> {
        let page = render_page(
            self.renderer.as_ref(),
            reference,
            &self.render_options(),
            self.settings.timeout + SETTLE,
        )
        .await?;

        extract_from_page(&page.dom(), &page.final_url)
    }
}

pub(crate) fn extract_from_page(dom: &Dom, url: &str) -> Result<ExtractedPost> {
    let author = resolve_author(&[
        ("dom", &|| {
            AUTHOR_SELECTORS
                .iter()
                .find_map(|s| dom.text(s).map(|t| strip_handle(&t)))
        }),
        ("meta", &|| dom.meta("twitter:creator").map(|c| strip_handle(&c))),
        ("title", &|| {
            dom.title()
                .and_then(|t| before(&t, " on X"))
                .map(|a| a.trim_matches(|c: char| c == '"' || c == '\'').to_string())
        }),
        ("url", &|| author_from_url(url)),
    ]);

    let content = resolve_content(
        &[
            ("dom", &|| dom.text(TWEET_TEXT_SELECTOR)),
            ("og", &|| dom.meta("og:description")),
            ("title", &|| dom.title().and_then(|t| quoted_title_text(&t))),
        ],
        url,
    )?;

    Ok(ExtractedPost {
        author,
        content,
        media: Vec::new(),
    })
}

fn strip_handle(s: &str) -> String {
    s.trim().trim_start_matches('@').to_string()
}

fn author_from_url(url: &str) -> Option<String> {
    path_segments(url)
        .into_iter()
        .next()
        .filter(|first| !RESERVED_PATHS.contains(&first.as_str()))
}

/// `Jane on X: "the tweet" / X` → `the tweet`.
fn quoted_title_text(title: &str) -> Option<String> {
    let (_, rest) = title.split_once(": \"")?;
    let end = rest.rfind('"')?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lynkbin_common::UNKNOWN_AUTHOR;

    const URL: &str = "https://x.com/rustlang/status/1790000000000000000";

    #[test]
    fn tweet_dom_is_preferred() {
        let html = r#"<html><head>
            <title>Rust on X: "title text" / X</title>
            <meta name="twitter:creator" content="@meta_handle">
        </head><body>
            <article data-testid="tweet">
              <div data-testid="User-Name"><a role="link" href="/rustlang"><span>@Rust Language</span></a></div>
              <div data-testid="tweetText"><span>Rust 1.80 is out!</span></div>
            </article>
        </body></html>"#;
        let post = extract_from_page(&Dom::parse(html), URL).unwrap();
        assert_eq!(post.author, "Rust Language");
        assert_eq!(post.content, "Rust 1.80 is out!");
    }

    #[test]
    fn meta_creator_then_title() {
        let html = r#"<html><head>
            <title>Rust on X: "from the title" / X</title>
            <meta name="twitter:creator" content="@rustlang">
        </head><body></body></html>"#;
        let post = extract_from_page(&Dom::parse(html), URL).unwrap();
        assert_eq!(post.author, "rustlang");
        assert_eq!(post.content, "from the title");

        let html = r#"<html><head><title>"Rust" on X: "hi" / X</title></head></html>"#;
        assert_eq!(extract_from_page(&Dom::parse(html), URL).unwrap().author, "Rust");
    }

    #[test]
    fn url_handle_is_last_resort() {
        let html = r#"<html><head><meta property="og:description" content="body"></head></html>"#;
        let post = extract_from_page(&Dom::parse(html), URL).unwrap();
        assert_eq!(post.author, "rustlang");

        let post =
            extract_from_page(&Dom::parse(html), "https://x.com/i/status/1790000000000000000")
                .unwrap();
        assert_eq!(post.author, UNKNOWN_AUTHOR);
    }

    #[test]
    fn login_wall_without_tweet_fails() {
        let html = "<html><head><title>X</title></head><body>JavaScript is not available.</body></html>";
        assert!(extract_from_page(&Dom::parse(html), URL).is_err());
    }

    #[test]
    fn quoted_title_text_handles_inner_quotes() {
        assert_eq!(
            quoted_title_text(r#"Jane on X: "she said "hi" loudly" / X"#).as_deref(),
            Some(r#"she said "hi" loudly"#)
        );
        assert_eq!(quoted_title_text("X"), None);
    }
}
