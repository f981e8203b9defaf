use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lynkbin_common::{ExtractedPost, UNKNOWN_AUTHOR};

use super::{
    path_segments, render_page, resolve, resolve_content, ExtractSettings, Extractor,
    DESKTOP_USER_AGENT,
};
use crate::error::Result;
use crate::render::{Dom, RenderOptions, Renderer};

const POST_ELEMENT: &str = "shreddit-post";

const TITLE_SELECTORS: [&str; 4] = [
    "shreddit-post h1",
    "[slot='title']",
    "[data-testid='post-title']",
    "h1",
];

const BODY_SELECTORS: [&str; 5] = [
    "div[slot='text-body']",
    "div[data-testid='post-content']",
    "shreddit-post div.md",
    "div[data-click-id='text']",
    "div.md",
];

const AUTHOR_SELECTORS: [&str; 4] = [
    "shreddit-post [slot='authorName']",
    "[slot='authorName']",
    "[data-testid='author-name']",
    "a[data-click-id='user']",
];

const SETTLE: Duration = Duration::from_secs(2);

pub struct RedditExtractor {
    renderer: Arc<dyn Renderer>,
    settings: ExtractSettings,
}

impl RedditExtractor {
    pub fn new(renderer: Arc<dyn Renderer>, settings: ExtractSettings) -> Self {
        Self { renderer, settings }
    }
}

#[async_trait]
impl Extractor for RedditExtractor {
    async fn extract(&self, reference: &str) -> Result<ExtractedPost> {
        let options = RenderOptions {
            user_agent: Some(DESKTOP_USER_AGENT.to_string()),
            proxy: self.settings.proxy.clone(),
            timeout: Some(self.settings.timeout),
            wait_after_load: Some(SETTLE),
            ..Default::default()
        };
        let page = render_page(
            self.renderer.as_ref(),
            reference,
            &options,
            self.settings.timeout + SETTLE,
        )
        .await?;

        extract_from_page(&page.dom(), &page.final_url)
    }
}

pub(crate) fn extract_from_page(dom: &Dom, url: &str) -> Result<ExtractedPost> {
    let author = resolve(
        "author",
        &[
            ("structured", &|| dom.attr(POST_ELEMENT, "author")),
            ("dom", &|| AUTHOR_SELECTORS.iter().find_map(|s| dom.text(s))),
            ("title", &|| {
                dom.title()
                    .and_then(|t| t.split_once("by u/").map(|(_, rest)| rest.to_string()))
                    .and_then(|rest| rest.split_whitespace().next().map(String::from))
            }),
            ("url", &|| author_from_url(url)),
        ],
    )
    .map(|name| canonical_author(&name))
    .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    let content = resolve_content(
        &[
            ("dom", &|| {
                let title = dom
                    .attr(POST_ELEMENT, "post-title")
                    .or_else(|| TITLE_SELECTORS.iter().find_map(|s| dom.text(s)));
                let body = BODY_SELECTORS.iter().find_map(|s| dom.text(s));
                join_paragraphs(title, body)
            }),
            ("meta", &|| {
                dom.meta("og:title")
                    .and_then(|title| join_paragraphs(Some(title), dom.meta("og:description")))
            }),
        ],
        url,
    )?;

    Ok(ExtractedPost {
        author,
        content,
        media: Vec::new(),
    })
}

/// Reddit usernames are stored as `u/<name>` regardless of how the page
/// spelled them.
pub(crate) fn canonical_author(raw: &str) -> String {
    let name = raw
        .trim()
        .trim_start_matches('/')
        .trim_start_matches("u/")
        .trim_start_matches("user/");
    format!("u/{name}")
}

fn author_from_url(url: &str) -> Option<String> {
    let segments = path_segments(url);
    match segments.as_slice() {
        [kind, name, ..] if kind == "user" || kind == "u" => Some(name.clone()),
        _ => None,
    }
}

fn join_paragraphs(title: Option<String>, body: Option<String>) -> Option<String> {
    match (title, body) {
        (Some(t), Some(b)) => Some(format!("{}\n\n{}", t.trim(), b.trim())),
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.reddit.com/r/rust/comments/abc123/borrow_checker_tips/";

    #[test]
    fn shreddit_attributes_are_preferred() {
        let html = r#"<html><head><title>Borrow checker tips : r/rust</title></head><body>
            <shreddit-post author="example" post-title="Borrow checker tips">
              <div slot="text-body"><p>Clone less,</p><p>borrow more.</p></div>
            </shreddit-post>
        </body></html>"#;
        let post = extract_from_page(&Dom::parse(html), URL).unwrap();
        assert_eq!(post.author, "u/example");
        assert_eq!(post.content, "Borrow checker tips\n\nClone less, borrow more.");
    }

    #[test]
    fn old_reddit_markup() {
        let html = r#"<html><body>
            <a data-click-id="user" href="/user/oldtimer">u/oldtimer</a>
            <h1>Old title</h1>
            <div class="md">Old body</div>
        </body></html>"#;
        let post = extract_from_page(&Dom::parse(html), URL).unwrap();
        assert_eq!(post.author, "u/oldtimer");
        assert_eq!(post.content, "Old title\n\nOld body");
    }

    #[test]
    fn og_fallback_and_title_author() {
        let html = r#"<html><head>
            <title>Need help with lifetimes by u/newbie42 in rust</title>
            <meta property="og:title" content="Need help with lifetimes">
            <meta property="og:description" content="Why does this not compile?">
        </head><body></body></html>"#;
        let post = extract_from_page(&Dom::parse(html), URL).unwrap();
        assert_eq!(post.author, "u/newbie42");
        // The <title> element is not a post title selector; og tags win.
        assert_eq!(post.content, "Need help with lifetimes\n\nWhy does this not compile?");
    }

    #[test]
    fn title_only_post_is_accepted() {
        let html = r#"<html><body><h1>Link post title</h1></body></html>"#;
        let post = extract_from_page(&Dom::parse(html), URL).unwrap();
        assert_eq!(post.content, "Link post title");
        assert_eq!(post.author, UNKNOWN_AUTHOR);
    }

    #[test]
    fn empty_page_fails() {
        assert!(extract_from_page(&Dom::parse("<html></html>"), URL).is_err());
    }

    #[test]
    fn authors_are_canonicalised() {
        assert_eq!(canonical_author("example"), "u/example");
        assert_eq!(canonical_author("u/example"), "u/example");
        assert_eq!(canonical_author("/u/example"), "u/example");
        assert_eq!(
            author_from_url("https://www.reddit.com/user/spez/comments/x/").as_deref(),
            Some("spez")
        );
        assert_eq!(author_from_url(URL), None);
    }
}
