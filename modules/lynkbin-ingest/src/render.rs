// Render and fetch capabilities.
//
// Extractors only see the `Renderer` and `Fetcher` traits. Browserless and
// reqwest back them in production; fixtures back them in tests.

use std::time::Duration;

use async_trait::async_trait;
use browserless_client::BrowserlessClient;
use bytes::Bytes;
use scraper::{Html, Selector};
use tracing::debug;

pub use browserless_client::RenderOptions;

use crate::error::ExtractionError;

/// A page after the browser has finished loading it.
#[derive(Debug, Clone, Default)]
pub struct RenderedPage {
    pub status: Option<u16>,
    pub final_url: String,
    pub html: String,
}

impl RenderedPage {
    pub fn new(final_url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            status: Some(200),
            final_url: final_url.into(),
            html: html.into(),
        }
    }

    /// Parse the page for DOM queries. The returned tree is not `Send`, so
    /// keep it out of anything held across an `.await`.
    pub fn dom(&self) -> Dom {
        Dom::parse(&self.html)
    }
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        url: &str,
        options: &RenderOptions,
    ) -> Result<RenderedPage, ExtractionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}")]
    Status { status: u16, url: String },

    #[error("Timed out fetching {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a URL and return the response body. Non-2xx responses are errors.
    async fn fetch(&self, url: &str, headers: &[(&str, &str)]) -> Result<Bytes, FetchError>;
}

// --- DOM queries ---

/// Parsed HTML with the handful of lookups extractors need.
pub struct Dom {
    html: Html,
}

impl Dom {
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    /// Whitespace-collapsed text of the first element matching `selector`
    /// that has any text at all.
    pub fn text(&self, selector: &str) -> Option<String> {
        let selector = parse_selector(selector)?;
        self.html.select(&selector).find_map(|el| {
            let text = collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "));
            (!text.is_empty()).then_some(text)
        })
    }

    /// First non-empty `attr` value on an element matching `selector`.
    pub fn attr(&self, selector: &str, attr: &str) -> Option<String> {
        let selector = parse_selector(selector)?;
        self.html.select(&selector).find_map(|el| {
            el.value()
                .attr(attr)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        })
    }

    /// `<meta>` content by `property` (Open Graph) or `name` (everything else).
    pub fn meta(&self, key: &str) -> Option<String> {
        self.attr(&format!(r#"meta[property="{key}"]"#), "content")
            .or_else(|| self.attr(&format!(r#"meta[name="{key}"]"#), "content"))
    }

    pub fn title(&self) -> Option<String> {
        self.text("title")
    }

    /// Every JSON-LD object on the page, with top-level arrays and `@graph`
    /// containers flattened. Blocks that fail to parse are skipped.
    pub fn json_ld(&self) -> Vec<serde_json::Value> {
        let Some(selector) = parse_selector(r#"script[type="application/ld+json"]"#) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        for script in self.html.select(&selector) {
            let raw = script.text().collect::<String>();
            let Ok(value) = serde_json::from_str::<serde_json::Value>(raw.trim()) else {
                debug!("Skipping unparseable JSON-LD block");
                continue;
            };
            flatten_ld(value, &mut out);
        }
        out
    }
}

fn flatten_ld(value: serde_json::Value, out: &mut Vec<serde_json::Value>) {
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                flatten_ld(item, out);
            }
        }
        serde_json::Value::Object(mut map) => {
            if let Some(graph) = map.remove("@graph") {
                flatten_ld(graph, out);
            }
            if !map.is_empty() {
                out.push(serde_json::Value::Object(map));
            }
        }
        _ => {}
    }
}

fn parse_selector(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(s) => Some(s),
        Err(e) => {
            debug!(selector, error = %e, "Invalid CSS selector");
            None
        }
    }
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

// --- Production implementations ---

pub struct BrowserlessRenderer {
    client: BrowserlessClient,
}

impl BrowserlessRenderer {
    pub fn new(client: BrowserlessClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Renderer for BrowserlessRenderer {
    async fn render(
        &self,
        url: &str,
        options: &RenderOptions,
    ) -> Result<RenderedPage, ExtractionError> {
        let content = self
            .client
            .render(url, options)
            .await
            .map_err(|e| ExtractionError::navigation(url, e))?;

        Ok(RenderedPage {
            status: content.status,
            final_url: content.final_url.unwrap_or_else(|| url.to_string()),
            html: content.html,
        })
    }
}

/// Plain HTTP fetcher for page payloads and media bytes.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, headers: &[(&str, &str)]) -> Result<Bytes, FetchError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout(url.to_string())
            } else {
                FetchError::Network(e.to_string())
            }
        };

        let resp = request.send().await.map_err(map_err)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        resp.bytes().await.map_err(map_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <title>  Hello | Jane Doe | LinkedIn </title>
        <meta property="og:title" content="OG title">
        <meta name="description" content="The description">
        <script type="application/ld+json">
            {"@context":"https://schema.org","@graph":[
                {"@type":"SocialMediaPosting","author":{"name":"Jane Doe"}},
                {"@type":"WebPage"}
            ]}
        </script>
        <script type="application/ld+json">not json</script>
    </head><body>
        <div class="empty"></div>
        <div class="empty">  first
            with text </div>
        <a class="link" href="">blank</a>
        <a class="link" href="/u/jane">jane</a>
    </body></html>"#;

    #[test]
    fn text_skips_empty_matches_and_collapses_whitespace() {
        let dom = Dom::parse(PAGE);
        assert_eq!(dom.text("div.empty").as_deref(), Some("first with text"));
        assert_eq!(dom.text("div.missing"), None);
    }

    #[test]
    fn attr_skips_blank_values() {
        let dom = Dom::parse(PAGE);
        assert_eq!(dom.attr("a.link", "href").as_deref(), Some("/u/jane"));
    }

    #[test]
    fn meta_checks_property_then_name() {
        let dom = Dom::parse(PAGE);
        assert_eq!(dom.meta("og:title").as_deref(), Some("OG title"));
        assert_eq!(dom.meta("description").as_deref(), Some("The description"));
        assert_eq!(dom.meta("twitter:creator"), None);
    }

    #[test]
    fn title_is_trimmed() {
        assert_eq!(Dom::parse(PAGE).title().as_deref(), Some("Hello | Jane Doe | LinkedIn"));
    }

    #[test]
    fn json_ld_flattens_graph_and_skips_garbage() {
        let items = Dom::parse(PAGE).json_ld();
        assert_eq!(items.len(), 3);
        assert!(items.iter().any(|v| v["author"]["name"] == "Jane Doe"));
    }

    #[test]
    fn invalid_selector_yields_none() {
        assert_eq!(Dom::parse(PAGE).text("div[[["), None);
    }
}
