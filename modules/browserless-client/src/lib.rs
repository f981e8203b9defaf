pub mod error;

pub use error::{BrowserlessError, Result};

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

/// Per-render options forwarded to the headless browser.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Extra request headers sent with the navigation.
    pub headers: BTreeMap<String, String>,
    pub user_agent: Option<String>,
    /// Upstream proxy for the browser, e.g. `socks5://10.0.0.1:1088`.
    pub proxy: Option<String>,
    /// Requests whose URL matches any of these patterns are aborted by the
    /// browser before they are sent.
    pub reject_request_patterns: Vec<String>,
    /// Navigation timeout.
    pub timeout: Option<Duration>,
    /// Extra settle time after load, for client-rendered pages.
    pub wait_after_load: Option<Duration>,
}

/// Rendered page as returned by Browserless.
#[derive(Debug, Clone)]
pub struct RenderedContent {
    /// Status of the main navigation, when Browserless reports it.
    pub status: Option<u16>,
    /// URL after redirects, when Browserless reports it.
    pub final_url: Option<String>,
    pub html: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    url: &'a str,
    #[serde(
        rename = "setExtraHTTPHeaders",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    set_extra_http_headers: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_agent: Option<&'a str>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    reject_request_pattern: &'a [String],
    goto_options: GotoOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_for_timeout: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GotoOptions {
    wait_until: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout: Option<u64>,
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    /// Fetch fully-rendered HTML for a URL via the Browserless /content endpoint,
    /// applying per-request headers, proxy, request blocking and timeout.
    pub async fn render(&self, url: &str, options: &RenderOptions) -> Result<RenderedContent> {
        let endpoint = self.endpoint(options);
        let body = content_request(url, options);

        debug!(url, blocked = ?options.reject_request_patterns, "Browserless render request");

        let mut request = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(timeout) = options.timeout {
            // Leave headroom for Browserless to report its own navigation timeout.
            request = request.timeout(timeout + Duration::from_secs(5));
        }

        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let page_status = resp
            .headers()
            .get("X-Response-Code")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let final_url = resp
            .headers()
            .get("X-Response-URL")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Ok(RenderedContent {
            status: page_status,
            final_url,
            html: resp.text().await?,
        })
    }

    fn endpoint(&self, options: &RenderOptions) -> String {
        let mut params: Vec<String> = Vec::new();
        if let Some(ref token) = self.token {
            params.push(format!("token={token}"));
        }
        if let Some(timeout) = options.timeout {
            params.push(format!("timeout={}", timeout.as_millis()));
        }
        if let Some(ref proxy) = options.proxy {
            params.push(format!("--proxy-server={proxy}"));
        }

        let mut endpoint = format!("{}/content", self.base_url);
        if !params.is_empty() {
            endpoint.push('?');
            endpoint.push_str(&params.join("&"));
        }
        endpoint
    }
}

fn content_request<'a>(url: &'a str, options: &'a RenderOptions) -> ContentRequest<'a> {
    ContentRequest {
        url,
        set_extra_http_headers: &options.headers,
        user_agent: options.user_agent.as_deref(),
        reject_request_pattern: &options.reject_request_patterns,
        goto_options: GotoOptions {
            wait_until: "load",
            timeout: options.timeout.map(|t| t.as_millis() as u64),
        },
        wait_for_timeout: options.wait_after_load.map(|t| t.as_millis() as u64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_request_omits_empty_options() {
        let options = RenderOptions::default();
        let json = serde_json::to_value(content_request("https://example.com", &options)).unwrap();

        assert_eq!(json["url"], "https://example.com");
        assert_eq!(json["gotoOptions"]["waitUntil"], "load");
        assert!(json.get("setExtraHTTPHeaders").is_none());
        assert!(json.get("rejectRequestPattern").is_none());
        assert!(json.get("userAgent").is_none());
    }

    #[test]
    fn request_carries_headers_and_blocked_patterns() {
        let mut options = RenderOptions {
            user_agent: Some("bot".into()),
            reject_request_patterns: vec!["authwall".into()],
            timeout: Some(Duration::from_secs(15)),
            ..Default::default()
        };
        options
            .headers
            .insert("Referer".into(), "https://www.google.com/".into());

        let json = serde_json::to_value(content_request("https://example.com", &options)).unwrap();

        assert_eq!(json["setExtraHTTPHeaders"]["Referer"], "https://www.google.com/");
        assert_eq!(json["rejectRequestPattern"][0], "authwall");
        assert_eq!(json["userAgent"], "bot");
        assert_eq!(json["gotoOptions"]["timeout"], 15_000);
    }

    #[test]
    fn endpoint_includes_token_timeout_and_proxy() {
        let client = BrowserlessClient::new("http://localhost:3000/", Some("abc")).unwrap();
        let options = RenderOptions {
            proxy: Some("socks5://10.0.0.1:1088".into()),
            timeout: Some(Duration::from_secs(10)),
            ..Default::default()
        };

        assert_eq!(
            client.endpoint(&options),
            "http://localhost:3000/content?token=abc&timeout=10000&--proxy-server=socks5://10.0.0.1:1088"
        );
        assert_eq!(
            client.endpoint(&RenderOptions::default()),
            "http://localhost:3000/content?token=abc"
        );
    }
}
