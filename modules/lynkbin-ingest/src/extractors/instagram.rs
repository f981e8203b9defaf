// Instagram posts are read from the JSON embedded in the server-rendered
// page, so a plain fetch is enough and no browser is involved.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use lynkbin_common::{ExtractedPost, MediaItem, MediaKind};
use regex::Regex;
use tracing::{debug, info};

use super::{before, path_segments, resolve_author, ExtractSettings, Extractor, DESKTOP_USER_AGENT};
use crate::error::{ExtractionError, Result};
use crate::media_type::detect_media_type;
use crate::platform::check_instagram_reference;
use crate::render::{Dom, Fetcher};

static RE_OWNER_USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""owner":\{[^{}]*?"username":"([^"]+)""#).unwrap());
static RE_USERNAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""username":"([^"]+)""#).unwrap());
static RE_VIDEO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""video_versions":\[\{[^{}]*?"url":"((?:[^"\\]|\\.)*)""#).unwrap()
});
static RE_IMAGE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""image_versions2":\{"candidates":\[\{[^{}]*?"url":"((?:[^"\\]|\\.)*)""#).unwrap()
});

const CAROUSEL_START: &str = r#""carousel_media":["#;
const CAROUSEL_END: &str = r#"],"location":"#;

/// Path segments that follow the host on post URLs and are not usernames.
const POST_ROUTES: [&str; 4] = ["p", "reel", "reels", "tv"];

pub(crate) const PAGE_HEADERS: [(&str, &str); 8] = [
    ("User-Agent", DESKTOP_USER_AGENT),
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Referer", "https://www.instagram.com/"),
];

pub struct InstagramExtractor {
    fetcher: Arc<dyn Fetcher>,
    settings: ExtractSettings,
}

impl InstagramExtractor {
    pub fn new(fetcher: Arc<dyn Fetcher>, settings: ExtractSettings) -> Self {
        Self { fetcher, settings }
    }
}

#[async_trait]
impl Extractor for InstagramExtractor {
    async fn extract(&self, reference: &str) -> Result<ExtractedPost> {
        check_instagram_reference(reference)?;

        let body = tokio::time::timeout(
            self.settings.timeout,
            self.fetcher.fetch(reference, &PAGE_HEADERS),
        )
        .await
        .map_err(|_| ExtractionError::navigation(reference, "page fetch timed out"))?
        .map_err(|e| ExtractionError::navigation(reference, e))?;

        let payload = String::from_utf8_lossy(&body);
        extract_from_payload(&payload, reference)
    }
}

pub(crate) fn extract_from_payload(payload: &str, url: &str) -> Result<ExtractedPost> {
    let kind = detect_media_type(payload)?;
    info!(url, %kind, "Detected Instagram media type");

    let dom = Dom::parse(payload);
    let ld = dom.json_ld();

    let author = resolve_author(&[
        ("structured", &|| {
            first_capture(&RE_OWNER_USERNAME, payload)
                .or_else(|| first_capture(&RE_USERNAME, payload))
                .or_else(|| {
                    ld.iter()
                        .find_map(|v| v.get("author")?.get("name")?.as_str().map(String::from))
                })
        }),
        ("meta", &|| {
            dom.meta("og:title")
                .and_then(|t| before(&t, " on Instagram"))
                .or_else(|| dom.meta("twitter:title").and_then(|t| before(&t, " (@")))
        }),
        ("title", &|| dom.title().and_then(|t| before(&t, " on Instagram"))),
        ("url", &|| {
            path_segments(url)
                .into_iter()
                .next()
                .filter(|first| !POST_ROUTES.contains(&first.as_str()))
        }),
    ]);

    let media = match kind {
        MediaKind::Video => video_url(payload, &ld)
            .map(|u| vec![MediaItem::remote(u, "Reel")])
            .unwrap_or_default(),
        MediaKind::Carousel => match carousel_image_urls(payload) {
            Some(urls) if !urls.is_empty() => {
                let total = urls.len();
                urls.into_iter()
                    .enumerate()
                    .map(|(i, u)| MediaItem::remote(u, format!("Image {} of {total}", i + 1)))
                    .collect()
            }
            _ => single_image(payload, &dom),
        },
        MediaKind::Image => single_image(payload, &dom),
    };

    if media.is_empty() {
        return Err(ExtractionError::ExtractionFailed(format!(
            "no {kind} URL found in Instagram payload"
        ))
        .into());
    }

    debug!(url, count = media.len(), "Instagram media references");
    Ok(ExtractedPost {
        author,
        content: String::new(),
        media,
    })
}

fn single_image(payload: &str, dom: &Dom) -> Vec<MediaItem> {
    first_capture(&RE_IMAGE_URL, payload)
        .or_else(|| dom.meta("og:image"))
        .map(|u| vec![MediaItem::remote(u, "Image")])
        .unwrap_or_default()
}

fn video_url(payload: &str, ld: &[serde_json::Value]) -> Option<String> {
    first_capture(&RE_VIDEO_URL, payload).or_else(|| {
        ld.iter()
            .find_map(|v| v.get("contentUrl")?.as_str().map(String::from))
    })
}

/// Every image inside the carousel boundary, de-duplicated in first-seen
/// order. `None` when the payload has no carousel section.
pub(crate) fn carousel_image_urls(payload: &str) -> Option<Vec<String>> {
    let start = payload.find(CAROUSEL_START)? + CAROUSEL_START.len();
    let section = &payload[start..];
    let section = match section.find(CAROUSEL_END) {
        Some(end) => &section[..end],
        None => section,
    };

    let mut urls: Vec<String> = Vec::new();
    for caps in RE_IMAGE_URL.captures_iter(section) {
        let url = decode_json_string(&caps[1]);
        if !urls.contains(&url) {
            urls.push(url);
        }
    }
    Some(urls)
}

fn first_capture(re: &Regex, payload: &str) -> Option<String> {
    re.captures(payload).map(|c| decode_json_string(&c[1]))
}

/// Undo JSON string escaping (`\/`, `\u0026`). Falls back to the raw text if
/// it is not a valid JSON string body.
fn decode_json_string(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\"")).unwrap_or_else(|_| raw.to_string())
}
