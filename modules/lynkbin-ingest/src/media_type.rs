// Gallery post shape detection from the raw page payload.

use std::sync::LazyLock;

use lynkbin_common::MediaKind;
use regex::Regex;
use tracing::debug;

use crate::error::ExtractionError;

static RE_PRODUCT_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""product_type"\s*:\s*"([^"]+)""#).unwrap());

const VIDEO_VARIANTS_MARKER: &str = r#""video_versions":[{"#;
const IMAGE_VARIANTS_MARKER: &str = r#""image_versions2""#;

/// Decide whether a gallery post is a single image, a video or a carousel.
///
/// The embedded `product_type` wins when it holds a known value. Otherwise
/// the presence of video variants, then image variants, decides. A payload
/// with none of these markers is not a post we can read.
pub fn detect_media_type(payload: &str) -> Result<MediaKind, ExtractionError> {
    if let Some(product_type) = RE_PRODUCT_TYPE.captures(payload).map(|c| c[1].to_string()) {
        let kind = match product_type.as_str() {
            "clips" => Some(MediaKind::Video),
            "carousel_container" => Some(MediaKind::Carousel),
            "feed" => Some(MediaKind::Image),
            _ => None,
        };
        if let Some(kind) = kind {
            debug!(%product_type, %kind, "Media type from product_type");
            return Ok(kind);
        }
        debug!(%product_type, "Unrecognised product_type, checking variant markers");
    }

    if payload.contains(VIDEO_VARIANTS_MARKER) {
        return Ok(MediaKind::Video);
    }
    if payload.contains(IMAGE_VARIANTS_MARKER) {
        return Ok(MediaKind::Image);
    }

    Err(ExtractionError::DetectionFailed)
}
