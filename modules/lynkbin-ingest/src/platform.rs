// Platform classification and submission input checks.
// Works from the reference string alone; nothing here touches the network.

use lynkbin_common::{Platform, Reference};
use url::Url;

use crate::error::{IngestError, Result};

/// Host rules, tried in priority order. The first match wins.
const HOST_RULES: [(&str, Platform); 4] = [
    ("linkedin", Platform::Linkedin),
    ("x.com", Platform::X),
    ("reddit.com", Platform::Reddit),
    ("instagram.com", Platform::Instagram),
];

/// Maximum number of tags a submitter may pin.
pub const MAX_USER_TAGS: usize = 3;

/// Map a reference to its source platform.
///
/// Free text is always `notes`. URLs are scanned case-insensitively for the
/// [`HOST_RULES`] patterns in order; unrecognised references are `others`.
pub fn classify_platform(reference: &str, is_url: bool) -> Platform {
    if !is_url {
        return Platform::Notes;
    }

    let lower = reference.to_lowercase();
    HOST_RULES
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map(|(_, platform)| *platform)
        .unwrap_or(Platform::Others)
}

/// Normalise and check a raw submission, producing the accepted reference
/// and the submitter's pinned tags.
pub fn accept_submission(
    is_url: bool,
    url: &str,
    notes: &str,
    tags: &[String],
    max_note_chars: usize,
) -> Result<(Reference, Vec<String>)> {
    let reference = if is_url {
        Reference::Url(normalize_url(url)?)
    } else {
        Reference::Notes(check_notes(notes, max_note_chars)?)
    };

    Ok((reference, normalize_tags(tags)?))
}

/// Percent-decode, drop stray backslashes (left over from shell or JSON
/// escaping), and require an absolute http(s) URL.
pub fn normalize_url(raw: &str) -> Result<String> {
    let decoded = urlencoding::decode(raw.trim())
        .map_err(|_| IngestError::invalid("Invalid url"))?;
    let cleaned: String = decoded.chars().filter(|c| *c != '\\').collect();

    if cleaned.is_empty() {
        return Err(IngestError::invalid("Url is required"));
    }

    let parsed = Url::parse(&cleaned).map_err(|_| IngestError::invalid("Invalid url"))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(IngestError::invalid("Invalid url"));
    }

    Ok(cleaned)
}

fn check_notes(notes: &str, max_note_chars: usize) -> Result<String> {
    if notes.trim().is_empty() {
        return Err(IngestError::invalid("Notes are required"));
    }
    if notes.trim().chars().count() > max_note_chars {
        return Err(IngestError::invalid(format!(
            "maximum notes length is {max_note_chars} characters"
        )));
    }
    Ok(notes.to_string())
}

/// Trim, drop blanks, and de-duplicate (first spelling wins, compared
/// case-insensitively). More than [`MAX_USER_TAGS`] is rejected.
pub fn normalize_tags(tags: &[String]) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if !out.iter().any(|seen| seen.eq_ignore_ascii_case(tag)) {
            out.push(tag.to_string());
        }
    }

    if out.len() > MAX_USER_TAGS {
        return Err(IngestError::invalid(format!(
            "at most {MAX_USER_TAGS} tags are allowed"
        )));
    }
    Ok(out)
}

/// Instagram references must point at a single post or reel.
pub fn check_instagram_reference(url: &str) -> Result<()> {
    let parsed = Url::parse(url).map_err(|_| IngestError::invalid("Invalid Instagram URL"))?;
    let host = parsed.host_str().unwrap_or_default();
    if host != "instagram.com" && host != "www.instagram.com" {
        return Err(IngestError::invalid("Invalid Instagram URL"));
    }

    let path = parsed.path();
    if !path.contains("/p/") && !path.contains("/reel/") {
        return Err(IngestError::invalid(
            "Instagram URL must link to a post or reel",
        ));
    }
    Ok(())
}
