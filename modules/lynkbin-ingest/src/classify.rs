// Classification request building and reply parsing.
//
// The oracle sees either the post text or the post media, together with the
// global tag/category pools. Its reply must be a single JSON object with
// exactly three tags, every user-pinned tag among them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ai_client::strip_code_blocks;
use lynkbin_common::{ClassificationResult, MediaItem, VocabularySnapshot};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{MediaError, OracleError};
use crate::oracle::{Oracle, OracleRequest};

/// Number of tags every classified post carries.
pub const TAGS_PER_POST: usize = 3;

/// Materialized media, read back into memory for the oracle call.
#[derive(Debug, Clone)]
pub struct MediaPayload {
    pub context_label: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl MediaPayload {
    pub async fn load(item: &MediaItem) -> Result<Self, MediaError> {
        let path = item.local_path.as_deref().ok_or_else(|| {
            MediaError::Scratch(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} was never materialized", item.source_url),
            ))
        })?;

        Ok(Self {
            context_label: item.context_label.clone(),
            mime_type: mime_type_for(path).to_string(),
            bytes: tokio::fs::read(path).await?,
        })
    }

    fn family(&self) -> &'static str {
        match self.mime_type.split('/').next() {
            Some("image") => "image",
            Some("video") => "video",
            _ => "media",
        }
    }
}

pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

/// What the oracle is asked to classify.
#[derive(Debug, Clone, Copy)]
pub enum ClassificationInput<'a> {
    Text(&'a str),
    Media(&'a [MediaPayload]),
}

pub struct Classifier {
    oracle: Arc<dyn Oracle>,
    timeout: Duration,
}

impl Classifier {
    pub fn new(oracle: Arc<dyn Oracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    /// Build the request, call the oracle once, and validate the reply.
    /// There is no retry; a bad reply aborts the submission.
    pub async fn classify(
        &self,
        input: ClassificationInput<'_>,
        user_tags: &[String],
        snapshot: &VocabularySnapshot,
    ) -> Result<ClassificationResult, OracleError> {
        let request = match input {
            ClassificationInput::Text(content) => OracleRequest {
                prompt: build_text_prompt(content, user_tags, snapshot),
                media: Vec::new(),
            },
            ClassificationInput::Media(media) => OracleRequest {
                prompt: build_media_prompt(media, user_tags, snapshot),
                media: media.to_vec(),
            },
        };

        let raw = tokio::time::timeout(self.timeout, self.oracle.generate(&request))
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))?
            .map_err(|e| OracleError::UpstreamFailure(format!("{e:#}")))?;

        let result = parse_classification(&raw, user_tags).inspect_err(|e| {
            warn!(error = %e, reply = %ai_client::truncate_to_char_boundary(&raw, 500), "Unusable oracle reply");
        })?;

        info!(category = %result.category, tags = ?result.tags, "Post classified");
        Ok(result)
    }
}

// =============================================================================
// Prompts
// =============================================================================

fn vocabulary_sections(subject: &str, user_tags: &[String], snapshot: &VocabularySnapshot) -> String {
    let mut sections = Vec::new();

    if !snapshot.categories.is_empty() {
        sections.push(format!(
            "Existing categories (reuse one if it fits, otherwise suggest a better one):\n{}",
            snapshot.categories.join(", ")
        ));
    }

    if !snapshot.tags.is_empty() {
        sections.push(format!(
            r#"Existing tags (prefer these):
{tags}

Tag reuse rules:
1. Check whether an existing tag already covers a theme before inventing a new one.
2. Reuse an existing tag when it is specific and relevant to this {subject}.
3. If the only matching tags are generic ("Technology", "Business"), create a more specific one instead.
4. Never create a synonym of an existing specific tag."#,
            tags = snapshot.tags.join(", "),
        ));
    }

    if !user_tags.is_empty() {
        let needed = TAGS_PER_POST.saturating_sub(user_tags.len());
        sections.push(format!(
            r#"User-provided tags:
{tags}

Every user-provided tag MUST appear in your answer, spelled exactly as given. Add {needed} more specific tag(s) so that there are exactly {TAGS_PER_POST} in total, preferring existing tags."#,
            tags = user_tags.join(", "),
        ));
    }

    sections.join("\n\n")
}

fn tags_instruction(subject: &str, user_tags: &[String]) -> String {
    if user_tags.is_empty() {
        format!("Exactly {TAGS_PER_POST} specific tags for the key themes of this {subject}")
    } else {
        format!("Exactly {TAGS_PER_POST} tags in total: all user-provided tags plus specific tags that complement them")
    }
}

const REPLY_FORMAT: &str = r#"Respond with ONLY the raw JSON object below, without markdown or any other text:
{
  "category": "category name",
  "topic": "short headline",
  "tags": ["tag one", "tag two", "tag three"],
  "description": "one or two sentence summary"
}"#;

pub fn build_text_prompt(content: &str, user_tags: &[String], snapshot: &VocabularySnapshot) -> String {
    format!(
        r#"You are classifying a saved post for a personal content library.

{vocabulary}

Provide:
1. category: one broad category (Technology, Career, Health, Education, ...)
2. topic: the opening 5-10 words of the post, as a headline
3. tags: {tags}. Never use a bare generic tag such as "Technology" or "Business"; prefer "AI Tools", "Job Search", "Email Campaigns".
4. description: a one or two sentence summary of the post

Post content:
{content}

{REPLY_FORMAT}"#,
        vocabulary = vocabulary_sections("post", user_tags, snapshot),
        tags = tags_instruction("post", user_tags),
    )
}

pub fn build_media_prompt(
    media: &[MediaPayload],
    user_tags: &[String],
    snapshot: &VocabularySnapshot,
) -> String {
    let count = media.len();

    let mut families: BTreeMap<&str, usize> = BTreeMap::new();
    for item in media {
        *families.entry(item.family()).or_default() += 1;
    }
    let summary = families
        .iter()
        .map(|(family, n)| {
            if *n == 1 {
                format!("1 {family}")
            } else {
                format!("{n} {family}s")
            }
        })
        .collect::<Vec<_>>()
        .join(", ");

    let combined = if count > 1 {
        format!(
            "\nYou will receive {count} separate media files. Analyze them together and give ONE combined answer for the whole set, never one answer per file."
        )
    } else {
        String::new()
    };

    let labels = media
        .iter()
        .enumerate()
        .filter(|(_, m)| !m.context_label.is_empty())
        .map(|(i, m)| format!("  Media {}: {}", i + 1, m.context_label))
        .collect::<Vec<_>>();
    let labels = if labels.is_empty() {
        String::new()
    } else {
        format!("\nContext for each media file:\n{}", labels.join("\n"))
    };

    let focus = match media {
        [single] if single.family() == "image" => {
            "Look closely at the image: its subjects, composition and overall theme.".to_string()
        }
        [single] if single.family() == "video" => {
            "Watch the video closely: its scenes, actions, mood and overall theme.".to_string()
        }
        [_] => "Analyze this media closely.".to_string(),
        _ => format!("Treat all {count} media files as one set and find the message they share."),
    };

    format!(
        r#"You are classifying saved social media content for a personal content library.

{vocabulary}

Media: {count} file(s) ({summary}).{combined}{labels}

{focus}

Provide:
1. category: one broad category (Fitness, Travel, Food, Fashion, Comedy, ...)
2. topic: a 5-10 word description of what the media shows
3. tags: {tags}. Focus on the main subject or activity and never use a bare generic tag such as "Video" or "Entertainment".
4. description: a one or two sentence summary of what is shown

{REPLY_FORMAT}"#,
        vocabulary = vocabulary_sections("media", user_tags, snapshot),
        tags = tags_instruction("media", user_tags),
    )
}

// =============================================================================
// Reply parsing
// =============================================================================

#[derive(Debug, Deserialize)]
struct ClassificationReply {
    category: String,
    #[serde(default)]
    topic: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    description: String,
}

/// Parse the oracle reply and enforce the tag contract.
///
/// User tags are kept verbatim. Oracle tags keep their order; an oracle tag
/// that matches a user tag case-insensitively is replaced by the user's
/// spelling, and generated tags are capped so the total is exactly
/// [`TAGS_PER_POST`].
pub fn parse_classification(
    raw: &str,
    user_tags: &[String],
) -> Result<ClassificationResult, OracleError> {
    let reply: ClassificationReply = serde_json::from_str(strip_code_blocks(raw))
        .map_err(|e| OracleError::MalformedClassification(format!("invalid JSON: {e}")))?;

    let category = reply.category.trim().to_string();
    if category.is_empty() {
        return Err(OracleError::MalformedClassification("empty category".into()));
    }

    let tags = merge_tags(user_tags, &reply.tags);
    if tags.len() != TAGS_PER_POST {
        return Err(OracleError::MalformedClassification(format!(
            "expected {TAGS_PER_POST} tags, got {} ({:?})",
            tags.len(),
            reply.tags
        )));
    }

    Ok(ClassificationResult {
        category,
        topic: reply.topic.trim().to_string(),
        tags,
        description: reply.description.trim().to_string(),
    })
}

fn merge_tags(user_tags: &[String], generated: &[String]) -> Vec<String> {
    let user_match = |tag: &str| user_tags.iter().find(|u| u.eq_ignore_ascii_case(tag));
    let mut quota = TAGS_PER_POST.saturating_sub(user_tags.len());
    let mut tags: Vec<String> = Vec::with_capacity(TAGS_PER_POST);

    for tag in generated.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
        if tags.iter().any(|seen| seen.eq_ignore_ascii_case(tag)) {
            continue;
        }
        match user_match(tag) {
            Some(user) => tags.push(user.clone()),
            None if quota > 0 => {
                quota -= 1;
                tags.push(tag.to_string());
            }
            None => {}
        }
    }

    for user in user_tags {
        if !tags.contains(user) {
            tags.push(user.clone());
        }
    }
    tags
}
