use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Reference ---

/// What the user handed us: a link to a post, or a free-form note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reference {
    Url(String),
    Notes(String),
}

impl Reference {
    pub fn is_url(&self) -> bool {
        matches!(self, Reference::Url(_))
    }

    /// The raw value, stored verbatim on the post.
    pub fn as_str(&self) -> &str {
        match self {
            Reference::Url(s) | Reference::Notes(s) => s,
        }
    }
}

// --- Platform ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linkedin,
    X,
    Reddit,
    Instagram,
    Notes,
    Others,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Linkedin,
        Platform::X,
        Platform::Reddit,
        Platform::Instagram,
        Platform::Notes,
        Platform::Others,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linkedin => "linkedin",
            Platform::X => "x",
            Platform::Reddit => "reddit",
            Platform::Instagram => "instagram",
            Platform::Notes => "notes",
            Platform::Others => "others",
        }
    }

    /// Platforms whose posts are classified from extracted text.
    pub fn is_text(&self) -> bool {
        matches!(self, Platform::Linkedin | Platform::X | Platform::Reddit)
    }

    /// Platforms whose posts are galleries of images or video.
    pub fn is_gallery(&self) -> bool {
        matches!(self, Platform::Instagram)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}

// --- Extraction ---

/// Gallery post shape, as read from the page payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
    Carousel,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Video => f.write_str("video"),
            MediaKind::Image => f.write_str("image"),
            MediaKind::Carousel => f.write_str("carousel"),
        }
    }
}

/// One piece of media attached to a post.
///
/// `local_path` stays `None` until the bytes have been written to scratch
/// storage. Items that fail to download are dropped, never kept half-filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub source_url: String,
    pub local_path: Option<PathBuf>,
    pub context_label: String,
}

impl MediaItem {
    pub fn remote(source_url: impl Into<String>, context_label: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            local_path: None,
            context_label: context_label.into(),
        }
    }
}

/// Sentinel used when no author tier produced a value.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedPost {
    pub author: String,
    pub content: String,
    pub media: Vec<MediaItem>,
}

// --- Classification ---

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: String,
    pub topic: String,
    pub tags: Vec<String>,
    pub description: String,
}

/// Global tag/category pools offered to the oracle as reuse candidates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VocabularySnapshot {
    pub tags: Vec<String>,
    pub categories: Vec<String>,
}

// --- Durable records ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub platform: Platform,
    pub raw_data: String,
    pub author: String,
    pub topic: String,
    pub category: String,
    pub tags: Vec<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A post that has been classified but not yet written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub user_id: i64,
    pub platform: Platform,
    pub raw_data: String,
    pub author: String,
    pub topic: String,
    pub category: String,
    pub tags: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedPost {
    #[serde(flatten)]
    pub post: Post,
    pub post_link: String,
}

/// The three per-user, per-platform vocabulary projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VocabularyKind {
    Authors,
    Tags,
    Categories,
}

impl VocabularyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VocabularyKind::Authors => "authors",
            VocabularyKind::Tags => "tags",
            VocabularyKind::Categories => "categories",
        }
    }
}

impl fmt::Display for VocabularyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VocabularyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authors" => Ok(VocabularyKind::Authors),
            "tags" => Ok(VocabularyKind::Tags),
            "categories" => Ok(VocabularyKind::Categories),
            other => Err(format!("unknown vocabulary kind: {other}")),
        }
    }
}

/// Listing filter. Empty lists mean "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PostFilter {
    pub platform: Option<Platform>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VocabularyCounts {
    pub total_posts_count: i64,
    pub total_tags_count: i64,
    pub total_categories_count: i64,
}
