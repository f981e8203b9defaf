// Submission pipeline and the read-only surface around it.
//
// submit: accept → classify platform → extract → (materialize) → classify
// post → reconcile vocabulary → insert post. Steps run strictly in order.
// Nothing durable is written until classification has succeeded.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lynkbin_common::{
    ClassificationResult, Config, CreatedPost, ExtractedPost, NewPost, Platform, Post, PostFilter,
    VocabularyCounts, VocabularyKind,
};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::classify::{ClassificationInput, Classifier, MediaPayload};
use crate::error::{Result, StoreError};
use crate::extractors::{ExtractSettings, Extractors};
use crate::media::{MediaMaterializer, ScratchScope};
use crate::oracle::Oracle;
use crate::platform::{accept_submission, classify_platform};
use crate::render::{Fetcher, Renderer};
use crate::store::Store;
use crate::vocabulary::Reconciler;

/// How many posts the "recent" listing returns.
pub const RECENT_POSTS_LIMIT: i64 = 5;

const DASHBOARD_URL: &str = "https://lynkbin.vercel.app/dashboard";

/// Dashboard link for a platform's posts.
pub fn post_link(platform: Platform) -> String {
    format!("{DASHBOARD_URL}?platform={platform}")
}

/// A raw submission as it arrives from the caller.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Submission {
    pub is_url: bool,
    pub url: String,
    pub notes: String,
    pub tags: Vec<String>,
}

impl Submission {
    pub fn link(url: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            is_url: true,
            url: url.into(),
            notes: String::new(),
            tags,
        }
    }

    pub fn note(notes: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            is_url: false,
            url: String::new(),
            notes: notes.into(),
            tags,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub render_timeout: Duration,
    pub fetch_timeout: Duration,
    pub oracle_timeout: Duration,
    pub max_note_chars: usize,
    /// Parent directory for per-submission media scratch scopes.
    pub scratch_root: PathBuf,
    pub proxy: Option<String>,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            render_timeout: config.render_timeout,
            fetch_timeout: config.fetch_timeout,
            oracle_timeout: config.oracle_timeout,
            max_note_chars: config.max_note_chars,
            scratch_root: config.media_scratch_dir.clone(),
            proxy: config.render_proxy.clone(),
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            render_timeout: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(60),
            oracle_timeout: Duration::from_secs(90),
            max_note_chars: 3500,
            scratch_root: std::env::temp_dir().join("lynkbin"),
            proxy: None,
        }
    }
}

pub struct Ingestor {
    extractors: Extractors,
    materializer: MediaMaterializer,
    classifier: Classifier,
    store: Arc<dyn Store>,
    settings: IngestSettings,
}

impl Ingestor {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        fetcher: Arc<dyn Fetcher>,
        oracle: Arc<dyn Oracle>,
        store: Arc<dyn Store>,
        settings: IngestSettings,
    ) -> Self {
        let extract_settings = ExtractSettings {
            timeout: settings.render_timeout,
            proxy: settings.proxy.clone(),
        };

        Self {
            extractors: Extractors::new(renderer, fetcher.clone(), extract_settings),
            materializer: MediaMaterializer::new(fetcher, settings.fetch_timeout),
            classifier: Classifier::new(oracle, settings.oracle_timeout),
            store,
            settings,
        }
    }

    /// Turn a submission into a stored post.
    ///
    /// Failures are logged here with full detail; callers should only show
    /// [`crate::IngestError::public_message`] to the submitter.
    pub async fn submit(&self, user_id: i64, submission: Submission) -> Result<CreatedPost> {
        let result = self.ingest(user_id, &submission).await;
        match &result {
            Ok(created) => info!(
                user_id,
                post_id = created.post.id,
                platform = %created.post.platform,
                "Post created"
            ),
            Err(e) if e.is_client_error() => {
                warn!(user_id, url = %submission.url, error = %e, "Submission rejected")
            }
            Err(e) => error!(user_id, url = %submission.url, error = %e, "Submission failed"),
        }
        result
    }

    async fn ingest(&self, user_id: i64, submission: &Submission) -> Result<CreatedPost> {
        let (reference, user_tags) = accept_submission(
            submission.is_url,
            &submission.url,
            &submission.notes,
            &submission.tags,
            self.settings.max_note_chars,
        )?;
        let platform = classify_platform(reference.as_str(), reference.is_url());
        info!(user_id, %platform, tags = ?user_tags, "Submission accepted");

        let (author, classification) = match platform {
            Platform::Others => (
                String::new(),
                ClassificationResult {
                    tags: user_tags,
                    ..Default::default()
                },
            ),
            Platform::Instagram => {
                let extracted = self.extractors.extract(platform, reference.as_str()).await?;
                let classification = self.classify_media(platform, &extracted, &user_tags).await?;
                (extracted.author, classification)
            }
            _ => {
                let extracted = self.extractors.extract(platform, reference.as_str()).await?;
                let snapshot = self.store.vocabulary_snapshot().await?;
                let classification = self
                    .classifier
                    .classify(
                        ClassificationInput::Text(&extracted.content),
                        &user_tags,
                        &snapshot,
                    )
                    .await?;
                (extracted.author, classification)
            }
        };

        let post = NewPost {
            user_id,
            platform,
            raw_data: reference.as_str().to_string(),
            author,
            topic: classification.topic,
            category: classification.category,
            tags: classification.tags,
            description: classification.description,
        };

        let post = self.commit(post).await?;
        Ok(CreatedPost {
            post_link: post_link(platform),
            post,
        })
    }

    /// Materialize into a scratch scope, read the bytes back, classify.
    /// The scope is removed when this returns, whatever the outcome.
    async fn classify_media(
        &self,
        platform: Platform,
        extracted: &ExtractedPost,
        user_tags: &[String],
    ) -> Result<ClassificationResult> {
        let scope = ScratchScope::create(&self.settings.scratch_root, platform)?;
        let stored = self.materializer.materialize(&extracted.media, &scope).await?;

        let mut payloads = Vec::with_capacity(stored.len());
        for item in &stored {
            payloads.push(MediaPayload::load(item).await?);
        }

        let snapshot = self.store.vocabulary_snapshot().await?;
        let classification = self
            .classifier
            .classify(ClassificationInput::Media(&payloads), user_tags, &snapshot)
            .await?;
        Ok(classification)
    }

    /// Reconcile vocabulary and insert the post.
    ///
    /// Runs on its own task so that a caller dropping the submission future
    /// mid-write cannot leave vocabulary without its post.
    async fn commit(&self, post: NewPost) -> Result<Post> {
        let store = self.store.clone();
        let task = tokio::spawn(async move {
            Reconciler::new(store.clone())
                .reconcile(
                    post.user_id,
                    post.platform,
                    &post.author,
                    &post.tags,
                    &post.category,
                )
                .await?;
            store.insert_post(&post).await
        });

        let post = task
            .await
            .map_err(|e| StoreError::WriteFailure(format!("commit task failed: {e}")))??;
        Ok(post)
    }

    // =========================================================================
    // Listing
    // =========================================================================

    pub async fn posts(&self, user_id: i64, filter: &PostFilter) -> Result<Vec<Post>> {
        Ok(self.store.list_posts(user_id, filter).await?)
    }

    pub async fn recent_posts(&self, user_id: i64) -> Result<Vec<Post>> {
        Ok(self.store.recent_posts(user_id, RECENT_POSTS_LIMIT).await?)
    }

    pub async fn vocabulary(
        &self,
        kind: VocabularyKind,
        user_id: i64,
        platform: Platform,
    ) -> Result<Vec<String>> {
        Ok(self.store.user_vocabulary(kind, user_id, platform).await?)
    }

    pub async fn counts(&self, user_id: i64) -> Result<VocabularyCounts> {
        Ok(self.store.counts(user_id).await?)
    }

    /// Delete one of the user's posts. Vocabulary learned from it stays.
    pub async fn delete_post(&self, user_id: i64, post_id: i64) -> Result<()> {
        self.store.delete_post(user_id, post_id).await?;
        info!(user_id, post_id, "Post deleted");
        Ok(())
    }
}
