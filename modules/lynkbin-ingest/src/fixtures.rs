// Test collaborators for the ingestion pipeline, one per trait boundary.
// Renderer, fetcher and oracle fixtures record what they were asked for.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use lynkbin_common::{
    NewPost, Platform, Post, PostFilter, VocabularyCounts, VocabularyKind, VocabularySnapshot,
};

use crate::error::{ExtractionError, StoreError};
use crate::oracle::{Oracle, OracleRequest};
use crate::render::{FetchError, Fetcher, RenderOptions, RenderedPage, Renderer};
use crate::store::Store;
use crate::vocabulary::union_additions;

// ---------------------------------------------------------------------------
// FixtureRenderer
// ---------------------------------------------------------------------------

/// Unregistered URLs fail with `NavigationFailed`.
#[derive(Default)]
pub struct FixtureRenderer {
    pages: HashMap<String, RenderedPage>,
    calls: Mutex<Vec<(String, RenderOptions)>>,
}

impl FixtureRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(self, url: &str, html: &str) -> Self {
        self.on_rendered(url, RenderedPage::new(url, html))
    }

    pub fn on_rendered(mut self, url: &str, page: RenderedPage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Every render call so far, with the options it was given.
    pub fn calls(&self) -> Vec<(String, RenderOptions)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for FixtureRenderer {
    async fn render(
        &self,
        url: &str,
        options: &RenderOptions,
    ) -> Result<RenderedPage, ExtractionError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), options.clone()));
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ExtractionError::navigation(url, "FixtureRenderer: no page registered"))
    }
}

// ---------------------------------------------------------------------------
// FixtureFetcher
// ---------------------------------------------------------------------------

/// Unregistered URLs fail with a network error.
#[derive(Default)]
pub struct FixtureFetcher {
    responses: HashMap<String, Result<Vec<u8>, u16>>,
    requested: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_bytes(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.responses.insert(url.to_string(), Ok(body.into()));
        self
    }

    pub fn on_status(mut self, url: &str, status: u16) -> Self {
        self.responses.insert(url.to_string(), Err(status));
        self
    }

    /// URLs requested so far, in order.
    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn fetch(&self, url: &str, _headers: &[(&str, &str)]) -> Result<Bytes, FetchError> {
        self.requested.lock().unwrap().push(url.to_string());
        match self.responses.get(url) {
            Some(Ok(body)) => Ok(Bytes::from(body.clone())),
            Some(Err(status)) => Err(FetchError::Status {
                status: *status,
                url: url.to_string(),
            }),
            None => Err(FetchError::Network(format!(
                "FixtureFetcher: no response registered for {url}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// FixtureOracle
// ---------------------------------------------------------------------------

pub struct FixtureOracle {
    reply: Result<String, String>,
    delay: Option<Duration>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl FixtureOracle {
    pub fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: Ok(reply.into()),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            reply: Err(message.into()),
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before answering, to exercise timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Oracle for FixtureOracle {
    async fn generate(&self, request: &OracleRequest) -> anyhow::Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(|e| anyhow!(e))
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    posts: Vec<Post>,
    next_id: i64,
    user_sets: HashMap<(VocabularyKind, i64, Platform), Vec<String>>,
    global_tags: BTreeSet<String>,
    global_categories: BTreeSet<String>,
    fail_post_insert: bool,
}

/// In-memory store with the same merge semantics as `PgStore`.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_global(self, tags: &[&str], categories: &[&str]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.global_tags.extend(tags.iter().map(|t| t.to_string()));
            state
                .global_categories
                .extend(categories.iter().map(|c| c.to_string()));
        }
        self
    }

    /// Make every post insert fail with `WriteFailure`.
    pub fn failing_post_insert(self) -> Self {
        self.state.lock().unwrap().fail_post_insert = true;
        self
    }

    pub fn user_set(&self, kind: VocabularyKind, user_id: i64, platform: Platform) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .user_sets
            .get(&(kind, user_id, platform))
            .cloned()
            .unwrap_or_default()
    }

    pub fn global_tags(&self) -> Vec<String> {
        self.state.lock().unwrap().global_tags.iter().cloned().collect()
    }

    pub fn global_categories(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .global_categories
            .iter()
            .cloned()
            .collect()
    }

    pub fn posts(&self) -> Vec<Post> {
        self.state.lock().unwrap().posts.clone()
    }
}

fn newest_first(mut posts: Vec<Post>) -> Vec<Post> {
    posts.sort_by(|a, b| {
        let key = |p: &Post| -> (DateTime<Utc>, i64) { (p.created_at, p.id) };
        key(b).cmp(&key(a))
    });
    posts
}

#[async_trait]
impl Store for MemoryStore {
    async fn vocabulary_snapshot(&self) -> Result<VocabularySnapshot, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(VocabularySnapshot {
            tags: state.global_tags.iter().cloned().collect(),
            categories: state.global_categories.iter().cloned().collect(),
        })
    }

    async fn author_exists(
        &self,
        user_id: i64,
        platform: Platform,
        author: &str,
    ) -> Result<bool, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .user_sets
            .get(&(VocabularyKind::Authors, user_id, platform))
            .is_some_and(|names| names.iter().any(|n| n == author)))
    }

    async fn merge_user_vocabulary(
        &self,
        kind: VocabularyKind,
        user_id: i64,
        platform: Platform,
        values: &[String],
    ) -> Result<Vec<String>, StoreError> {
        let mut state = self.state.lock().unwrap();
        let set = state.user_sets.entry((kind, user_id, platform)).or_default();
        let added = union_additions(set, values);
        set.extend(added.iter().cloned());
        Ok(added)
    }

    async fn insert_global(&self, kind: VocabularyKind, values: &[String]) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let pool = match kind {
            VocabularyKind::Authors => return Ok(()),
            VocabularyKind::Tags => &mut state.global_tags,
            VocabularyKind::Categories => &mut state.global_categories,
        };
        pool.extend(values.iter().cloned());
        Ok(())
    }

    async fn insert_post(&self, post: &NewPost) -> Result<Post, StoreError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_post_insert {
            return Err(StoreError::WriteFailure("MemoryStore: post insert disabled".into()));
        }

        state.next_id += 1;
        let stored = Post {
            id: state.next_id,
            user_id: post.user_id,
            platform: post.platform,
            raw_data: post.raw_data.clone(),
            author: post.author.clone(),
            topic: post.topic.clone(),
            category: post.category.clone(),
            tags: post.tags.clone(),
            description: post.description.clone(),
            created_at: Utc::now(),
        };
        state.posts.push(stored.clone());
        Ok(stored)
    }

    async fn list_posts(&self, user_id: i64, filter: &PostFilter) -> Result<Vec<Post>, StoreError> {
        let state = self.state.lock().unwrap();
        let matching = state
            .posts
            .iter()
            .filter(|p| p.user_id == user_id)
            .filter(|p| filter.platform.map_or(true, |platform| p.platform == platform))
            .filter(|p| filter.tags.is_empty() || p.tags.iter().any(|t| filter.tags.contains(t)))
            .filter(|p| filter.authors.is_empty() || filter.authors.contains(&p.author))
            .filter(|p| filter.categories.is_empty() || filter.categories.contains(&p.category))
            .cloned()
            .collect();
        Ok(newest_first(matching))
    }

    async fn recent_posts(&self, user_id: i64, limit: i64) -> Result<Vec<Post>, StoreError> {
        let posts = self.list_posts(user_id, &PostFilter::default()).await?;
        Ok(posts.into_iter().take(limit.max(0) as usize).collect())
    }

    async fn user_vocabulary(
        &self,
        kind: VocabularyKind,
        user_id: i64,
        platform: Platform,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self.user_set(kind, user_id, platform))
    }

    async fn counts(&self, user_id: i64) -> Result<VocabularyCounts, StoreError> {
        let state = self.state.lock().unwrap();
        let sum = |kind: VocabularyKind| -> i64 {
            state
                .user_sets
                .iter()
                .filter(|((k, u, _), _)| *k == kind && *u == user_id)
                .map(|(_, values)| values.len() as i64)
                .sum()
        };
        Ok(VocabularyCounts {
            total_posts_count: state.posts.iter().filter(|p| p.user_id == user_id).count() as i64,
            total_tags_count: sum(VocabularyKind::Tags),
            total_categories_count: sum(VocabularyKind::Categories),
        })
    }

    async fn delete_post(&self, user_id: i64, post_id: i64) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let before = state.posts.len();
        state
            .posts
            .retain(|p| !(p.id == post_id && p.user_id == user_id));
        if state.posts.len() == before {
            return Err(StoreError::NotFound(format!("post {post_id} for user {user_id}")));
        }
        Ok(())
    }
}
