// Vocabulary reconciliation.
//
// A classified post's author, tags and category are folded into the
// submitter's per-platform sets. Newly learned tags and categories also join
// the global pools offered to the classifier. Every step is idempotent.

use std::sync::Arc;

use lynkbin_common::{Platform, VocabularyKind};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::Store;

/// Values from `incoming` that are not in `existing`, without repeats, in
/// input order. Comparison is exact.
pub fn union_additions(existing: &[String], incoming: &[String]) -> Vec<String> {
    let mut added: Vec<String> = Vec::new();
    for value in incoming {
        if !existing.contains(value) && !added.contains(value) {
            added.push(value.clone());
        }
    }
    added
}

/// What a reconcile call actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub author_added: bool,
    pub tags_added: Vec<String>,
    pub category_added: bool,
}

impl ReconcileOutcome {
    pub fn is_noop(&self) -> bool {
        !self.author_added && self.tags_added.is_empty() && !self.category_added
    }
}

pub struct Reconciler {
    store: Arc<dyn Store>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn reconcile(
        &self,
        user_id: i64,
        platform: Platform,
        author: &str,
        tags: &[String],
        category: &str,
    ) -> Result<ReconcileOutcome, StoreError> {
        let tags: Vec<String> = tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
        let category = category.trim();

        let tags_added = self.merge(VocabularyKind::Tags, user_id, platform, &tags).await?;

        let category_added = if category.is_empty() {
            false
        } else {
            !self
                .merge(VocabularyKind::Categories, user_id, platform, &[category.to_string()])
                .await?
                .is_empty()
        };

        let author_added = self.reconcile_author(user_id, platform, author).await?;

        let outcome = ReconcileOutcome {
            author_added,
            tags_added,
            category_added,
        };
        if !outcome.is_noop() {
            info!(user_id, %platform, ?outcome, "Vocabulary reconciled");
        }
        Ok(outcome)
    }

    /// Merge into the user's set and, for anything new, the global pool.
    async fn merge(
        &self,
        kind: VocabularyKind,
        user_id: i64,
        platform: Platform,
        values: &[String],
    ) -> Result<Vec<String>, StoreError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let added = self
            .store
            .merge_user_vocabulary(kind, user_id, platform, values)
            .await?;

        if !added.is_empty() {
            self.store.insert_global(kind, values).await?;
        }
        Ok(added)
    }

    /// Authors are skipped when empty or already known. The membership check
    /// happens here; the store's merge repeats it under lock, so a racing
    /// submission cannot add the same name twice.
    async fn reconcile_author(
        &self,
        user_id: i64,
        platform: Platform,
        author: &str,
    ) -> Result<bool, StoreError> {
        let author = author.trim();
        if author.is_empty() {
            return Ok(false);
        }
        if self.store.author_exists(user_id, platform, author).await? {
            debug!(user_id, %platform, author, "Author already known");
            return Ok(false);
        }

        let added = self
            .store
            .merge_user_vocabulary(VocabularyKind::Authors, user_id, platform, &[author.to_string()])
            .await?;
        Ok(!added.is_empty())
    }
}
