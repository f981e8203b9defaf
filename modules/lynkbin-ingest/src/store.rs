// Durable storage for posts and vocabularies.
//
// `Store` is the seam the pipeline and reconciler talk to. `PgStore` is the
// Postgres implementation; `fixtures::MemoryStore` backs the tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lynkbin_common::{
    NewPost, Platform, Post, PostFilter, VocabularyCounts, VocabularyKind, VocabularySnapshot,
};
use sqlx::PgPool;
use tracing::debug;

use crate::error::StoreError;
use crate::vocabulary::union_additions;

#[async_trait]
pub trait Store: Send + Sync {
    /// Global tag and category pools, freshly read.
    async fn vocabulary_snapshot(&self) -> Result<VocabularySnapshot, StoreError>;

    /// Whether `author` is already in the user's author set for `platform`.
    async fn author_exists(
        &self,
        user_id: i64,
        platform: Platform,
        author: &str,
    ) -> Result<bool, StoreError>;

    /// Merge `values` into the user's `(kind, platform)` set, creating the set
    /// if needed. Returns the values that were not already present, in input
    /// order. Nothing is written when that list is empty.
    async fn merge_user_vocabulary(
        &self,
        kind: VocabularyKind,
        user_id: i64,
        platform: Platform,
        values: &[String],
    ) -> Result<Vec<String>, StoreError>;

    /// Conflict-free insert into the global pool for `kind`. Authors have no
    /// global pool and are ignored.
    async fn insert_global(&self, kind: VocabularyKind, values: &[String]) -> Result<(), StoreError>;

    async fn insert_post(&self, post: &NewPost) -> Result<Post, StoreError>;

    /// Posts matching `filter`, newest first.
    async fn list_posts(&self, user_id: i64, filter: &PostFilter) -> Result<Vec<Post>, StoreError>;

    async fn recent_posts(&self, user_id: i64, limit: i64) -> Result<Vec<Post>, StoreError>;

    async fn user_vocabulary(
        &self,
        kind: VocabularyKind,
        user_id: i64,
        platform: Platform,
    ) -> Result<Vec<String>, StoreError>;

    async fn counts(&self, user_id: i64) -> Result<VocabularyCounts, StoreError>;

    /// Delete a post owned by `user_id`. `NotFound` if no such post is theirs.
    async fn delete_post(&self, user_id: i64, post_id: i64) -> Result<(), StoreError>;
}

// =============================================================================
// Postgres
// =============================================================================

pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct PostRow {
    id: i64,
    user_id: i64,
    platform: String,
    raw_data: String,
    author: String,
    topic: String,
    category: String,
    tags: Vec<String>,
    description: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<PostRow> for Post {
    type Error = StoreError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        let platform = row
            .platform
            .parse()
            .map_err(|e| StoreError::InvalidRow(format!("post {}: {e}", row.id)))?;
        Ok(Post {
            id: row.id,
            user_id: row.user_id,
            platform,
            raw_data: row.raw_data,
            author: row.author,
            topic: row.topic,
            category: row.category,
            tags: row.tags,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

fn into_posts(rows: Vec<PostRow>) -> Result<Vec<Post>, StoreError> {
    rows.into_iter().map(Post::try_from).collect()
}

/// Table and array column holding a user's set of `kind`.
fn user_table(kind: VocabularyKind) -> (&'static str, &'static str) {
    match kind {
        VocabularyKind::Authors => ("user_authors", "names"),
        VocabularyKind::Tags => ("user_tags", "tags"),
        VocabularyKind::Categories => ("user_categories", "categories"),
    }
}

fn global_table(kind: VocabularyKind) -> Option<(&'static str, &'static str)> {
    match kind {
        VocabularyKind::Authors => None,
        VocabularyKind::Tags => Some(("all_tags", "tag")),
        VocabularyKind::Categories => Some(("all_categories", "category")),
    }
}

fn write_failure(e: sqlx::Error) -> StoreError {
    StoreError::WriteFailure(e.to_string())
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(PgPool::connect(database_url).await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn vocabulary_snapshot(&self) -> Result<VocabularySnapshot, StoreError> {
        let tags = sqlx::query_scalar::<_, String>("SELECT tag FROM all_tags ORDER BY tag")
            .fetch_all(&self.pool)
            .await?;
        let categories =
            sqlx::query_scalar::<_, String>("SELECT category FROM all_categories ORDER BY category")
                .fetch_all(&self.pool)
                .await?;

        Ok(VocabularySnapshot { tags, categories })
    }

    async fn author_exists(
        &self,
        user_id: i64,
        platform: Platform,
        author: &str,
    ) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM user_authors
                WHERE user_id = $1 AND platform = $2 AND $3 = ANY(names)
            )
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .bind(author)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn merge_user_vocabulary(
        &self,
        kind: VocabularyKind,
        user_id: i64,
        platform: Platform,
        values: &[String],
    ) -> Result<Vec<String>, StoreError> {
        let (table, column) = user_table(kind);
        let mut tx = self.pool.begin().await.map_err(write_failure)?;

        // Serialise read-merge-write per (kind, user, platform). Released at
        // commit or rollback.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("{kind}:{user_id}:{platform}"))
            .execute(&mut *tx)
            .await
            .map_err(write_failure)?;

        let existing = sqlx::query_scalar::<_, Vec<String>>(&format!(
            "SELECT {column} FROM {table} WHERE user_id = $1 AND platform = $2"
        ))
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let added = union_additions(existing.as_deref().unwrap_or_default(), values);
        if added.is_empty() {
            debug!(%kind, user_id, %platform, "Vocabulary unchanged");
            tx.rollback().await.map_err(write_failure)?;
            return Ok(added);
        }

        let sql = if existing.is_some() {
            format!(
                "UPDATE {table} SET {column} = {column} || $3, updated_at = now() \
                 WHERE user_id = $1 AND platform = $2"
            )
        } else {
            format!("INSERT INTO {table} (user_id, platform, {column}) VALUES ($1, $2, $3)")
        };
        sqlx::query(&sql)
            .bind(user_id)
            .bind(platform.as_str())
            .bind(&added)
            .execute(&mut *tx)
            .await
            .map_err(write_failure)?;

        tx.commit().await.map_err(write_failure)?;
        debug!(%kind, user_id, %platform, added = ?added, "Vocabulary extended");
        Ok(added)
    }

    async fn insert_global(&self, kind: VocabularyKind, values: &[String]) -> Result<(), StoreError> {
        let Some((table, column)) = global_table(kind) else {
            return Ok(());
        };
        if values.is_empty() {
            return Ok(());
        }

        sqlx::query(&format!(
            "INSERT INTO {table} ({column}) SELECT UNNEST($1::text[]) ON CONFLICT DO NOTHING"
        ))
        .bind(values)
        .execute(&self.pool)
        .await
        .map_err(write_failure)?;

        Ok(())
    }

    async fn insert_post(&self, post: &NewPost) -> Result<Post, StoreError> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            INSERT INTO posts
                (user_id, platform, raw_data, author, topic, category, tags, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(post.user_id)
        .bind(post.platform.as_str())
        .bind(&post.raw_data)
        .bind(&post.author)
        .bind(&post.topic)
        .bind(&post.category)
        .bind(&post.tags)
        .bind(&post.description)
        .fetch_one(&self.pool)
        .await
        .map_err(write_failure)?;

        row.try_into()
    }

    async fn list_posts(&self, user_id: i64, filter: &PostFilter) -> Result<Vec<Post>, StoreError> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT * FROM posts
            WHERE user_id = $1
              AND ($2::text IS NULL OR platform = $2)
              AND (cardinality($3::text[]) = 0 OR tags && $3)
              AND (cardinality($4::text[]) = 0 OR author = ANY($4))
              AND (cardinality($5::text[]) = 0 OR category = ANY($5))
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(filter.platform.map(|p| p.as_str()))
        .bind(&filter.tags)
        .bind(&filter.authors)
        .bind(&filter.categories)
        .fetch_all(&self.pool)
        .await?;

        into_posts(rows)
    }

    async fn recent_posts(&self, user_id: i64, limit: i64) -> Result<Vec<Post>, StoreError> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT * FROM posts
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        into_posts(rows)
    }

    async fn user_vocabulary(
        &self,
        kind: VocabularyKind,
        user_id: i64,
        platform: Platform,
    ) -> Result<Vec<String>, StoreError> {
        let (table, column) = user_table(kind);
        let values = sqlx::query_scalar::<_, Vec<String>>(&format!(
            "SELECT {column} FROM {table} WHERE user_id = $1 AND platform = $2"
        ))
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(values.unwrap_or_default())
    }

    async fn counts(&self, user_id: i64) -> Result<VocabularyCounts, StoreError> {
        let total_posts_count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        let total_tags_count = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(CARDINALITY(tags)), 0)::BIGINT FROM user_tags WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        let total_categories_count = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(CARDINALITY(categories)), 0)::BIGINT FROM user_categories WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(VocabularyCounts {
            total_posts_count,
            total_tags_count,
            total_categories_count,
        })
    }

    async fn delete_post(&self, user_id: i64, post_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(write_failure)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("post {post_id} for user {user_id}")));
        }
        Ok(())
    }
}
