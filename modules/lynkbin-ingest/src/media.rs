// Media materialization into a scratch scope.
//
// A `ScratchScope` owns a temporary directory that is removed when the scope
// is dropped, so every exit path (success, error, cancellation) cleans up.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use lynkbin_common::{MediaItem, Platform};
use tempfile::TempDir;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::MediaError;
use crate::extractors::DESKTOP_USER_AGENT;
use crate::render::Fetcher;

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mov", "webm", "m4v"];
const IMAGE_ACCEPT: &str = "image/webp,image/apng,image/*,*/*;q=0.8";
const MEDIA_REFERER: &str = "https://www.instagram.com/";

pub struct ScratchScope {
    dir: TempDir,
}

impl ScratchScope {
    /// Create a fresh, uniquely named directory under `root`.
    pub fn create(root: &Path, platform: Platform) -> Result<Self, MediaError> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{platform}-"))
            .tempdir_in(root)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

pub struct MediaMaterializer {
    fetcher: Arc<dyn Fetcher>,
    timeout: Duration,
}

impl MediaMaterializer {
    pub fn new(fetcher: Arc<dyn Fetcher>, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    /// Download every reference into `scope`, in order.
    ///
    /// Items that fail to download or write are logged and dropped. The call
    /// only fails when nothing at all could be stored.
    pub async fn materialize(
        &self,
        refs: &[MediaItem],
        scope: &ScratchScope,
    ) -> Result<Vec<MediaItem>, MediaError> {
        let mut stored = Vec::with_capacity(refs.len());

        for (index, item) in refs.iter().enumerate() {
            match self.store_one(index, item, scope.path()).await {
                Ok(path) => stored.push(MediaItem {
                    local_path: Some(path),
                    ..item.clone()
                }),
                Err(e) => {
                    warn!(url = %item.source_url, index, error = %e, "Skipping media item");
                }
            }
        }

        if stored.is_empty() {
            return Err(MediaError::NoMediaDownloaded {
                attempted: refs.len(),
            });
        }

        info!(
            stored = stored.len(),
            attempted = refs.len(),
            dir = %scope.path().display(),
            "Media materialized"
        );
        Ok(stored)
    }

    async fn store_one(&self, index: usize, item: &MediaItem, dir: &Path) -> anyhow::Result<PathBuf> {
        let ext = extension_for(&item.source_url, &item.context_label);
        let accept = if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            "*/*"
        } else {
            IMAGE_ACCEPT
        };
        let headers = [
            ("User-Agent", DESKTOP_USER_AGENT),
            ("Accept", accept),
            ("Referer", MEDIA_REFERER),
        ];

        let bytes = tokio::time::timeout(self.timeout, self.fetcher.fetch(&item.source_url, &headers))
            .await
            .map_err(|_| anyhow!("timed out after {:?}", self.timeout))??;

        let path = dir.join(format!("{:02}-{}.{ext}", index + 1, Uuid::new_v4()));
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

/// File extension for a media URL: the URL's own extension when it has a
/// sensible one, otherwise a default based on the item's role.
pub(crate) fn extension_for(source_url: &str, context_label: &str) -> String {
    let from_url = url::Url::parse(source_url).ok().and_then(|u| {
        let last = u.path_segments()?.last()?.to_string();
        let (_, ext) = last.rsplit_once('.')?;
        (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .then(|| ext.to_ascii_lowercase())
    });

    from_url.unwrap_or_else(|| {
        if context_label.eq_ignore_ascii_case("reel") {
            "mp4".to_string()
        } else {
            "jpg".to_string()
        }
    })
}
