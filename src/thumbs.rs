//! Thumbnail fetch with an on-disk cache keyed by the SHA-256 of the thumbnail URL.

use image::DynamicImage;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::provider::Provider;

/// A decoded thumbnail for the result whose thumbnail URL is `url`.
#[derive(Debug, Clone)]
pub struct Thumbnail {
  pub url: String,
  pub image: DynamicImage,
}

#[derive(Debug, Clone)]
pub struct ThumbnailCache {
  dir: PathBuf,
}

impl ThumbnailCache {
  pub fn new(dir: PathBuf) -> Self {
    Self { dir }
  }

  pub fn path_for(&self, url: &str) -> PathBuf {
    let digest = Sha256::digest(url.as_bytes());
    self.dir.join(format!("{}.jpg", hex::encode(digest)))
  }

  /// Cached bytes when present, otherwise download through `provider` and cache them.
  /// Decoding happens here too, so the controller only receives ready images.
  pub async fn load_or_fetch(&self, provider: Arc<dyn Provider>, url: String) -> Result<Thumbnail> {
    let path = self.path_for(&url);
    let (bytes, fresh) = match tokio::fs::read(&path).await {
      Ok(bytes) => {
        debug!(url = %url, "thumbs: cache hit");
        (bytes, false)
      }
      Err(_) => (provider.fetch_thumbnail(url.clone()).await?, true),
    };

    let dir = self.dir.clone();
    let decoded = tokio::task::spawn_blocking(move || {
      let image = image::load_from_memory(&bytes)
        .map_err(|e| CoreError::provider(format!("thumbnail is not a decodable image: {}", e)))?;
      // Only images that decode make it into the cache.
      if fresh && let Err(e) = write_cache_file(&dir, &path, &bytes) {
        warn!(path = %path.display(), err = %e, "thumbs: failed to cache thumbnail");
      }
      Ok::<_, CoreError>(image)
    })
    .await
    .map_err(|e| CoreError::TaskFailed(e.to_string()))?;

    Ok(Thumbnail { url, image: decoded? })
  }
}

fn write_cache_file(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
  std::fs::create_dir_all(dir)?;
  let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
  tmp.write_all(bytes)?;
  tmp.persist(path).map_err(|e| e.error)?;
  Ok(())
}
