use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Loads article images from URLs or local paths. URL fetches can be backed
/// by an on-disk cache keyed by the md5 of the URL, so re-runs over the same
/// feed skip the network entirely.
///
/// No retries and no timeouts: a transient fetch failure fails that one
/// article and the batch moves on.
pub struct ImageFetcher {
    client: reqwest::Client,
    cache_dir: Option<PathBuf>,
}

impl ImageFetcher {
    pub fn new(cache_dir: Option<PathBuf>) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache_dir,
        }
    }

    pub async fn load(&self, reference: &str) -> Result<DynamicImage> {
        let bytes = if is_url(reference) {
            self.fetch(reference).await?
        } else {
            fs::read(reference).with_context(|| format!("failed to read image: {}", reference))?
        };

        let kind = infer::get(&bytes)
            .ok_or_else(|| anyhow!("unrecognized image data: {}", reference))?;
        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(anyhow!(
                "not an image ({}): {}",
                kind.mime_type(),
                reference
            ));
        }

        image::load_from_memory(&bytes)
            .with_context(|| format!("failed to decode image: {}", reference))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let cache_path = self
            .cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{:x}", md5::compute(url))));

        if let Some(path) = &cache_path {
            if path.exists() {
                debug!("image cache hit: {}", url);
                return fs::read(path)
                    .with_context(|| format!("failed to read cached image: {}", path.display()));
            }
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch image: {}", url))?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "failed to fetch image: {} (status {})",
                url,
                response.status()
            ));
        }
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read image bytes: {}", url))?
            .to_vec();

        if let Some(path) = &cache_path {
            // Cache writes are best-effort; a full disk must not fail the card.
            if let Err(err) = store_cache_entry(path, &bytes) {
                warn!("failed to cache image {}: {}", url, err);
            }
        }
        Ok(bytes)
    }
}

/// Tempfile in the cache directory, then persist under the digest name. An
/// interrupted write must never leave a truncated entry that later runs would
/// read back as a cache hit.
fn store_cache_entry(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow!("cache path has no parent: {}", path.display()))?;
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create cache directory: {}", dir.display()))?;
    let file = tempfile::Builder::new()
        .prefix(".fetch-")
        .tempfile_in(dir)
        .with_context(|| format!("failed to create tempfile in {}", dir.display()))?;
    fs::write(file.path(), bytes)
        .with_context(|| format!("failed to write cache entry: {}", path.display()))?;
    file.persist(path)
        .with_context(|| format!("failed to persist cache entry: {}", path.display()))?;
    Ok(())
}

fn is_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[tokio::test]
    async fn loads_a_local_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        RgbaImage::from_pixel(6, 4, Rgba([1, 2, 3, 255]))
            .save(&path)
            .unwrap();

        let fetcher = ImageFetcher::new(None);
        let image = fetcher.load(path.to_str().unwrap()).await.unwrap();
        assert_eq!((image.width(), image.height()), (6, 4));
    }

    #[tokio::test]
    async fn rejects_non_image_payloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.json");
        std::fs::write(&path, b"%PDF-1.4 not a picture").unwrap();

        let fetcher = ImageFetcher::new(None);
        let err = fetcher.load(path.to_str().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("not an image"));
    }

    #[tokio::test]
    async fn missing_local_file_is_an_error() {
        let fetcher = ImageFetcher::new(None);
        let err = fetcher.load("/nonexistent/photo.jpg").await.unwrap_err();
        assert!(err.to_string().contains("failed to read image"));
    }

    #[test]
    fn cache_entry_lands_under_the_digest_name_with_no_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join(format!("{:x}", md5::compute("u")));
        store_cache_entry(&path, b"image-bytes").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"image-bytes");
        // No stray tempfiles next to the entry.
        assert_eq!(
            std::fs::read_dir(path.parent().unwrap()).unwrap().count(),
            1
        );
    }
}
