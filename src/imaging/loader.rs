//! Image fetcher
//!
//! This module reads image pixels from a record's source: local files are
//! decoded directly, remote images are downloaded into the cache directory
//! first and decoded from there. The decoded image is returned as a shared
//! raster that is attached to the record.

use image::{DynamicImage, ImageReader};
use reqwest::blocking::Client;
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task;
use tracing::{debug, info, warn};

use crate::config::FetchConfig;
use crate::error::{ImageError, Result};
use crate::state::data::{ImageSource, Raster};

/// Capability that turns a source into decoded pixels.
///
/// Lifecycle operations only talk to this trait, so tests and hosts can
/// plug in their own retrieval.
pub trait Fetcher {
    fn fetch(&self, source: &ImageSource) -> Result<Raster>;
}

/// Fetcher backed by the `image` crate and a blocking HTTP client
#[derive(Debug, Clone, Default)]
pub struct DefaultFetcher {
    config: FetchConfig,
}

impl DefaultFetcher {
    pub fn new(config: FetchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Decode a local image file
    fn fetch_local(&self, path: &Path) -> Result<Raster> {
        if !path.exists() {
            return Err(ImageError::fetch(
                path.display().to_string(),
                "file not found",
            ));
        }

        let img = decode_file(path).map_err(|reason| ImageError::fetch(path.display().to_string(), reason))?;
        debug!(path = %path.display(), width = img.width(), height = img.height(), "decoded image");
        Ok(Arc::new(img))
    }

    /// Download (or reuse a cached download of) a remote image and decode it
    fn fetch_remote(&self, url: &str) -> Result<Raster> {
        let cached = self.cache_path(url)?;

        if !cached.exists() {
            self.download(url, &cached)?;
        } else {
            debug!(url, path = %cached.display(), "using cached download");
        }

        match decode_file(&cached) {
            Ok(img) => Ok(Arc::new(img)),
            Err(reason) => {
                // Drop the undecodable download so a retry fetches it again
                if let Err(e) = fs::remove_file(&cached) {
                    warn!(path = %cached.display(), error = %e, "could not discard cached download");
                }
                Err(ImageError::fetch(url, reason))
            }
        }
    }

    fn download(&self, url: &str, target: &Path) -> Result<()> {
        let client = Client::builder()
            .user_agent(self.config.user_agent.clone())
            .timeout(self.config.timeout())
            .build()
            .map_err(|e| ImageError::fetch(url, e))?;

        let bytes = client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .and_then(|response| response.bytes())
            .map_err(|e| ImageError::fetch(url, e))?;

        // Write next to the target and rename so a failed download never leaves a partial file
        let partial = target.with_extension("part");
        fs::write(&partial, &bytes)?;
        fs::rename(&partial, target)?;

        info!(url, bytes = bytes.len(), path = %target.display(), "downloaded remote image");
        Ok(())
    }

    /// Cache location for a URL: `<hash>-<file name>`
    fn cache_path(&self, url: &str) -> Result<PathBuf> {
        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);

        let file_name = url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .unwrap_or("image");

        let dir = self.config.resolved_cache_dir()?;
        Ok(dir.join(format!("{:016x}-{}", hasher.finish(), file_name)))
    }
}

impl Fetcher for DefaultFetcher {
    fn fetch(&self, source: &ImageSource) -> Result<Raster> {
        match source {
            ImageSource::LocalPath(path) => self.fetch_local(path),
            ImageSource::RemoteUrl(url) => self.fetch_remote(url),
            ImageSource::Unsourced => Err(ImageError::SourceUnavailable(source.locator())),
        }
    }
}

/// Decode an image file, detecting the format from its contents rather
/// than its extension (remote downloads often have none)
fn decode_file(path: &Path) -> std::result::Result<DynamicImage, String> {
    ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| e.to_string())?
        .decode()
        .map_err(|e| e.to_string())
}

/// Fetch on a blocking worker thread.
///
/// Decoding and downloads are blocking, so async hosts should go through
/// this instead of calling [`Fetcher::fetch`] on the runtime.
pub async fn fetch_async<F>(fetcher: Arc<F>, source: ImageSource) -> Result<Raster>
where
    F: Fetcher + Send + Sync + 'static,
{
    let locator = source.locator();
    task::spawn_blocking(move || fetcher.fetch(&source))
        .await
        .map_err(|e| ImageError::fetch(locator, format!("task join error: {}", e)))?
}


#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma};

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let img = GrayImage::from_pixel(4, 3, Luma([128]));
        DynamicImage::ImageLuma8(img).save(&path).unwrap();
        path
    }

    #[test]
    fn test_fetch_local_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "lowres.png");

        let fetcher = DefaultFetcher::default();
        let raster = fetcher.fetch(&ImageSource::LocalPath(path)).unwrap();

        assert_eq!((raster.width(), raster.height()), (4, 3));
    }

    #[test]
    fn test_fetch_missing_file() {
        let fetcher = DefaultFetcher::default();
        let result = fetcher.fetch(&ImageSource::LocalPath(PathBuf::from("/nonexistent/path.png")));
        assert!(matches!(result, Err(ImageError::Fetch { .. })));
    }

    #[test]
    fn test_fetch_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corrupt.png");
        std::fs::write(&path, b"definitely not a png").unwrap();

        let result = DefaultFetcher::default().fetch(&ImageSource::LocalPath(path));
        assert!(matches!(result, Err(ImageError::Fetch { .. })));
    }

    #[test]
    fn test_fetch_remote_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = DefaultFetcher::new(FetchConfig::new().with_cache_dir(dir.path()));
        let url = "https://example.invalid/outs/spatial/tissue_hires_image.png";

        // Seed the cache so no request is made
        let cached = fetcher.cache_path(url).unwrap();
        assert!(cached.to_string_lossy().ends_with("-tissue_hires_image.png"));
        DynamicImage::ImageLuma8(GrayImage::new(5, 5)).save(&cached).unwrap();

        let raster = fetcher.fetch(&ImageSource::RemoteUrl(url.to_string())).unwrap();
        assert_eq!(raster.width(), 5);
    }

    #[test]
    fn test_fetch_unsourced_fails() {
        let result = DefaultFetcher::default().fetch(&ImageSource::Unsourced);
        assert!(matches!(result, Err(ImageError::SourceUnavailable(_))));
    }

    #[test]
    fn test_fetch_remote_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = DefaultFetcher::new(FetchConfig::new().with_cache_dir(dir.path()));
        let url = "https://example.invalid/download?id=3";

        let cached = fetcher.cache_path(url).unwrap();
        assert!(cached.extension().is_none());
        let mut bytes = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(GrayImage::new(6, 2))
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();
        std::fs::write(&cached, bytes.into_inner()).unwrap();

        let raster = fetcher.fetch(&ImageSource::RemoteUrl(url.to_string())).unwrap();
        assert_eq!((raster.width(), raster.height()), (6, 2));
    }

    #[test]
    fn test_corrupt_download_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = DefaultFetcher::new(FetchConfig::new().with_cache_dir(dir.path()));
        let url = "http://127.0.0.1:9/img.png";

        let cached = fetcher.cache_path(url).unwrap();
        std::fs::write(&cached, b"<html>not found</html>").unwrap();

        let result = fetcher.fetch(&ImageSource::RemoteUrl(url.to_string()));
        assert!(matches!(result, Err(ImageError::Fetch { .. })));
        assert!(!cached.exists());
    }

    #[tokio::test]
    async fn test_fetch_async() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "hires.png");

        let fetcher = Arc::new(DefaultFetcher::default());
        let raster = fetch_async(fetcher.clone(), ImageSource::LocalPath(path)).await.unwrap();
        assert_eq!(raster.height(), 3);

        let missing = fetch_async(fetcher, ImageSource::LocalPath(PathBuf::from("/nonexistent/path.png"))).await;
        assert!(missing.is_err());
    }
}
