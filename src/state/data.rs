//! Shared data structures for image data
//!
//! These structs represent the data model stored in an experiment's
//! image table: where an image comes from, whether its pixels are
//! currently held in memory, and how spatial coordinates map onto it.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ImageError, Result};

/// Decoded pixel data held in memory.
///
/// Shared behind an `Arc` so that copying a table (or the experiment that
/// owns it) never duplicates pixel buffers.
pub type Raster = Arc<DynamicImage>;

/// Where an image's pixels can be (re)read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// Image file on the local file system
    LocalPath(PathBuf),
    /// Image reachable over http(s)
    RemoteUrl(String),
    /// Image supplied purely as in-memory data.
    /// Never serialized: a stored table cannot recreate the pixels.
    #[serde(skip)]
    Unsourced,
}

impl ImageSource {
    /// Local path, if this source is a file
    pub fn path(&self) -> Option<&Path> {
        match self {
            ImageSource::LocalPath(path) => Some(path),
            _ => None,
        }
    }

    /// URL, if this source is remote
    pub fn url(&self) -> Option<&str> {
        match self {
            ImageSource::RemoteUrl(url) => Some(url),
            _ => None,
        }
    }

    /// Human-readable locator used in logs and errors
    pub fn locator(&self) -> String {
        match self {
            ImageSource::LocalPath(path) => path.display().to_string(),
            ImageSource::RemoteUrl(url) => url.clone(),
            ImageSource::Unsourced => "<in-memory>".to_string(),
        }
    }
}

/// A single image: its source, its (optional) loaded pixels and its scale factor.
///
/// Invariant: a record with an `Unsourced` source always holds a raster.
/// The constructors are the only way to build one, so an image with neither
/// a source nor pixels cannot exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    source: ImageSource,
    #[serde(skip)]
    raster: Option<Raster>,
    /// Multiplier from spatial coordinate units to this image's pixels
    scale_factor: Option<f64>,
}

impl ImageRecord {
    /// Create an unloaded record backed by a file or URL
    pub fn from_source(source: ImageSource, scale_factor: Option<f64>) -> Result<Self> {
        if source == ImageSource::Unsourced {
            return Err(ImageError::InvalidSource(
                "an image without a source must be created from a raster".to_string(),
            ));
        }
        Ok(Self {
            source,
            raster: None,
            scale_factor,
        })
    }

    /// Create a record from pixels only (no backing file)
    pub fn in_memory(raster: impl Into<Raster>, scale_factor: Option<f64>) -> Self {
        Self {
            source: ImageSource::Unsourced,
            raster: Some(raster.into()),
            scale_factor,
        }
    }

    /// Create a record that is backed by a source and already loaded
    pub fn loaded(source: ImageSource, raster: impl Into<Raster>, scale_factor: Option<f64>) -> Self {
        Self {
            source,
            raster: Some(raster.into()),
            scale_factor,
        }
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn raster(&self) -> Option<&Raster> {
        self.raster.as_ref()
    }

    pub fn scale_factor(&self) -> Option<f64> {
        self.scale_factor
    }

    pub fn is_loaded(&self) -> bool {
        self.raster.is_some()
    }

    /// Attach pixels, keeping source and scale factor
    pub(crate) fn set_raster(&mut self, raster: Raster) {
        self.raster = Some(raster);
    }

    /// Drop the pixels. Returns `false` (and keeps them) when the record
    /// has no source to reload from.
    pub(crate) fn clear_raster(&mut self) -> bool {
        if self.source == ImageSource::Unsourced {
            return false;
        }
        self.raster = None;
        true
    }

    /// Replace the pixels with a derived image that no longer matches the source
    pub(crate) fn replace_with_in_memory(&mut self, raster: Raster) {
        self.source = ImageSource::Unsourced;
        self.raster = Some(raster);
    }
}

/// One entry of an image table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRow {
    pub sample_id: String,
    pub image_id: String,
    pub record: ImageRecord,
}

impl ImageRow {
    pub fn new(sample_id: impl Into<String>, image_id: impl Into<String>, record: ImageRecord) -> Self {
        Self {
            sample_id: sample_id.into(),
            image_id: image_id.into(),
            record,
        }
    }

    /// True when this row carries the given identifier pair
    pub fn matches(&self, sample_id: &str, image_id: &str) -> bool {
        self.sample_id == sample_id && self.image_id == image_id
    }
}
