//! The experiment container and its image-data interface
//!
//! Images travel embedded in the experiment that owns them. Every
//! operation here takes the experiment by reference and hands back an
//! updated copy, so other holders of the original never observe a change.
//! Copies share pixel buffers, so this stays cheap with images loaded.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use super::data::{ImageRecord, Raster};
use super::library::ImageTable;
use super::selector::Selector;
use crate::error::{ImageError, Result};
use crate::imaging::loader::Fetcher;
use crate::imaging::transform::Axis;
use crate::lifecycle::{self, AddImage, OneOrMany};

/// A batch load that stopped part-way.
///
/// `container` holds every image loaded before the failure, so successful
/// work is not lost; `error` is the failure that stopped the batch.
#[derive(Debug)]
pub struct LoadFailure<C> {
    pub container: C,
    pub error: ImageError,
}

impl<C> LoadFailure<C> {
    pub fn into_error(self) -> ImageError {
        self.error
    }
}

impl<C> fmt::Display for LoadFailure<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "load stopped: {}", self.error)
    }
}

impl<C: fmt::Debug> std::error::Error for LoadFailure<C> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Anything that carries an image table for a set of samples.
///
/// Implementors provide the three accessors; the image operations come for free.
pub trait ImageContainer: Clone {
    /// Samples images may be attached to
    fn known_sample_ids(&self) -> &[String];

    fn img_data(&self) -> &ImageTable;

    fn set_img_data(&mut self, table: ImageTable);

    /// Copy of this container with a different image table
    fn with_img_data(&self, table: ImageTable) -> Self {
        let mut next = self.clone();
        next.set_img_data(table);
        next
    }

    fn get_img(&self, sample_id: impl Into<Selector>, image_id: impl Into<Selector>) -> Result<OneOrMany<&ImageRecord>> {
        lifecycle::get_img(self.img_data(), &sample_id.into(), &image_id.into())
    }

    fn img_raster(
        &self,
        sample_id: impl Into<Selector>,
        image_id: impl Into<Selector>,
    ) -> Result<OneOrMany<Option<Raster>>> {
        lifecycle::img_raster(self.img_data(), &sample_id.into(), &image_id.into())
    }

    fn image_path(
        &self,
        sample_id: impl Into<Selector>,
        image_id: impl Into<Selector>,
    ) -> Result<OneOrMany<Option<PathBuf>>> {
        lifecycle::image_path(self.img_data(), &sample_id.into(), &image_id.into())
    }

    fn image_url(
        &self,
        sample_id: impl Into<Selector>,
        image_id: impl Into<Selector>,
    ) -> Result<OneOrMany<Option<String>>> {
        lifecycle::image_url(self.img_data(), &sample_id.into(), &image_id.into())
    }

    fn img_source(
        &self,
        sample_id: impl Into<Selector>,
        image_id: impl Into<Selector>,
    ) -> Result<OneOrMany<Option<String>>> {
        lifecycle::img_source(self.img_data(), &sample_id.into(), &image_id.into())
    }

    fn scale_factors(&self, sample_id: impl Into<Selector>, image_id: impl Into<Selector>) -> Result<Vec<Option<f64>>> {
        lifecycle::scale_factors(self.img_data(), &sample_id.into(), &image_id.into())
    }

    /// Load matching images. On failure the partially loaded container is
    /// returned inside the error.
    fn load_img<F: Fetcher + ?Sized>(
        &self,
        sample_id: impl Into<Selector>,
        image_id: impl Into<Selector>,
        fetcher: &F,
    ) -> std::result::Result<Self, LoadFailure<Self>> {
        let mut table = self.img_data().clone();
        match lifecycle::load(&mut table, &sample_id.into(), &image_id.into(), fetcher) {
            Ok(_) => Ok(self.with_img_data(table)),
            Err(error) => Err(LoadFailure {
                container: self.with_img_data(table),
                error,
            }),
        }
    }

    fn unload_img(&self, sample_id: impl Into<Selector>, image_id: impl Into<Selector>) -> Result<Self> {
        let mut table = self.img_data().clone();
        lifecycle::unload(&mut table, &sample_id.into(), &image_id.into())?;
        Ok(self.with_img_data(table))
    }

    fn add_img<F: Fetcher + ?Sized>(&self, request: &AddImage, fetcher: &F) -> Result<Self> {
        let mut table = self.img_data().clone();
        lifecycle::add(&mut table, self.known_sample_ids(), request, fetcher)?;
        Ok(self.with_img_data(table))
    }

    fn rmv_img(&self, sample_id: impl Into<Selector>, image_id: impl Into<Selector>) -> Result<Self> {
        let mut table = self.img_data().clone();
        lifecycle::remove(&mut table, &sample_id.into(), &image_id.into())?;
        Ok(self.with_img_data(table))
    }

    fn rotate_img<F: Fetcher + ?Sized>(
        &self,
        sample_id: impl Into<Selector>,
        image_id: impl Into<Selector>,
        degrees: i32,
        fetcher: &F,
    ) -> Result<Self> {
        let mut table = self.img_data().clone();
        lifecycle::rotate(&mut table, &sample_id.into(), &image_id.into(), degrees, fetcher)?;
        Ok(self.with_img_data(table))
    }

    fn mirror_img<F: Fetcher + ?Sized>(
        &self,
        sample_id: impl Into<Selector>,
        image_id: impl Into<Selector>,
        axis: Axis,
        fetcher: &F,
    ) -> Result<Self> {
        let mut table = self.img_data().clone();
        lifecycle::mirror(&mut table, &sample_id.into(), &image_id.into(), axis, fetcher)?;
        Ok(self.with_img_data(table))
    }
}

/// A spatial experiment as far as images are concerned: the samples it
/// measured and the images attached to them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredExperiment", into = "StoredExperiment")]
pub struct SpatialExperiment {
    sample_ids: Vec<String>,
    img_data: ImageTable,
}

/// On-disk shape of an experiment; converted through `new`/`with_images`
/// so a stored file cannot bypass the sample checks
#[derive(Serialize, Deserialize)]
struct StoredExperiment {
    sample_ids: Vec<String>,
    #[serde(default)]
    img_data: ImageTable,
}

impl TryFrom<StoredExperiment> for SpatialExperiment {
    type Error = ImageError;

    fn try_from(stored: StoredExperiment) -> Result<Self> {
        SpatialExperiment::new(stored.sample_ids).with_images(stored.img_data)
    }
}

impl From<SpatialExperiment> for StoredExperiment {
    fn from(spe: SpatialExperiment) -> Self {
        Self {
            sample_ids: spe.sample_ids,
            img_data: spe.img_data,
        }
    }
}

impl SpatialExperiment {
    /// Create an experiment with no images. Repeated sample ids are kept once.
    pub fn new<I, S>(sample_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<String> = Vec::new();
        for id in sample_ids {
            let id = id.into();
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Self {
            sample_ids: ids,
            img_data: ImageTable::new(),
        }
    }

    /// Attach a table produced elsewhere. Every image must belong to a known sample.
    pub fn with_images(mut self, table: ImageTable) -> Result<Self> {
        if let Some(row) = table.iter().find(|row| !self.sample_ids.contains(&row.sample_id)) {
            return Err(ImageError::invalid_argument(
                "sample_id",
                format!("'{}' is not a sample of this experiment", row.sample_id),
            ));
        }
        self.img_data = table;
        Ok(self)
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }
}

impl ImageContainer for SpatialExperiment {
    fn known_sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    fn img_data(&self) -> &ImageTable {
        &self.img_data
    }

    fn set_img_data(&mut self, table: ImageTable) {
        self.img_data = table;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::loader::testing::MockFetcher;
    use crate::state::data::{ImageRow, ImageSource};

    fn experiment() -> SpatialExperiment {
        let fetcher = MockFetcher::default();
        SpatialExperiment::new(["s1", "s2"])
            .add_img(&AddImage::new("http://example.com/s1_lowres.png", "s1", "lowres"), &fetcher)
            .unwrap()
            .add_img(
                &AddImage::new("http://example.com/s1_hires.png", "s1", "hires").with_load(false),
                &fetcher,
            )
            .unwrap()
    }

    #[test]
    fn test_new_dedupes_samples() {
        let spe = SpatialExperiment::new(["s1", "s2", "s1"]);
        assert_eq!(spe.sample_ids(), ["s1", "s2"]);
        assert!(spe.img_data().is_empty());
    }

    #[test]
    fn test_operations_leave_original_untouched() {
        let spe = experiment();
        let fetcher = MockFetcher::default();

        let loaded = spe.load_img("s1", "hires", &fetcher).unwrap();
        assert!(loaded.img_raster("s1", "hires").unwrap().single().unwrap().is_some());
        assert!(spe.img_raster("s1", "hires").unwrap().single().unwrap().is_none());

        let removed = spe.rmv_img("s1", true).unwrap();
        assert!(removed.img_data().is_empty());
        assert_eq!(spe.img_data().len(), 2);
    }

    #[test]
    fn test_unload_all() {
        let spe = experiment().unload_img(true, true).unwrap();
        let rasters = spe.img_raster("s1", true).unwrap().into_vec();
        assert!(rasters.iter().all(Option::is_none));
        assert_eq!(spe.image_url("s1", "lowres").unwrap().single().unwrap().as_deref(), Some("http://example.com/s1_lowres.png"));
    }

    #[test]
    fn test_add_img_requires_known_sample() {
        let result = experiment().add_img(
            &AddImage::new("http://example.com/x.png", "s3", "lowres"),
            &MockFetcher::default(),
        );
        assert!(matches!(result, Err(ImageError::InvalidArgument { .. })));
    }

    #[test]
    fn test_load_failure_keeps_partial_progress() {
        let fetcher = MockFetcher::default();
        let spe = SpatialExperiment::new(["s1"])
            .add_img(&AddImage::new("http://example.com/a.png", "s1", "a").with_load(false), &fetcher)
            .unwrap()
            .add_img(&AddImage::new("http://example.com/broken.png", "s1", "b").with_load(false), &fetcher)
            .unwrap();

        let failure = spe.load_img("s1", true, &fetcher).unwrap_err();
        assert!(matches!(failure.error, ImageError::Fetch { .. }));

        let rasters = failure.container.img_raster("s1", true).unwrap().into_vec();
        assert!(rasters[0].is_some());
        assert!(rasters[1].is_none());
    }

    #[test]
    fn test_defaults_pick_first_image() {
        let spe = experiment();
        let first = spe.get_img(None::<&str>, None::<&str>).unwrap().single().unwrap();
        assert_eq!(first.source(), &ImageSource::RemoteUrl("http://example.com/s1_lowres.png".to_string()));
    }

    #[test]
    fn test_rotate_and_mirror_return_new_values() {
        let spe = experiment();
        let fetcher = MockFetcher::default();

        let rotated = spe.rotate_img("s1", "lowres", 180, &fetcher).unwrap();
        assert_eq!(rotated.img_source("s1", "lowres").unwrap(), OneOrMany::One(None));
        assert!(spe.img_source("s1", "lowres").unwrap().single().unwrap().is_some());

        let mirrored = spe.mirror_img("s1", "hires", Axis::Horizontal, &fetcher).unwrap();
        assert!(mirrored.img_raster("s1", "hires").unwrap().single().unwrap().is_some());
    }

    #[test]
    fn test_with_images_checks_samples() {
        let source = ImageSource::RemoteUrl("http://example.com/x.png".to_string());
        let table = ImageTable::from_rows(vec![ImageRow::new(
            "other",
            "lowres",
            ImageRecord::from_source(source, None).unwrap(),
        )])
        .unwrap();

        assert!(SpatialExperiment::new(["s1"]).with_images(table.clone()).is_err());
        assert!(SpatialExperiment::new(["other"]).with_images(table).is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let spe = experiment().unload_img(true, true).unwrap();
        let json = serde_json::to_string(&spe).unwrap();
        let restored: SpatialExperiment = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, spe);
    }

    #[test]
    fn test_json_rejects_unknown_sample() {
        let json = r#"{
            "sample_ids": ["s1"],
            "img_data": [
                {"sample_id": "s9", "image_id": "lowres",
                 "record": {"source": {"remote_url": "http://example.com/x.png"}, "scale_factor": null}}
            ]
        }"#;
        let result: std::result::Result<SpatialExperiment, _> = serde_json::from_str(json);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("s9"), "unexpected error: {err}");
    }

    #[test]
    fn test_json_dedupes_samples() {
        let json = r#"{"sample_ids": ["s1", "s1", "s2"], "img_data": []}"#;
        let spe: SpatialExperiment = serde_json::from_str(json).unwrap();
        assert_eq!(spe.sample_ids(), ["s1", "s2"]);
    }

    #[test]
    fn test_scale_factors_across_samples() {
        let fetcher = MockFetcher::default();
        let spe = experiment()
            .add_img(
                &AddImage::new("http://example.com/s2.png", "s2", "lowres")
                    .with_scale_factor(0.25)
                    .with_load(false),
                &fetcher,
            )
            .unwrap();

        assert_eq!(spe.scale_factors(true, "lowres").unwrap(), vec![None, Some(0.25)]);
    }
}
