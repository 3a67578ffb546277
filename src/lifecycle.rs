//! Image lifecycle operations
//!
//! Every operation addresses images through a `(sample_id, image_id)`
//! selector pair that is resolved against the table first. Accessors
//! return a single value when exactly one image matched and a sequence
//! otherwise. Mutating operations work on the caller's own table.

use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{ImageError, Result};
use crate::imaging::loader::Fetcher;
use crate::imaging::source;
use crate::imaging::transform::{self, Axis};
use crate::state::data::{ImageRecord, ImageRow, ImageSource, Raster};
use crate::state::library::ImageTable;
use crate::state::selector::{resolve, Selector};

/// A single result when one image matched, otherwise one entry per match in table order
#[derive(Debug, Clone, PartialEq)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn from_vec(mut values: Vec<T>) -> Self {
        if values.len() == 1 {
            if let Some(value) = values.pop() {
                return OneOrMany::One(value);
            }
        }
        OneOrMany::Many(values)
    }

    pub fn len(&self) -> usize {
        match self {
            OneOrMany::One(_) => 1,
            OneOrMany::Many(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value, if exactly one image matched
    pub fn single(self) -> Option<T> {
        match self {
            OneOrMany::One(value) => Some(value),
            OneOrMany::Many(_) => None,
        }
    }

    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// Parameters for adding an image
#[derive(Debug, Clone, PartialEq)]
pub struct AddImage {
    /// Path to an existing image file, or a URL
    pub image_source: String,
    /// NaN = unknown
    pub scale_factor: f64,
    pub sample_id: String,
    pub image_id: String,
    /// Decode the pixels immediately
    pub load: bool,
}

impl AddImage {
    pub fn new(image_source: impl Into<String>, sample_id: impl Into<String>, image_id: impl Into<String>) -> Self {
        Self {
            image_source: image_source.into(),
            scale_factor: f64::NAN,
            sample_id: sample_id.into(),
            image_id: image_id.into(),
            load: true,
        }
    }

    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_load(mut self, load: bool) -> Self {
        self.load = load;
        self
    }

    fn validate<S: AsRef<str>>(&self, known_samples: &[S]) -> Result<()> {
        if self.scale_factor.is_infinite() {
            return Err(ImageError::invalid_argument(
                "scale_factor",
                "must be a finite number or NaN",
            ));
        }
        if self.sample_id.is_empty() {
            return Err(ImageError::invalid_argument("sample_id", "must not be empty"));
        }
        if !known_samples.iter().any(|known| known.as_ref() == self.sample_id) {
            return Err(ImageError::invalid_argument(
                "sample_id",
                format!("'{}' is not a sample of this experiment", self.sample_id),
            ));
        }
        if self.image_id.is_empty() {
            return Err(ImageError::invalid_argument("image_id", "must not be empty"));
        }
        Ok(())
    }
}

fn collect<'t, T>(
    table: &'t ImageTable,
    sample_id: &Selector,
    image_id: &Selector,
    extract: impl Fn(&'t ImageRecord) -> T,
) -> Result<OneOrMany<T>> {
    let positions = resolve(table, sample_id, image_id)?;
    let values = positions
        .into_iter()
        .filter_map(|pos| table.get(pos))
        .map(|row| extract(&row.record))
        .collect();
    Ok(OneOrMany::from_vec(values))
}

/// Image records matching the selectors
pub fn get_img<'t>(
    table: &'t ImageTable,
    sample_id: &Selector,
    image_id: &Selector,
) -> Result<OneOrMany<&'t ImageRecord>> {
    collect(table, sample_id, image_id, |record| record)
}

/// Loaded pixels; `None` for images that are not currently loaded
pub fn img_raster(table: &ImageTable, sample_id: &Selector, image_id: &Selector) -> Result<OneOrMany<Option<Raster>>> {
    collect(table, sample_id, image_id, |record| record.raster().cloned())
}

/// Local file paths; `None` for remote or in-memory images
pub fn image_path(table: &ImageTable, sample_id: &Selector, image_id: &Selector) -> Result<OneOrMany<Option<PathBuf>>> {
    collect(table, sample_id, image_id, |record| {
        record.source().path().map(|path| path.to_path_buf())
    })
}

/// URLs; `None` for local or in-memory images
pub fn image_url(table: &ImageTable, sample_id: &Selector, image_id: &Selector) -> Result<OneOrMany<Option<String>>> {
    collect(table, sample_id, image_id, |record| record.source().url().map(str::to_string))
}

/// Path or URL, whichever the image was created from
pub fn img_source(table: &ImageTable, sample_id: &Selector, image_id: &Selector) -> Result<OneOrMany<Option<String>>> {
    collect(table, sample_id, image_id, |record| match record.source() {
        ImageSource::Unsourced => None,
        other => Some(other.locator()),
    })
}

/// Scale factors of the matching images, in table order
pub fn scale_factors(table: &ImageTable, sample_id: &Selector, image_id: &Selector) -> Result<Vec<Option<f64>>> {
    Ok(collect(table, sample_id, image_id, ImageRecord::scale_factor)?.into_vec())
}

/// Load pixels for every matching image that is not loaded yet.
///
/// Rows are processed in table order and the call stops at the first
/// failure: rows loaded earlier in the same call stay loaded, the failing
/// row is left untouched and later rows are not attempted. Calling again
/// with the same selectors resumes the batch, since loaded rows are skipped.
/// A row without a source fails with `SourceUnavailable` from the fetcher.
/// Returns the number of rows loaded.
pub fn load<F: Fetcher + ?Sized>(
    table: &mut ImageTable,
    sample_id: &Selector,
    image_id: &Selector,
    fetcher: &F,
) -> Result<usize> {
    let positions = resolve(table, sample_id, image_id)?;
    let mut loaded = 0;

    for pos in positions {
        let Some(row) = table.get(pos) else { continue };
        if row.record.is_loaded() {
            debug!(sample_id = %row.sample_id, image_id = %row.image_id, "already loaded, skipping");
            continue;
        }
        let raster = fetcher.fetch(row.record.source())?;
        info!(sample_id = %row.sample_id, image_id = %row.image_id, "loaded image");

        if let Some(record) = table.record_mut(pos) {
            record.set_raster(raster);
            loaded += 1;
        }
    }

    Ok(loaded)
}

/// Drop the pixels of every matching image, keeping source and scale factor.
///
/// Images that only exist in memory keep their pixels, since they could
/// not be loaded again. Returns the number of rows unloaded.
pub fn unload(table: &mut ImageTable, sample_id: &Selector, image_id: &Selector) -> Result<usize> {
    let positions = resolve(table, sample_id, image_id)?;
    let mut unloaded = 0;

    for pos in positions {
        let Some(record) = table.record_mut(pos) else { continue };
        if !record.is_loaded() {
            continue;
        }
        if record.clear_raster() {
            unloaded += 1;
        } else if let Some(row) = table.get(pos) {
            warn!(
                sample_id = %row.sample_id,
                image_id = %row.image_id,
                "image has no source, keeping it in memory"
            );
        }
    }

    info!(unloaded, "unloaded images");
    Ok(unloaded)
}

/// Add a new image for a known sample.
///
/// Either the new row is appended or the table is left unchanged.
pub fn add<S, F>(table: &mut ImageTable, known_samples: &[S], request: &AddImage, fetcher: &F) -> Result<()>
where
    S: AsRef<str>,
    F: Fetcher + ?Sized,
{
    request.validate(known_samples)?;
    let image_source = source::classify(&request.image_source)?;

    let sample = Selector::named(request.sample_id.as_str());
    let image = Selector::named(request.image_id.as_str());
    if resolve(table, &sample, &image).is_ok() {
        return Err(ImageError::DuplicateEntry {
            sample_id: request.sample_id.clone(),
            image_id: request.image_id.clone(),
        });
    }

    let scale_factor = (!request.scale_factor.is_nan()).then_some(request.scale_factor);
    let record = if request.load {
        let raster = fetcher.fetch(&image_source)?;
        ImageRecord::loaded(image_source, raster, scale_factor)
    } else {
        ImageRecord::from_source(image_source, scale_factor)?
    };

    table.push(ImageRow::new(request.sample_id.as_str(), request.image_id.as_str(), record))?;
    info!(sample_id = %request.sample_id, image_id = %request.image_id, "added image");
    Ok(())
}

/// Remove every matching image. Returns the removed rows.
pub fn remove(table: &mut ImageTable, sample_id: &Selector, image_id: &Selector) -> Result<Vec<ImageRow>> {
    let positions = resolve(table, sample_id, image_id)?;
    let removed = table.remove_positions(&positions);
    info!(count = removed.len(), "removed images");
    Ok(removed)
}

/// Compute a derived raster for every matching image, then store them all.
/// Unloaded images are fetched first. Nothing is written if any step fails.
fn apply_transform<F, T>(
    table: &mut ImageTable,
    sample_id: &Selector,
    image_id: &Selector,
    fetcher: &F,
    op: T,
) -> Result<usize>
where
    F: Fetcher + ?Sized,
    T: Fn(&Raster) -> Result<Raster>,
{
    let positions = resolve(table, sample_id, image_id)?;
    let mut derived = Vec::with_capacity(positions.len());

    for &pos in &positions {
        let Some(row) = table.get(pos) else { continue };
        let raster = match row.record.raster() {
            Some(raster) => raster.clone(),
            None => fetcher.fetch(row.record.source())?,
        };
        derived.push((pos, op(&raster)?));
    }

    let count = derived.len();
    for (pos, raster) in derived {
        if let Some(record) = table.record_mut(pos) {
            record.replace_with_in_memory(raster);
        }
    }
    Ok(count)
}

/// Rotate matching images by a multiple of 90 degrees (positive = clockwise).
/// The result only exists in memory.
pub fn rotate<F: Fetcher + ?Sized>(
    table: &mut ImageTable,
    sample_id: &Selector,
    image_id: &Selector,
    degrees: i32,
    fetcher: &F,
) -> Result<usize> {
    let count = apply_transform(table, sample_id, image_id, fetcher, |raster| transform::rotate(raster, degrees))?;
    info!(count, degrees, "rotated images");
    Ok(count)
}

/// Mirror matching images across an axis. The result only exists in memory.
pub fn mirror<F: Fetcher + ?Sized>(
    table: &mut ImageTable,
    sample_id: &Selector,
    image_id: &Selector,
    axis: Axis,
    fetcher: &F,
) -> Result<usize> {
    let count = apply_transform(table, sample_id, image_id, fetcher, |raster| Ok(transform::mirror(raster, axis)))?;
    info!(count, ?axis, "mirrored images");
    Ok(count)
}
