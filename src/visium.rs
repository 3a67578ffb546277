//! 10x Visium image reader
//!
//! Space Ranger writes the tissue images and their scale factors into a
//! `spatial/` folder of each sample's output directory. This module turns
//! that layout into image table rows.

use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::imaging::loader::Fetcher;
use crate::state::data::{ImageRecord, ImageRow, ImageSource};
use crate::state::experiment::SpatialExperiment;
use crate::state::library::ImageTable;

const SCALE_FACTORS_FILE: &str = "scalefactors_json.json";

/// Images Space Ranger can produce for a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisiumImage {
    Lowres,
    Hires,
    Detected,
    Aligned,
}

impl VisiumImage {
    pub const ALL: [VisiumImage; 4] = [
        VisiumImage::Lowres,
        VisiumImage::Hires,
        VisiumImage::Detected,
        VisiumImage::Aligned,
    ];

    /// Identifier used in the image table
    pub fn image_id(self) -> &'static str {
        match self {
            VisiumImage::Lowres => "lowres",
            VisiumImage::Hires => "hires",
            VisiumImage::Detected => "detected",
            VisiumImage::Aligned => "aligned",
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            VisiumImage::Lowres => "tissue_lowres_image.png",
            VisiumImage::Hires => "tissue_hires_image.png",
            VisiumImage::Detected => "detected_tissue_image.jpg",
            VisiumImage::Aligned => "aligned_fiducials.jpg",
        }
    }

    fn scale_factor(self, factors: &ScaleFactors) -> Option<f64> {
        match self {
            VisiumImage::Lowres => Some(factors.tissue_lowres_scalef),
            VisiumImage::Hires => Some(factors.tissue_hires_scalef),
            VisiumImage::Detected | VisiumImage::Aligned => None,
        }
    }
}

/// Contents of `scalefactors_json.json`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScaleFactors {
    pub tissue_hires_scalef: f64,
    pub tissue_lowres_scalef: f64,
    #[serde(default)]
    pub spot_diameter_fullres: Option<f64>,
    #[serde(default)]
    pub fiducial_diameter_fullres: Option<f64>,
}

/// Locate the `spatial/` folder of a sample directory (`outs/spatial` or `spatial`)
pub fn spatial_dir(sample_dir: &Path) -> Option<PathBuf> {
    [sample_dir.join("outs").join("spatial"), sample_dir.join("spatial")]
        .into_iter()
        .find(|dir| dir.is_dir())
}

pub fn read_scale_factors(spatial_dir: &Path) -> Result<ScaleFactors> {
    let json = fs::read_to_string(spatial_dir.join(SCALE_FACTORS_FILE))?;
    Ok(serde_json::from_str(&json)?)
}

/// Read the requested images of every sample into an image table.
///
/// Rows come out in sample order, then in the order of `images`. Image
/// files that are absent are skipped; a missing `spatial/` folder or
/// scale factor file is an error.
pub fn read_images<S, P, F>(samples: &[(S, P)], images: &[VisiumImage], load: bool, fetcher: &F) -> Result<ImageTable>
where
    S: AsRef<str>,
    P: AsRef<Path>,
    F: Fetcher + ?Sized,
{
    let mut table = ImageTable::new();

    for (sample_id, sample_dir) in samples {
        let sample_id = sample_id.as_ref();
        let sample_dir = sample_dir.as_ref();

        let spatial = spatial_dir(sample_dir).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no spatial folder in {}", sample_dir.display()),
            )
        })?;
        let factors = read_scale_factors(&spatial)?;
        debug!(sample_id, ?factors, "read scale factors");

        for &image in images {
            let path = spatial.join(image.file_name());
            if !path.is_file() {
                warn!(sample_id, image = image.image_id(), path = %path.display(), "image file missing, skipping");
                continue;
            }

            let source = ImageSource::LocalPath(path);
            let scale_factor = image.scale_factor(&factors);
            let record = if load {
                let raster = fetcher.fetch(&source)?;
                ImageRecord::loaded(source, raster, scale_factor)
            } else {
                ImageRecord::from_source(source, scale_factor)?
            };

            table.push(ImageRow::new(sample_id, image.image_id(), record))?;
        }
    }

    info!(samples = samples.len(), images = table.len(), "read Visium images");
    Ok(table)
}

/// Build an experiment whose samples are `samples` and whose images are read from their folders
pub fn read_experiment<S, P, F>(
    samples: &[(S, P)],
    images: &[VisiumImage],
    load: bool,
    fetcher: &F,
) -> Result<SpatialExperiment>
where
    S: AsRef<str>,
    P: AsRef<Path>,
    F: Fetcher + ?Sized,
{
    let table = read_images(samples, images, load, fetcher)?;
    SpatialExperiment::new(samples.iter().map(|(id, _)| id.as_ref().to_string())).with_images(table)
}
