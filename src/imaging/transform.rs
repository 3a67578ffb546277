//! Raster transforms
//!
//! Right-angle rotations and mirroring of decoded images. These never
//! resample, so pixel values are preserved exactly.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ImageError, Result};
use crate::state::data::Raster;

/// Axis to mirror an image across
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Across the horizontal axis: top and bottom swap
    Horizontal,
    /// Across the vertical axis: left and right swap
    Vertical,
}

/// Rotate by a multiple of 90 degrees.
/// Positive values rotate clockwise, negative values counter-clockwise.
pub fn rotate(raster: &DynamicImage, degrees: i32) -> Result<Raster> {
    if degrees % 90 != 0 {
        return Err(ImageError::invalid_argument(
            "degrees",
            format!("{} is not a multiple of 90", degrees),
        ));
    }

    let rotated = match degrees.rem_euclid(360) {
        90 => raster.rotate90(),
        180 => raster.rotate180(),
        270 => raster.rotate270(),
        _ => raster.clone(),
    };
    Ok(Arc::new(rotated))
}

pub fn mirror(raster: &DynamicImage, axis: Axis) -> Raster {
    let mirrored = match axis {
        Axis::Horizontal => raster.flipv(),
        Axis::Vertical => raster.fliph(),
    };
    Arc::new(mirrored)
}
