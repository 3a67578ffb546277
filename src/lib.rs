//! Image data for spatial single-cell experiments.
//!
//! An experiment carries an ordered table of images, each tagged with the
//! sample it belongs to and an image id (`lowres`, `hires`, ...). Images can
//! be file- or URL-backed and are loaded into memory only on request.
//!
//! ```no_run
//! use spatial_images::{AddImage, DefaultFetcher, ImageContainer, SpatialExperiment};
//!
//! # fn main() -> spatial_images::Result<()> {
//! let fetcher = DefaultFetcher::default();
//! let spe = SpatialExperiment::new(["section1"])
//!     .add_img(
//!         &AddImage::new("https://example.com/tissue_lowres_image.png", "section1", "lowres")
//!             .with_scale_factor(0.05)
//!             .with_load(false),
//!         &fetcher,
//!     )?;
//!
//! let spe = spe.load_img("section1", "lowres", &fetcher).map_err(|f| f.into_error())?;
//! let raster = spe.img_raster("section1", "lowres")?.single().flatten();
//! # let _ = raster;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod imaging;
pub mod lifecycle;
pub mod state;
pub mod visium;

pub use config::FetchConfig;
pub use error::{ImageError, Result};
pub use imaging::loader::{fetch_async, DefaultFetcher, Fetcher};
pub use imaging::transform::Axis;
pub use lifecycle::{AddImage, OneOrMany};
pub use state::data::{ImageRecord, ImageRow, ImageSource, Raster};
pub use state::experiment::{ImageContainer, LoadFailure, SpatialExperiment};
pub use state::library::ImageTable;
pub use state::selector::{resolve, Selector};
