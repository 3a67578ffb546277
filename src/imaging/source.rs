//! Validation of image locators
//!
//! An image may be added from an existing local image file or from a URL.
//! Anything else is rejected before a record is created.

use image::ImageFormat;
use reqwest::Url;
use std::path::{Path, PathBuf};

use crate::error::{ImageError, Result};
use crate::state::data::ImageSource;

/// URL schemes accepted for remote images
const URL_SCHEMES: [&str; 2] = ["http", "https"];

/// True if `path` is an existing file with an image extension we can decode
pub fn is_valid_local_path(path: &str) -> bool {
    let path = Path::new(path);
    path.is_file() && ImageFormat::from_path(path).is_ok()
}

/// True if `url` parses as an absolute http(s) URL with a host
pub fn is_valid_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => URL_SCHEMES.contains(&parsed.scheme()) && parsed.host_str().is_some(),
        Err(_) => false,
    }
}

/// Decide which kind of source a user-supplied locator is
pub fn classify(locator: &str) -> Result<ImageSource> {
    if is_valid_local_path(locator) {
        return Ok(ImageSource::LocalPath(PathBuf::from(locator)));
    }
    if is_valid_url(locator) {
        return Ok(ImageSource::RemoteUrl(locator.to_string()));
    }
    Err(ImageError::InvalidSource(format!(
        "'{}' is neither an existing image file nor a valid URL",
        locator
    )))
}
