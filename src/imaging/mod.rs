//! Image pixel handling
//!
//! This module handles:
//! - Validating user-supplied image locators (local files, URLs)
//! - Fetching and decoding images from their source
//! - Right-angle rotation and mirroring of loaded images

pub mod loader;
pub mod source;
pub mod transform;
