//! State management module
//!
//! This module holds the image data attached to an experiment:
//! - Image records and their sources (data.rs)
//! - The ordered image table (library.rs)
//! - Sample/image selection (selector.rs)
//! - The experiment container that owns the table (experiment.rs)

pub mod data;
pub mod experiment;
pub mod library;
pub mod selector;
