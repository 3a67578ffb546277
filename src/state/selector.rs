//! Sample/image selection
//!
//! Lifecycle operations address images through a pair of selectors, one
//! for the sample id and one for the image id. Each selector either names
//! a value, matches everything, or is left unspecified, in which case the
//! first value present in the table is used.

use std::fmt;

use super::library::ImageTable;
use crate::error::{ImageError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selector {
    /// Only rows carrying exactly this value
    Named(String),
    /// Every value present
    All,
    /// The first value encountered in table order
    #[default]
    Unspecified,
}

impl Selector {
    pub fn named(value: impl Into<String>) -> Self {
        Selector::Named(value.into())
    }

    /// Keep the candidate positions whose field (read by `field`) satisfies this selector
    fn filter<'t>(&self, candidates: Vec<usize>, field: impl Fn(usize) -> &'t str) -> Vec<usize> {
        match self {
            Selector::All => candidates,
            Selector::Named(value) => candidates.into_iter().filter(|&pos| field(pos) == value.as_str()).collect(),
            Selector::Unspecified => {
                let Some(&first) = candidates.first() else {
                    return candidates;
                };
                let first = field(first);
                candidates.into_iter().filter(|&pos| field(pos) == first).collect()
            }
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Named(value) => f.write_str(value),
            Selector::All => f.write_str("<all>"),
            Selector::Unspecified => f.write_str("<first>"),
        }
    }
}

impl From<&str> for Selector {
    fn from(value: &str) -> Self {
        Selector::Named(value.to_string())
    }
}

impl From<String> for Selector {
    fn from(value: String) -> Self {
        Selector::Named(value)
    }
}

impl From<&String> for Selector {
    fn from(value: &String) -> Self {
        Selector::Named(value.clone())
    }
}

/// `true` selects everything, `false` behaves as unspecified
impl From<bool> for Selector {
    fn from(all: bool) -> Self {
        if all {
            Selector::All
        } else {
            Selector::Unspecified
        }
    }
}

impl<T: Into<Selector>> From<Option<T>> for Selector {
    fn from(value: Option<T>) -> Self {
        value.map_or(Selector::Unspecified, Into::into)
    }
}

/// Resolve a selector pair against a table.
///
/// The sample selector is applied first, then the image selector on the
/// surviving rows. Returns matching positions in table order; multiple
/// matches are not an error. Fails with `NotFound` when nothing matches.
pub fn resolve(table: &ImageTable, sample_id: &Selector, image_id: &Selector) -> Result<Vec<usize>> {
    let rows = table.rows();
    let all: Vec<usize> = (0..rows.len()).collect();

    let by_sample = sample_id.filter(all, |pos| rows[pos].sample_id.as_str());
    let positions = image_id.filter(by_sample, |pos| rows[pos].image_id.as_str());

    if positions.is_empty() {
        return Err(ImageError::NotFound {
            sample_id: sample_id.to_string(),
            image_id: image_id.to_string(),
        });
    }

    Ok(positions)
}
