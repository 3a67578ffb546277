use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

use super::data::{ImageRecord, ImageRow, ImageSource};
use crate::error::{ImageError, Result};

/// The ImageTable is the ordered catalog of images attached to an experiment.
/// Each row is keyed by a `(sample_id, image_id)` pair that is unique
/// across the whole table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ImageRow>", into = "Vec<ImageRow>")]
pub struct ImageTable {
    rows: Vec<ImageRow>,
}

impl ImageTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from rows produced elsewhere (e.g. a platform reader).
    /// Fails if two rows share an identifier pair.
    pub fn from_rows(rows: Vec<ImageRow>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(rows.len());
        for row in &rows {
            if !seen.insert((row.sample_id.as_str(), row.image_id.as_str())) {
                return Err(ImageError::DuplicateEntry {
                    sample_id: row.sample_id.clone(),
                    image_id: row.image_id.clone(),
                });
            }
        }
        Ok(Self { rows })
    }

    /// Number of images in the table
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows in table order
    pub fn rows(&self) -> &[ImageRow] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ImageRow> {
        self.rows.iter()
    }

    /// Row at a position
    pub fn get(&self, position: usize) -> Option<&ImageRow> {
        self.rows.get(position)
    }

    pub(crate) fn record_mut(&mut self, position: usize) -> Option<&mut ImageRecord> {
        self.rows.get_mut(position).map(|row| &mut row.record)
    }

    /// True if a row with this identifier pair exists
    pub fn contains(&self, sample_id: &str, image_id: &str) -> bool {
        self.rows.iter().any(|row| row.matches(sample_id, image_id))
    }

    /// Distinct sample ids, in order of first appearance
    pub fn sample_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .map(|row| row.sample_id.as_str())
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Append a row, rejecting duplicate identifier pairs
    pub fn push(&mut self, row: ImageRow) -> Result<()> {
        if self.contains(&row.sample_id, &row.image_id) {
            return Err(ImageError::DuplicateEntry {
                sample_id: row.sample_id,
                image_id: row.image_id,
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Remove the rows at the given positions; survivors keep their relative order
    pub(crate) fn remove_positions(&mut self, positions: &[usize]) -> Vec<ImageRow> {
        let drop: HashSet<usize> = positions.iter().copied().collect();
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.rows)
            .into_iter()
            .enumerate()
            .partition(|(position, _)| drop.contains(position));
        self.rows = kept.into_iter().map(|(_, row)| row).collect();
        removed.into_iter().map(|(_, row)| row).collect()
    }

    /// Convert to JSON string for storage alongside the experiment.
    /// Pixels are not stored, and in-memory-only images cannot be stored.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse from JSON string. Every restored image starts unloaded.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Verify that file-backed images still exist on disk.
    /// Returns the identifier pairs whose file is missing.
    pub fn verify_sources(&self) -> Vec<(String, String)> {
        let missing: Vec<(String, String)> = self
            .rows
            .iter()
            .filter(|row| match row.record.source() {
                ImageSource::LocalPath(path) => !path.exists(),
                _ => false,
            })
            .map(|row| (row.sample_id.clone(), row.image_id.clone()))
            .collect();

        if !missing.is_empty() {
            warn!(count = missing.len(), "image files missing on disk");
        }

        missing
    }
}

impl TryFrom<Vec<ImageRow>> for ImageTable {
    type Error = ImageError;

    fn try_from(rows: Vec<ImageRow>) -> Result<Self> {
        Self::from_rows(rows)
    }
}

impl From<ImageTable> for Vec<ImageRow> {
    fn from(table: ImageTable) -> Self {
        table.rows
    }
}

impl<'a> IntoIterator for &'a ImageTable {
    type Item = &'a ImageRow;
    type IntoIter = std::slice::Iter<'a, ImageRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn file_row(sample: &str, image: &str) -> ImageRow {
        let source = ImageSource::LocalPath(PathBuf::from(format!("/data/{sample}/{image}.png")));
        ImageRow::new(sample, image, ImageRecord::from_source(source, Some(0.5)).unwrap())
    }

    #[test]
    fn test_push_rejects_duplicates() {
        let mut table = ImageTable::new();
        table.push(file_row("s1", "lowres")).unwrap();

        let result = table.push(file_row("s1", "lowres"));
        assert!(matches!(result, Err(ImageError::DuplicateEntry { .. })));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_from_rows_rejects_duplicates() {
        let rows = vec![file_row("s1", "lowres"), file_row("s2", "lowres"), file_row("s1", "lowres")];
        assert!(matches!(
            ImageTable::from_rows(rows),
            Err(ImageError::DuplicateEntry { .. })
        ));
    }

    #[test]
    fn test_remove_positions_preserves_order() {
        let mut table = ImageTable::from_rows(vec![
            file_row("s1", "a"),
            file_row("s1", "b"),
            file_row("s2", "a"),
            file_row("s2", "b"),
        ])
        .unwrap();

        let removed = table.remove_positions(&[0, 2]);
        assert_eq!(removed.len(), 2);

        let ids: Vec<_> = table.iter().map(|r| (r.sample_id.as_str(), r.image_id.as_str())).collect();
        assert_eq!(ids, vec![("s1", "b"), ("s2", "b")]);
    }

    #[test]
    fn test_sample_ids_in_first_seen_order() {
        let table = ImageTable::from_rows(vec![
            file_row("s2", "a"),
            file_row("s1", "a"),
            file_row("s2", "b"),
        ])
        .unwrap();
        assert_eq!(table.sample_ids(), vec!["s2", "s1"]);
    }

    #[test]
    fn test_json_drops_rasters() {
        let source = ImageSource::RemoteUrl("https://example.com/hires.png".to_string());
        let raster = Arc::new(DynamicImage::ImageLuma8(GrayImage::new(1, 1)));
        let mut table = ImageTable::new();
        table.push(file_row("s1", "lowres")).unwrap();
        table
            .push(ImageRow::new("s1", "hires", ImageRecord::loaded(source.clone(), raster, None)))
            .unwrap();

        let json = table.to_json().unwrap();
        let restored = ImageTable::from_json(&json).unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(restored.rows()[0], table.rows()[0]);
        assert_eq!(restored.rows()[1].record.source(), &source);
        assert!(!restored.rows()[1].record.is_loaded());
    }

    #[test]
    fn test_json_refuses_in_memory_images() {
        let raster = Arc::new(DynamicImage::ImageLuma8(GrayImage::new(1, 1)));
        let mut table = ImageTable::new();
        table
            .push(ImageRow::new("s1", "mem", ImageRecord::in_memory(raster, None)))
            .unwrap();

        assert!(matches!(table.to_json(), Err(ImageError::Json(_))));
    }

    #[test]
    fn test_from_json_checks_uniqueness() {
        let json = serde_json::to_string(&vec![file_row("s1", "a"), file_row("s1", "a")]).unwrap();
        assert!(ImageTable::from_json(&json).is_err());
    }

    #[test]
    fn test_verify_sources() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.png");
        std::fs::write(&present, b"not really a png").unwrap();

        let table = ImageTable::from_rows(vec![
            ImageRow::new(
                "s1",
                "present",
                ImageRecord::from_source(ImageSource::LocalPath(present), None).unwrap(),
            ),
            ImageRow::new(
                "s1",
                "gone",
                ImageRecord::from_source(ImageSource::LocalPath(dir.path().join("gone.png")), None).unwrap(),
            ),
        ])
        .unwrap();

        assert_eq!(table.verify_sources(), vec![("s1".to_string(), "gone".to_string())]);
    }
}
