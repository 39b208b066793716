//! Sanity check of a copy-paste generator output directory.

use std::{collections::BTreeSet, path::PathBuf};

use anyhow::{Context, Result};
use burn::data::dataset::Dataset;
use drgrade_data::{CopyPasteConfig, CopyPasteDataset, Grade};

/// What [`inspect_copy_paste`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyPasteReport {
    pub len: usize,
    pub grade_histogram: [usize; Grade::COUNT],
    pub filename: PathBuf,
    pub grade: Option<Grade>,
    /// Distinct lesion classes in the sample's label map, as stored (0-255).
    pub label_values: Vec<u8>,
}

/// Loads sample `index` and reports its label classes along with the
/// dataset size and grade distribution.
pub fn inspect_copy_paste(config: &CopyPasteConfig, index: usize) -> Result<CopyPasteReport> {
    let dataset = CopyPasteDataset::new(&config.clone().with_return_label(true))
        .with_context(|| format!("failed to open {}", config.label_dir.display()))?;

    let item = dataset
        .try_get(index)
        .with_context(|| format!("failed to load copy-paste sample {index}"))?;

    let label_values: BTreeSet<u8> = item
        .label
        .iter()
        .flat_map(|label| label.data.iter())
        .map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect();

    let report = CopyPasteReport {
        len: dataset.len(),
        grade_histogram: dataset.grade_histogram(),
        filename: item.filename,
        grade: item.grade,
        label_values: label_values.into_iter().collect(),
    };

    tracing::info!(
        samples = report.len,
        grades = ?report.grade_histogram,
        file = %report.filename.display(),
        labels = ?report.label_values,
        "inspected copy-paste sample",
    );
    Ok(report)
}
