use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::{
    error::{DatasetError, DatasetResult},
    grading::GradeOracle,
    record::{DatasetLayout, DatasetRecord, Source},
};

/// Lists every file below `dir`, recursively, sorted by file name.
///
/// Returned paths are relative to `dir`.
pub fn list_files(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DatasetError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| DatasetError::DirectoryReadFailed {
            path: dir.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(dir) {
            files.push(relative.to_path_buf());
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Loads IDRiD from its processed `img/label/inst` layout.
pub fn load_idrid(
    processed_dir: impl AsRef<Path>,
    oracle: impl GradeOracle,
) -> DatasetResult<Vec<DatasetRecord>> {
    load_processed(processed_dir.as_ref(), Source::Idrid, oracle)
}

/// Loads DIARETDB1 from its processed `img/label/inst` layout.
pub fn load_diaretdb1(
    processed_dir: impl AsRef<Path>,
    oracle: impl GradeOracle,
) -> DatasetResult<Vec<DatasetRecord>> {
    load_processed(processed_dir.as_ref(), Source::Diaretdb1, oracle)
}

fn load_processed(
    processed_dir: &Path,
    source: Source,
    mut oracle: impl GradeOracle,
) -> DatasetResult<Vec<DatasetRecord>> {
    let layout = DatasetLayout::processed(processed_dir);
    let files = list_files(&layout.image_dir)?;

    if files.is_empty() {
        tracing::warn!(
            dataset = %source,
            dir = %layout.image_dir.display(),
            "no images found",
        );
    }

    tracing::info!(
        dataset = %source,
        images = files.len(),
        oracle = oracle.name(),
        "grading images",
    );

    let mut records = Vec::with_capacity(files.len());
    for (index, relative) in files.iter().enumerate() {
        // Records are keyed by bare filename; label and instance maps share it.
        let file = relative
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| DatasetError::InvalidUtf8Path {
                path: relative.clone(),
            })?;

        let grade = oracle.grade(&layout.image_dir.join(relative))?;
        records.push(layout.record(index, file, grade, source));
    }

    Ok(records)
}
