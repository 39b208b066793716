use std::path::{Path, PathBuf};

use crate::{
    error::{DatasetError, DatasetResult},
    record::{DatasetLayout, DatasetRecord, Grade, Source},
};

/// Character offset of the grader digit in FGADR filenames.
pub const FGADR_GRADER_OFFSET: usize = 5;

/// The grader whose annotations are coarser than the rest of FGADR.
const COARSE_GRADER: u32 = 1;

/// Where the pieces of FGADR live.
///
/// Images and the grading CSV are taken from the original download, since
/// preprocessing does not touch them; label and instance maps come from the
/// processed directory.
#[derive(Debug, Clone)]
pub struct FgadrPaths {
    pub layout: DatasetLayout,
    pub grading_csv: PathBuf,
}

impl FgadrPaths {
    pub fn new(original_dir: impl AsRef<Path>, processed_dir: impl AsRef<Path>) -> Self {
        let original_dir = original_dir.as_ref();
        let processed_dir = processed_dir.as_ref();

        Self {
            layout: DatasetLayout::new(
                original_dir.join("Original_Images"),
                processed_dir.join(DatasetLayout::LABEL_SUBDIR),
                processed_dir.join(DatasetLayout::INSTANCE_SUBDIR),
            ),
            grading_csv: original_dir.join("DR_Seg_Grading_Label.csv"),
        }
    }
}

/// Loads FGADR records from its headerless `File,Grade` grading CSV.
///
/// With `exclude_grader_1`, images annotated by grader 1 (digit at
/// [`FGADR_GRADER_OFFSET`] of the filename) are dropped. Surviving records
/// keep their CSV row number as index.
pub fn load_fgadr(
    original_dir: impl AsRef<Path>,
    processed_dir: impl AsRef<Path>,
    exclude_grader_1: bool,
) -> DatasetResult<Vec<DatasetRecord>> {
    let paths = FgadrPaths::new(original_dir, processed_dir);
    let csv_path = &paths.grading_csv;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(csv_path)
        .map_err(|source| DatasetError::Csv {
            path: csv_path.clone(),
            source,
        })?;

    let mut records = Vec::new();
    let mut excluded = 0usize;

    for (row, result) in reader.records().enumerate() {
        let fields = result.map_err(|source| DatasetError::Csv {
            path: csv_path.clone(),
            source,
        })?;

        let malformed = |reason: String| DatasetError::MalformedRow {
            path: csv_path.clone(),
            row,
            reason,
        };

        let (file, grade) = match (fields.get(0), fields.get(1)) {
            (Some(file), Some(grade)) if fields.len() == 2 => (file, grade),
            _ => return Err(malformed(format!("expected 2 fields, got {}", fields.len()))),
        };
        let grade = grade
            .parse::<i64>()
            .map_err(|e| malformed(format!("grade {grade:?}: {e}")))
            .and_then(Grade::try_from)?;

        if exclude_grader_1 && grader_of(file)? == COARSE_GRADER {
            excluded += 1;
            continue;
        }

        records.push(paths.layout.record(row, file, grade, Source::Fgadr));
    }

    tracing::debug!(
        csv = %csv_path.display(),
        kept = records.len(),
        excluded,
        "loaded FGADR grading labels",
    );

    Ok(records)
}

fn grader_of(file: &str) -> DatasetResult<u32> {
    file.chars()
        .nth(FGADR_GRADER_OFFSET)
        .and_then(|c| c.to_digit(10))
        .ok_or_else(|| DatasetError::MissingGraderDigit {
            file: file.to_string(),
            offset: FGADR_GRADER_OFFSET,
        })
}
