//! Reading and writing the `all.csv`/`train.csv`/`test.csv` split files.
//!
//! Files carry a leading unnamed index column followed by
//! `Image, Label, Instance, Grade, Source`, which is the layout the training
//! code reads with the first column as row index.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{DatasetError, DatasetResult},
    record::{DatasetRecord, Grade, Source},
};

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    #[serde(rename = "")]
    index: usize,
    #[serde(rename = "Image")]
    image: PathBuf,
    #[serde(rename = "Label")]
    label: PathBuf,
    #[serde(rename = "Instance")]
    instance: PathBuf,
    #[serde(rename = "Grade")]
    grade: Grade,
    #[serde(rename = "Source")]
    source: Source,
}

impl From<&DatasetRecord> for CsvRow {
    fn from(record: &DatasetRecord) -> Self {
        Self {
            index: record.index,
            image: record.image.clone(),
            label: record.label.clone(),
            instance: record.instance.clone(),
            grade: record.grade,
            source: record.source,
        }
    }
}

/// Writes `records` to `path`, creating parent directories as needed.
pub fn write_records<'a>(
    path: impl AsRef<Path>,
    records: impl IntoIterator<Item = &'a DatasetRecord>,
) -> DatasetResult<usize> {
    let path = path.as_ref();
    let csv_err = |source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| DatasetError::WriteFailed {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    let mut written = 0;
    for record in records {
        writer.serialize(CsvRow::from(record)).map_err(csv_err)?;
        written += 1;
    }
    writer
        .flush()
        .map_err(|source| DatasetError::WriteFailed {
            path: path.to_path_buf(),
            source,
        })?;

    tracing::debug!(path = %path.display(), rows = written, "wrote split file");
    Ok(written)
}

/// Reads records previously written by [`write_records`].
///
/// The bare filename is recovered from the image path.
pub fn read_records(path: impl AsRef<Path>) -> DatasetResult<Vec<DatasetRecord>> {
    let path = path.as_ref();
    let csv_err = |source| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let mut records = Vec::new();

    for (row, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row_data = result.map_err(csv_err)?;
        let file = row_data
            .image
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| DatasetError::MalformedRow {
                path: path.to_path_buf(),
                row,
                reason: format!("image path {} has no file name", row_data.image.display()),
            })?
            .to_string();

        records.push(DatasetRecord {
            index: row_data.index,
            file,
            image: row_data.image,
            label: row_data.label,
            instance: row_data.instance,
            grade: row_data.grade,
            source: row_data.source,
        });
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use crate::record::DatasetLayout;

    use super::*;

    fn sample_records() -> Vec<DatasetRecord> {
        let fgadr = DatasetLayout::new("/fgadr/Original_Images", "/p/label", "/p/inst");
        let idrid = DatasetLayout::processed("/idrid");
        vec![
            fgadr.record(3, "0004_2.png", Grade::new(4).unwrap(), Source::Fgadr),
            idrid.record(0, "IDRiD_01.png", Grade::new(0).unwrap(), Source::Idrid),
        ]
    }

    #[test]
    fn writes_index_column_and_named_headers() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data/all.csv");

        let written = write_records(&path, &sample_records()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(written, 2);
        assert_eq!(lines[0], ",Image,Label,Instance,Grade,Source");
        assert_eq!(
            lines[1],
            "3,/fgadr/Original_Images/0004_2.png,/p/label/0004_2.png,/p/inst/0004_2.png,4,FGADR"
        );
        assert_eq!(
            lines[2],
            "0,/idrid/img/IDRiD_01.png,/idrid/label/IDRiD_01.png,/idrid/inst/IDRiD_01.png,0,IDRiD"
        );
    }

    #[test]
    fn read_back_matches_written_records() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("train.csv");
        let records = sample_records();

        write_records(&path, &records).unwrap();

        assert_eq!(read_records(&path).unwrap(), records);
    }

    #[test]
    fn read_rejects_out_of_range_grade() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.csv");
        fs::write(
            &path,
            ",Image,Label,Instance,Grade,Source\n0,/i/a.png,/l/a.png,/n/a.png,9,IDRiD\n",
        )
        .unwrap();

        assert!(matches!(
            read_records(&path),
            Err(DatasetError::Csv { .. })
        ));
    }
}
