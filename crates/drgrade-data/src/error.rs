//! Error types for dataset assembly and sample loading.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for dataset operations in drgrade-data.
///
/// Covers reading the per-dataset CSVs and directory trees, validating
/// grades and filenames, splitting, and loading copy-paste samples.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Error when reading a directory fails.
    #[error("Failed to read directory: {path}")]
    DirectoryReadFailed {
        /// The directory path that failed to read.
        path: PathBuf,
        /// The underlying walk error.
        #[source]
        source: walkdir::Error,
    },

    /// Error when a directory the layout depends on is missing.
    #[error("Directory not found: {path}")]
    DirectoryNotFound {
        /// The expected directory path.
        path: PathBuf,
    },

    /// Error when creating an output file or directory fails.
    #[error("Failed to write: {path}")]
    WriteFailed {
        /// The output path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Error when reading or writing a CSV file fails.
    #[error("CSV error in {path}")]
    Csv {
        /// The CSV file path.
        path: PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// Error when a CSV row does not have the expected shape.
    #[error("Malformed row {row} in {path}: {reason}")]
    MalformedRow {
        /// The CSV file path.
        path: PathBuf,
        /// Zero-based data row number.
        row: usize,
        /// What was wrong with the row.
        reason: String,
    },

    /// Error when a grade falls outside 0..=4.
    #[error("Grade {value} is outside the range 0..=4")]
    InvalidGrade {
        /// The rejected value.
        value: i64,
    },

    /// Error when a source tag is not one of the known datasets.
    #[error("Unknown dataset source: {tag}")]
    UnknownSource {
        /// The rejected tag.
        tag: String,
    },

    /// Error when an FGADR filename does not carry a grader digit.
    #[error("FGADR filename {file} has no grader digit at offset {offset}")]
    MissingGraderDigit {
        /// The offending filename.
        file: String,
        /// Character offset that was inspected.
        offset: usize,
    },

    /// Error when a copy-paste filename does not encode a grade.
    #[error("Copy-paste filename {path} does not encode a grade at offset {offset}")]
    InvalidCopyPasteName {
        /// The offending file.
        path: PathBuf,
        /// Character offset of the grade digit within the stem.
        offset: usize,
    },

    /// Error when more samples are requested than exist.
    #[error("Requested {requested} samples but only {available} are available")]
    SampleSizeTooLarge {
        /// Number of samples requested.
        requested: usize,
        /// Number of samples found.
        available: usize,
    },

    /// Error when a split fraction is unusable.
    #[error("Invalid train size {train_size}: {reason}")]
    InvalidSplit {
        /// The requested train fraction.
        train_size: f64,
        /// Why the split cannot be made.
        reason: String,
    },

    /// Error when a sample index is out of bounds.
    #[error("Sample index {index} out of bounds for dataset of length {len}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The dataset length.
        len: usize,
    },

    /// Error when opening or decoding an image file fails.
    #[error("Failed to open image: {path}")]
    ImageOpenFailed {
        /// The image file path that failed to open.
        path: PathBuf,
        /// The underlying image processing error.
        #[source]
        source: image::ImageError,
    },

    /// Error when a file has no stem (filename without extension).
    #[error("File has no stem: {path}")]
    NoFileStem {
        /// The file path without a stem.
        path: PathBuf,
    },

    /// Error when path components contain invalid UTF-8.
    #[error("Path contains invalid UTF-8: {path}")]
    InvalidUtf8Path {
        /// The path with invalid UTF-8.
        path: PathBuf,
    },

    /// Error raised by a grade oracle that cannot grade an image.
    #[error("Failed to grade {path}: {reason}")]
    GradingFailed {
        /// The image being graded.
        path: PathBuf,
        /// The reason reported by the oracle.
        reason: String,
    },
}

/// A specialized `Result` type for dataset operations.
pub type DatasetResult<T> = Result<T, DatasetError>;
