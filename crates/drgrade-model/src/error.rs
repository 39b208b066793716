use std::path::PathBuf;

use drgrade_data::DatasetError;
use thiserror::Error;

/// Errors raised while building, loading or running the grade classifier.
#[derive(Error, Debug)]
pub enum ModelError {
    /// The requested ResNet depth has no block layout.
    #[error("Unsupported ResNet depth: {depth} (supported: 18, 34, 50, 101, 152)")]
    UnsupportedDepth {
        /// The requested depth.
        depth: usize,
    },

    /// The weight file does not exist.
    #[error("Weight file not found: {path}")]
    WeightFileNotFound {
        /// The missing file.
        path: PathBuf,
    },

    /// The weight file extension is not a known format.
    #[error("Unsupported weight file format: {path} (expected .pth, .pt or .mpk)")]
    UnsupportedFormat {
        /// The weight file.
        path: PathBuf,
    },

    /// The recorder failed to read the weights.
    #[error("Failed to load weights from {path}: {reason}")]
    WeightLoadFailed {
        /// The weight file.
        path: PathBuf,
        /// The recorder's error message.
        reason: String,
    },

    /// The recorder failed to write the weights.
    #[error("Failed to save weights to {path}: {reason}")]
    WeightSaveFailed {
        /// The output file.
        path: PathBuf,
        /// The recorder's error message.
        reason: String,
    },

    /// Opening or decoding an input image failed.
    #[error("Failed to open image: {path}")]
    ImageOpenFailed {
        /// The image file.
        path: PathBuf,
        /// The underlying image error.
        #[source]
        source: image::ImageError,
    },

    /// The classifier produced a class index that is not a grade.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// A specialized `Result` type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;
