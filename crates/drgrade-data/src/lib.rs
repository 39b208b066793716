//! Dataset assembly for diabetic-retinopathy grading.
//!
//! Combines FGADR, IDRiD and DIARETDB1 into graded records with absolute
//! image, label and instance paths, splits them into train/test subsets and
//! writes the CSV files consumed by training. Also provides the copy-paste
//! dataset that serves synthesized lesion samples to a Burn data loader.

pub mod copy_paste;
pub mod csv_io;
pub mod error;
pub mod grading;
pub mod record;
pub mod sources;
pub mod split;
pub mod transform;

// Re-export commonly used types
pub use copy_paste::{
    CopyPasteBatch, CopyPasteBatcher, CopyPasteConfig, CopyPasteDataset, CopyPasteItem,
};
pub use csv_io::{read_records, write_records};
pub use error::{DatasetError, DatasetResult};
pub use grading::{GradeOracle, RandomGrades};
pub use record::{DatasetLayout, DatasetRecord, Grade, Source};
pub use sources::{load_diaretdb1, load_fgadr, load_idrid};
pub use split::train_test_split;
pub use transform::{Compose, CropShortEdge, ImageArray, ImageTransform, Resize};
