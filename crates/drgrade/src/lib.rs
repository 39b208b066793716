//! `drgrade`: dataset preparation for diabetic-retinopathy grading.
//!
//! Ties the dataset loaders of [`drgrade_data`] and the grade classifier of
//! [`drgrade_model`] into the `split` pipeline and the `drgrade` binary.

pub mod backend;
pub mod inspect;
pub mod logging;
pub mod split;

#[doc(inline)]
pub use backend::burn_backend_types;
#[doc(inline)]
pub use drgrade_data as data;
#[doc(inline)]
pub use drgrade_model as model;
pub use inspect::{inspect_copy_paste, CopyPasteReport};
pub use logging::init_logging;
pub use split::{run_split, SplitConfig, SplitSummary};
