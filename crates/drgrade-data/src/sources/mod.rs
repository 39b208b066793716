//! Loaders turning each public DR dataset into [`DatasetRecord`]s.
//!
//! FGADR ships its own grading CSV; IDRiD and DIARETDB1 are read from the
//! preprocessed `img/label/inst` layout and graded by a [`GradeOracle`].
//!
//! [`DatasetRecord`]: crate::record::DatasetRecord
//! [`GradeOracle`]: crate::grading::GradeOracle

mod fgadr;
mod folder;

pub use fgadr::{load_fgadr, FgadrPaths, FGADR_GRADER_OFFSET};
pub use folder::{list_files, load_diaretdb1, load_idrid};
