//! ResNet grade classifier used to pseudo-label segmentation datasets.
//!
//! IDRiD and DIARETDB1 ship lesion masks but no DR grade. With
//! `--predict_grades` the split pipeline grades their images with a ResNet
//! trained on EyePACS; [`GradePredictor`] plugs that classifier into the
//! dataset loaders through [`drgrade_data::GradeOracle`].

pub mod error;
pub mod predictor;
pub mod resnet;
pub mod weights;

pub use error::{ModelError, ModelResult};
pub use predictor::{GradePredictor, PredictorConfig};
pub use resnet::{ResNetClassifier, ResNetConfig};
pub use weights::{load_weights, save_weights, WeightFormat};
