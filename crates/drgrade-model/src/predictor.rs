//! Pseudo-labeling of fundus images with a trained grade classifier.

use std::path::{Path, PathBuf};

use burn::{
    prelude::*,
    tensor::{activation::softmax, ElementConversion, TensorData},
};
use drgrade_data::{
    transform::{to_rgb_array, CropShortEdge, ImageTransform, Resize},
    DatasetError, DatasetResult, Grade, GradeOracle,
};
use image::DynamicImage;

use crate::{
    error::{ModelError, ModelResult},
    resnet::{ResNetClassifier, ResNetConfig},
    weights::load_weights,
};

/// Settings for [`GradePredictor`].
#[derive(Config, Debug)]
pub struct PredictorConfig {
    /// Side of the square network input after cropping and resizing.
    #[config(default = 512)]
    pub image_size: u32,
    /// Average softmax outputs over flipped copies of the input.
    #[config(default = false)]
    pub tta: bool,
    /// Number of flip variants when `tta` is on.
    #[config(default = 3)]
    pub tta_runs: usize,
    #[config(default = "ResNetConfig::new()")]
    pub model: ResNetConfig,
}

/// Assigns grades to images with a [`ResNetClassifier`].
pub struct GradePredictor<B: Backend> {
    model: ResNetClassifier<B>,
    config: PredictorConfig,
    device: B::Device,
}

impl<B: Backend> GradePredictor<B> {
    pub fn new(model: ResNetClassifier<B>, config: PredictorConfig, device: B::Device) -> Self {
        Self {
            model,
            config,
            device,
        }
    }

    /// Builds the classifier from `config.model` and loads `weights` into it.
    pub fn from_weights(
        config: PredictorConfig,
        weights: impl AsRef<Path>,
        device: B::Device,
    ) -> ModelResult<Self> {
        let model = config.model.init(&device)?;
        let model = load_weights(model, weights, &device)?;
        Ok(Self::new(model, config, device))
    }

    pub const fn config(&self) -> &PredictorConfig {
        &self.config
    }

    /// Crops to a centered square, resizes and scales to `[0, 1]`.
    ///
    /// Returns a `[1, 3, image_size, image_size]` tensor.
    pub fn preprocess(&self, image: DynamicImage) -> Tensor<B, 4> {
        let image = CropShortEdge.apply(image);
        let image = Resize::new(self.config.image_size).apply(image);
        let array = to_rgb_array(&image);
        let shape = array.shape();

        Tensor::<B, 3>::from_data(TensorData::new(array.data, shape), &self.device)
            .permute([2, 0, 1])
            .unsqueeze::<4>()
    }

    /// Class probabilities `[batch, num_classes]` for a preprocessed batch.
    ///
    /// With test-time augmentation the runs cycle through the identity,
    /// horizontal, vertical and double flips.
    pub fn probabilities(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        if !self.config.tta {
            return softmax(self.model.forward(input), 1);
        }

        let runs = self.config.tta_runs.max(1);
        let mut summed = softmax(self.model.forward(input.clone()), 1);
        for run in 1..runs {
            let variant = match run % 4 {
                0 => input.clone(),
                1 => input.clone().flip([3]),
                2 => input.clone().flip([2]),
                _ => input.clone().flip([2, 3]),
            };
            summed = summed + softmax(self.model.forward(variant), 1);
        }

        summed.div_scalar(runs as f32)
    }

    pub fn predict_image(&self, image: DynamicImage) -> ModelResult<Grade> {
        let input = self.preprocess(image);
        let class = self
            .probabilities(input)
            .argmax(1)
            .into_scalar()
            .elem::<i64>();
        Ok(Grade::try_from(class)?)
    }

    pub fn predict_path(&self, path: &Path) -> ModelResult<Grade> {
        let image = image::open(path).map_err(|source| ModelError::ImageOpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let grade = self.predict_image(image)?;
        tracing::debug!(path = %path.display(), %grade, "predicted grade");
        Ok(grade)
    }
}

impl<B: Backend> GradeOracle for GradePredictor<B> {
    fn grade(&mut self, image: &Path) -> DatasetResult<Grade> {
        self.predict_path(image).map_err(|e| match e {
            ModelError::Dataset(inner) => inner,
            other => DatasetError::GradingFailed {
                path: PathBuf::from(image),
                reason: other.to_string(),
            },
        })
    }

    fn name(&self) -> &'static str {
        "resnet"
    }
}
