//! Loading and saving classifier weights.
//!
//! PyTorch checkpoints (`.pth`/`.pt`) are read with burn-import and their
//! torchvision keys remapped onto [`crate::ResNetClassifier`]; Burn's own
//! MessagePack records (`.mpk`) round-trip through [`NamedMpkFileRecorder`].

use std::path::{Path, PathBuf};

use burn::{
    module::Module,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::Backend,
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};

use crate::{
    error::{ModelError, ModelResult},
    resnet::ResNetClassifier,
};

/// On-disk weight formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightFormat {
    PyTorch,
    MessagePack,
}

impl WeightFormat {
    /// Picks the format from the file extension.
    pub fn from_path(path: &Path) -> ModelResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("pth" | "pt") => Ok(Self::PyTorch),
            Some("mpk") => Ok(Self::MessagePack),
            _ => Err(ModelError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Loads the weights at `path` into `model`.
///
/// # Errors
///
/// Fails when the file is missing, its extension is not a known format,
/// or the recorder rejects its contents.
pub fn load_weights<B: Backend>(
    model: ResNetClassifier<B>,
    path: impl AsRef<Path>,
    device: &B::Device,
) -> ModelResult<ResNetClassifier<B>> {
    let path = path.as_ref();
    let format = WeightFormat::from_path(path)?;
    if !path.exists() {
        return Err(ModelError::WeightFileNotFound {
            path: path.to_path_buf(),
        });
    }

    tracing::info!(path = %path.display(), ?format, "loading classifier weights");

    match format {
        WeightFormat::PyTorch => load_pytorch(model, path, device),
        WeightFormat::MessagePack => model
            .load_file(path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new(), device)
            .map_err(|e| ModelError::WeightLoadFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }),
    }
}

/// Regex remaps from torchvision `ResNet` keys to [`ResNetClassifier`] fields,
/// applied in order.
pub const TORCHVISION_KEY_REMAPS: [(&str, &str); 4] = [
    // DataParallel checkpoints
    ("^module\\.(.+)", "$1"),
    // torchvision `downsample` is a Sequential(conv, bn)
    (
        "(layer[1-4])\\.([0-9]+)\\.downsample\\.0\\.(.+)",
        "$1.blocks.$2.downsample.conv.$3",
    ),
    (
        "(layer[1-4])\\.([0-9]+)\\.downsample\\.1\\.(.+)",
        "$1.blocks.$2.downsample.bn.$3",
    ),
    // Stages are Sequentials of blocks
    (
        "(layer[1-4])\\.([0-9]+)\\.(conv[1-3]|bn[1-3])\\.(.+)",
        "$1.blocks.$2.$3.$4",
    ),
];

fn load_pytorch<B: Backend>(
    model: ResNetClassifier<B>,
    path: &Path,
    device: &B::Device,
) -> ModelResult<ResNetClassifier<B>> {
    let load_args = TORCHVISION_KEY_REMAPS
        .iter()
        .fold(LoadArgs::new(path.to_path_buf()), |args, (pattern, replacement)| {
            args.with_key_remap(pattern, replacement)
        });

    let record = PyTorchFileRecorder::<FullPrecisionSettings>::default()
        .load(load_args, device)
        .map_err(|e| ModelError::WeightLoadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(model.load_record(record))
}

/// Saves `model` as a named MessagePack record and returns the written path.
///
/// The recorder always writes the `.mpk` extension.
pub fn save_weights<B: Backend>(
    model: ResNetClassifier<B>,
    path: impl AsRef<Path>,
) -> ModelResult<PathBuf> {
    let path = path.as_ref().with_extension("mpk");
    model
        .save_file(&path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
        .map_err(|e| ModelError::WeightSaveFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;

    tracing::info!(path = %path.display(), "saved classifier weights");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use burn::{backend::NdArray, tensor::Tensor};
    use regex::Regex;

    use crate::resnet::ResNetConfig;

    use super::*;

    type TestBackend = NdArray<f32>;

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            WeightFormat::from_path(Path::new("model_latest.pth")).unwrap(),
            WeightFormat::PyTorch
        );
        assert_eq!(
            WeightFormat::from_path(Path::new("m.pt")).unwrap(),
            WeightFormat::PyTorch
        );
        assert_eq!(
            WeightFormat::from_path(Path::new("m.mpk")).unwrap(),
            WeightFormat::MessagePack
        );
        assert!(matches!(
            WeightFormat::from_path(Path::new("m.onnx")),
            Err(ModelError::UnsupportedFormat { .. })
        ));
        assert!(WeightFormat::from_path(Path::new("weights")).is_err());
    }

    #[test]
    fn missing_file_is_reported() {
        let device = Default::default();
        let model = ResNetConfig::new()
            .with_depth(18)
            .init::<TestBackend>(&device)
            .unwrap();

        let result = load_weights(model, "/nonexistent/model_latest.pth", &device);

        assert!(matches!(result, Err(ModelError::WeightFileNotFound { .. })));
    }

    fn remap(key: &str) -> String {
        TORCHVISION_KEY_REMAPS
            .iter()
            .fold(key.to_string(), |key, (pattern, replacement)| {
                Regex::new(pattern)
                    .unwrap()
                    .replace_all(&key, *replacement)
                    .into_owned()
            })
    }

    #[test]
    fn torchvision_keys_map_onto_module_fields() {
        assert_eq!(remap("conv1.weight"), "conv1.weight");
        assert_eq!(remap("bn1.running_mean"), "bn1.running_mean");
        assert_eq!(remap("fc.bias"), "fc.bias");
        assert_eq!(
            remap("layer1.0.conv1.weight"),
            "layer1.blocks.0.conv1.weight"
        );
        assert_eq!(
            remap("layer3.12.bn3.running_var"),
            "layer3.blocks.12.bn3.running_var"
        );
        assert_eq!(
            remap("layer2.0.downsample.0.weight"),
            "layer2.blocks.0.downsample.conv.weight"
        );
        assert_eq!(
            remap("layer4.0.downsample.1.bias"),
            "layer4.blocks.0.downsample.bn.bias"
        );
    }

    #[test]
    fn data_parallel_prefix_is_stripped() {
        assert_eq!(
            remap("module.layer1.1.conv2.weight"),
            "layer1.blocks.1.conv2.weight"
        );
        assert_eq!(remap("module.fc.weight"), "fc.weight");
    }

    #[test]
    fn saved_weights_load_into_a_fresh_model() {
        let tmp = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = ResNetConfig::new().with_depth(18).with_num_classes(5);
        let model = config.init::<TestBackend>(&device).unwrap();
        let input = Tensor::<TestBackend, 4>::ones([1, 3, 32, 32], &device);
        let expected = model.forward(input.clone());

        let path = save_weights(model, tmp.path().join("resnet18")).unwrap();
        assert_eq!(path.extension().unwrap(), "mpk");

        let fresh = config.init::<TestBackend>(&device).unwrap();
        let loaded = load_weights(fresh, &path, &device).unwrap();

        let actual = loaded.forward(input).into_data().to_vec::<f32>().unwrap();
        let expected = expected.into_data().to_vec::<f32>().unwrap();
        for (a, e) in actual.iter().zip(&expected) {
            assert!((a - e).abs() < 1e-5, "{actual:?} != {expected:?}");
        }
    }
}
