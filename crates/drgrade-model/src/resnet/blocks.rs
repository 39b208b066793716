//! Residual blocks following the torchvision ResNet layout.
//!
//! Field names match torchvision's `state_dict` keys (`conv1`, `bn1`, ...)
//! so checkpoints import with only the sequential-index remaps in
//! [`crate::weights`].

use core::f64::consts::SQRT_2;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
    },
    prelude::*,
};

/// Channel expansion of bottleneck blocks.
pub const BOTTLENECK_EXPANSION: usize = 4;

/// Bias-free square convolution with "same" padding and Kaiming
/// initialisation, as torchvision builds them.
pub(crate) fn conv<B: Backend>(
    channels: [usize; 2],
    kernel: usize,
    stride: usize,
    device: &Device<B>,
) -> Conv2d<B> {
    let padding = kernel / 2;
    Conv2dConfig::new(channels, [kernel, kernel])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
        .with_initializer(Initializer::KaimingNormal {
            gain: SQRT_2,
            fan_out_only: true,
        })
        .init(device)
}

/// A basic (two 3x3 convs) or bottleneck (1x1, 3x3, 1x1) residual block.
///
/// Bottleneck blocks carry `conv3`/`bn3` and put the stride on the 3x3
/// convolution (ResNet v1.5, as torchvision does).
#[derive(Module, Debug)]
pub struct ResidualBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    conv3: Option<Conv2d<B>>,
    bn3: Option<BatchNorm<B, 2>>,
    relu: Relu,
    downsample: Option<Downsample<B>>,
}

impl<B: Backend> ResidualBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let out = self.relu.forward(self.bn1.forward(self.conv1.forward(input)));
        let mut out = self.bn2.forward(self.conv2.forward(out));

        if let (Some(conv3), Some(bn3)) = (&self.conv3, &self.bn3) {
            out = bn3.forward(conv3.forward(self.relu.forward(out)));
        }

        self.relu.forward(out + identity)
    }

    /// Two 3x3 convolutions; the first carries the stride.
    pub fn basic(in_channels: usize, out_channels: usize, stride: usize, device: &Device<B>) -> Self {
        Self {
            conv1: conv([in_channels, out_channels], 3, stride, device),
            bn1: BatchNormConfig::new(out_channels).init(device),
            conv2: conv([out_channels, out_channels], 3, 1, device),
            bn2: BatchNormConfig::new(out_channels).init(device),
            conv3: None,
            bn3: None,
            relu: Relu::new(),
            downsample: Downsample::when_needed(in_channels, out_channels, stride, device),
        }
    }

    /// 1x1 reduce, strided 3x3, 1x1 expand to `out_channels`.
    pub fn bottleneck(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        device: &Device<B>,
    ) -> Self {
        let width = out_channels / BOTTLENECK_EXPANSION;
        Self {
            conv1: conv([in_channels, width], 1, 1, device),
            bn1: BatchNormConfig::new(width).init(device),
            conv2: conv([width, width], 3, stride, device),
            bn2: BatchNormConfig::new(width).init(device),
            conv3: Some(conv([width, out_channels], 1, 1, device)),
            bn3: Some(BatchNormConfig::new(out_channels).init(device)),
            relu: Relu::new(),
            downsample: Downsample::when_needed(in_channels, out_channels, stride, device),
        }
    }
}

/// 1x1 projection of the shortcut when resolution or width changes.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(input))
    }

    fn when_needed(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        device: &Device<B>,
    ) -> Option<Self> {
        (stride != 1 || in_channels != out_channels).then(|| Self {
            conv: conv([in_channels, out_channels], 1, stride, device),
            bn: BatchNormConfig::new(out_channels).init(device),
        })
    }
}

/// One ResNet stage (`layer1`..`layer4`).
#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> LayerBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks
            .iter()
            .fold(input, |out, block| block.forward(out))
    }

    /// A stage of `num_blocks` blocks; only the first one strides.
    pub fn new(
        num_blocks: usize,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        bottleneck: bool,
        device: &Device<B>,
    ) -> Self {
        let make = |in_channels, stride| {
            if bottleneck {
                ResidualBlock::bottleneck(in_channels, out_channels, stride, device)
            } else {
                ResidualBlock::basic(in_channels, out_channels, stride, device)
            }
        };

        let blocks = (0..num_blocks)
            .map(|b| {
                if b == 0 {
                    make(in_channels, stride)
                } else {
                    make(out_channels, 1)
                }
            })
            .collect();

        Self { blocks }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use super::*;

    type TestBackend = NdArray<f32>;

    #[test]
    fn basic_block_keeps_shape_without_stride() {
        let device = Default::default();
        let block = ResidualBlock::<TestBackend>::basic(16, 16, 1, &device);

        let out = block.forward(Tensor::zeros([1, 16, 8, 8], &device));

        assert_eq!(out.dims(), [1, 16, 8, 8]);
        assert!(block.downsample.is_none());
    }

    #[test]
    fn bottleneck_block_projects_and_strides() {
        let device = Default::default();
        let block = ResidualBlock::<TestBackend>::bottleneck(16, 64, 2, &device);

        let out = block.forward(Tensor::ones([1, 16, 8, 8], &device));

        assert_eq!(out.dims(), [1, 64, 4, 4]);
        assert!(block.conv3.is_some());
        assert!(block.downsample.is_some());
    }

    #[test]
    fn layer_block_strides_only_in_first_block() {
        let device = Default::default();
        let layer = LayerBlock::<TestBackend>::new(3, 8, 16, 2, false, &device);

        let out = layer.forward(Tensor::zeros([2, 8, 16, 16], &device));

        assert_eq!(layer.len(), 3);
        assert_eq!(out.dims(), [2, 16, 8, 8]);
    }
}
