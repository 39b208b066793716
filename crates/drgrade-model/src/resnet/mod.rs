//! ResNet grade classifier.
//!
//! Mirrors torchvision's `ResNet` so that checkpoints trained with it
//! (e.g. the EyePACS grading model) load through [`crate::weights`].

use core::f64::consts::SQRT_2;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Initializer, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use crate::error::{ModelError, ModelResult};

mod blocks;
pub use blocks::*;

// Residual blocks per stage
const RESNET18_BLOCKS: [usize; 4] = [2, 2, 2, 2];
const RESNET34_BLOCKS: [usize; 4] = [3, 4, 6, 3];
const RESNET50_BLOCKS: [usize; 4] = [3, 4, 6, 3];
const RESNET101_BLOCKS: [usize; 4] = [3, 4, 23, 3];
const RESNET152_BLOCKS: [usize; 4] = [3, 8, 36, 3];

/// Configuration of a [`ResNetClassifier`].
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// One of 18, 34, 50, 101, 152.
    #[config(default = 50)]
    pub depth: usize,
    /// Number of output classes; one per DR grade.
    #[config(default = 5)]
    pub num_classes: usize,
}

impl ResNetConfig {
    /// Stage sizes and channel expansion for the configured depth.
    fn layout(&self) -> ModelResult<([usize; 4], usize)> {
        match self.depth {
            18 => Ok((RESNET18_BLOCKS, 1)),
            34 => Ok((RESNET34_BLOCKS, 1)),
            50 => Ok((RESNET50_BLOCKS, BOTTLENECK_EXPANSION)),
            101 => Ok((RESNET101_BLOCKS, BOTTLENECK_EXPANSION)),
            152 => Ok((RESNET152_BLOCKS, BOTTLENECK_EXPANSION)),
            depth => Err(ModelError::UnsupportedDepth { depth }),
        }
    }

    /// Builds a randomly initialised classifier.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ModelResult<ResNetClassifier<B>> {
        let (blocks, expansion) = self.layout()?;
        let bottleneck = expansion > 1;

        let conv1 = Conv2dConfig::new([3, 64], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .with_initializer(Initializer::KaimingNormal {
                gain: SQRT_2,
                fan_out_only: true,
            })
            .init(device);

        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let widths = [64, 128, 256, 512].map(|w| w * expansion);
        let layer1 = LayerBlock::new(blocks[0], 64, widths[0], 1, bottleneck, device);
        let layer2 = LayerBlock::new(blocks[1], widths[0], widths[1], 2, bottleneck, device);
        let layer3 = LayerBlock::new(blocks[2], widths[1], widths[2], 2, bottleneck, device);
        let layer4 = LayerBlock::new(blocks[3], widths[2], widths[3], 2, bottleneck, device);

        Ok(ResNetClassifier {
            conv1,
            bn1: BatchNormConfig::new(64).init(device),
            relu: Relu::new(),
            maxpool,
            layer1,
            layer2,
            layer3,
            layer4,
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(widths[3], self.num_classes).init(device),
        })
    }
}

/// ResNet with a linear classification head.
#[derive(Module, Debug)]
pub struct ResNetClassifier<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    maxpool: MaxPool2d,
    layer1: LayerBlock<B>,
    layer2: LayerBlock<B>,
    layer3: LayerBlock<B>,
    layer4: LayerBlock<B>,
    avgpool: AdaptiveAvgPool2d,
    fc: Linear<B>,
}

impl<B: Backend> ResNetClassifier<B> {
    /// Maps images `[batch, 3, H, W]` to class logits `[batch, num_classes]`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let out = self.conv1.forward(input);
        let out = self.relu.forward(self.bn1.forward(out));
        let out = self.maxpool.forward(out);

        let out = self.layer1.forward(out);
        let out = self.layer2.forward(out);
        let out = self.layer3.forward(out);
        let out = self.layer4.forward(out);

        let out = self.avgpool.forward(out);
        self.fc.forward(out.flatten::<2>(1, 3))
    }
}
