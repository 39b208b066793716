//! Image transforms applied to fundus images and lesion maps before batching.
//!
//! Transforms operate on [`DynamicImage`] and are chained with [`Compose`].
//! The final conversion to raw `f32` data ([`ImageArray`]) scales pixel
//! values to `[0, 1]` and keeps the HWC layout; batchers permute to CHW when
//! building tensors.

use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// A deterministic image-to-image transform.
///
/// Implementors must be `Send + Sync` because datasets are shared with the
/// data loader's worker threads.
pub trait ImageTransform: Send + Sync {
    fn apply(&self, image: DynamicImage) -> DynamicImage;
}

impl<F> ImageTransform for F
where
    F: Fn(DynamicImage) -> DynamicImage + Send + Sync,
{
    fn apply(&self, image: DynamicImage) -> DynamicImage {
        self(image)
    }
}

/// Applies a sequence of transforms in order.
#[derive(Default)]
pub struct Compose {
    steps: Vec<Box<dyn ImageTransform>>,
}

impl Compose {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transform to the chain.
    pub fn then(mut self, step: impl ImageTransform + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl ImageTransform for Compose {
    fn apply(&self, image: DynamicImage) -> DynamicImage {
        self.steps.iter().fold(image, |image, step| step.apply(image))
    }
}

/// Center-crops an image to a square whose side is its shorter edge.
#[derive(Debug, Clone, Copy, Default)]
pub struct CropShortEdge;

impl ImageTransform for CropShortEdge {
    fn apply(&self, image: DynamicImage) -> DynamicImage {
        let (width, height) = image.dimensions();
        let side = width.min(height);
        let x = (width - side) / 2;
        let y = (height - side) / 2;
        image.crop_imm(x, y, side, side)
    }
}

/// Resizes so the shorter edge equals `size`, preserving aspect ratio.
#[derive(Debug, Clone, Copy)]
pub struct Resize {
    pub size: u32,
    pub filter: FilterType,
}

impl Resize {
    /// Bilinear resize, the usual choice for fundus images.
    pub const fn new(size: u32) -> Self {
        Self {
            size,
            filter: FilterType::Triangle,
        }
    }

    /// Nearest-neighbour resize, which keeps label values intact.
    pub const fn nearest(size: u32) -> Self {
        Self {
            size,
            filter: FilterType::Nearest,
        }
    }

    fn target_dims(&self, width: u32, height: u32) -> (u32, u32) {
        if width <= height {
            let scaled = (u64::from(height) * u64::from(self.size) / u64::from(width.max(1))) as u32;
            (self.size, scaled.max(1))
        } else {
            let scaled = (u64::from(width) * u64::from(self.size) / u64::from(height.max(1))) as u32;
            (scaled.max(1), self.size)
        }
    }
}

impl ImageTransform for Resize {
    fn apply(&self, image: DynamicImage) -> DynamicImage {
        let (width, height) = image.dimensions();
        let (new_width, new_height) = self.target_dims(width, height);
        if (new_width, new_height) == (width, height) {
            return image;
        }
        image.resize_exact(new_width, new_height, self.filter)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HorizontalFlip;

impl ImageTransform for HorizontalFlip {
    fn apply(&self, image: DynamicImage) -> DynamicImage {
        image.fliph()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VerticalFlip;

impl ImageTransform for VerticalFlip {
    fn apply(&self, image: DynamicImage) -> DynamicImage {
        image.flipv()
    }
}

/// Raw pixel data scaled to `[0, 1]`, stored HWC.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageArray {
    pub data: Vec<f32>,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl ImageArray {
    pub const fn shape(&self) -> [usize; 3] {
        [self.height, self.width, self.channels]
    }
}

/// Converts an image to three-channel `[0, 1]` data.
pub fn to_rgb_array(image: &DynamicImage) -> ImageArray {
    let rgb = image.to_rgb32f();
    let (width, height) = rgb.dimensions();
    ImageArray {
        data: rgb.into_raw(),
        channels: 3,
        height: height as usize,
        width: width as usize,
    }
}

/// Converts an image to single-channel `[0, 1]` data.
///
/// Lesion label maps are stored as 8-bit class indices, so a stored value
/// `k` becomes `k / 255`.
pub fn to_luma_array(image: &DynamicImage) -> ImageArray {
    let luma = image.to_luma32f();
    let (width, height) = luma.dimensions();
    ImageArray {
        data: luma.into_raw(),
        channels: 1,
        height: height as usize,
        width: width as usize,
    }
}
