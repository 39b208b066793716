//! Dataset of synthesized copy-paste samples.
//!
//! Copy-paste augmentation composites lesion patches from existing fundus
//! images onto other images. The generator writes three parallel
//! directories with identical filenames:
//!
//! - `transformed/`: the composited fundus image,
//! - `label/`: the lesion label map,
//! - `inst/`: the instance map.
//!
//! Filenames follow `copypaste_G_XXXXX.png`, where `G` is the DR grade of
//! the synthesized sample. The sample list is fixed when the dataset is
//! built; images are read from disk on every access.

use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
};

use burn::{
    config::Config,
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, Int, Tensor, TensorData},
};
use image::DynamicImage;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::{
    error::{DatasetError, DatasetResult},
    record::Grade,
    sources::list_files,
    transform::{to_luma_array, to_rgb_array, ImageArray, ImageTransform},
};

/// Character offset of the grade digit within a copy-paste file stem.
pub const COPY_PASTE_GRADE_OFFSET: usize = 10;

/// Configuration for [`CopyPasteDataset`].
#[derive(Config, Debug)]
pub struct CopyPasteConfig {
    /// Directory of composited fundus images.
    pub transformed_dir: PathBuf,
    /// Directory of lesion label maps; its listing defines the samples.
    pub label_dir: PathBuf,
    /// Directory of instance maps.
    pub inst_dir: PathBuf,

    #[config(default = true)]
    pub return_label: bool,

    #[config(default = true)]
    pub return_grade: bool,

    #[config(default = true)]
    pub return_transformed: bool,

    /// Draw this many samples without replacement instead of using all of them.
    pub n_samples: Option<usize>,

    /// Seed for the subsample; drawn from the OS when unset.
    pub seed: Option<u64>,
}

impl CopyPasteConfig {
    /// Configuration for a generator output directory holding
    /// `transformed/`, `label/` and `inst/`.
    pub fn from_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self::new(
            root.join("transformed"),
            root.join("label"),
            root.join("inst"),
        )
    }
}

/// Parses the grade out of a `copypaste_G_XXXXX` file stem.
pub fn grade_from_file_name(path: &Path) -> DatasetResult<Grade> {
    let stem = path
        .file_stem()
        .ok_or_else(|| DatasetError::NoFileStem {
            path: path.to_path_buf(),
        })?
        .to_str()
        .ok_or_else(|| DatasetError::InvalidUtf8Path {
            path: path.to_path_buf(),
        })?;

    stem.chars()
        .nth(COPY_PASTE_GRADE_OFFSET)
        .and_then(Grade::from_digit)
        .ok_or_else(|| DatasetError::InvalidCopyPasteName {
            path: path.to_path_buf(),
            offset: COPY_PASTE_GRADE_OFFSET,
        })
}

/// One copy-paste sample as served to the data loader.
///
/// Each field is present only when the dataset was configured to return it.
#[derive(Debug, Clone)]
pub struct CopyPasteItem {
    /// Path of the sample relative to the label directory.
    pub filename: PathBuf,
    /// Lesion label map, single channel.
    pub label: Option<ImageArray>,
    /// Composited fundus image, three channels.
    pub transformed: Option<ImageArray>,
    pub grade: Option<Grade>,
}

#[derive(Debug, Clone)]
struct Sample {
    filename: PathBuf,
    grade: Grade,
}

/// Copy-paste samples, optionally subsampled, with per-output transforms.
pub struct CopyPasteDataset {
    samples: Vec<Sample>,
    label_dir: PathBuf,
    transformed_dir: PathBuf,
    inst_dir: PathBuf,
    image_transform: Option<Box<dyn ImageTransform>>,
    label_transform: Option<Box<dyn ImageTransform>>,
    common_transform: Option<Box<dyn ImageTransform>>,
    return_label: bool,
    return_grade: bool,
    return_transformed: bool,
}

impl CopyPasteDataset {
    /// Enumerates the samples under `config.label_dir`.
    ///
    /// # Errors
    ///
    /// Fails if the label directory cannot be read, a filename does not
    /// encode a grade, or more samples are requested than exist.
    pub fn new(config: &CopyPasteConfig) -> DatasetResult<Self> {
        let mut files = list_files(&config.label_dir)?;

        if let Some(n_samples) = config.n_samples {
            if n_samples > files.len() {
                return Err(DatasetError::SampleSizeTooLarge {
                    requested: n_samples,
                    available: files.len(),
                });
            }
            let mut rng = match config.seed {
                Some(seed) => ChaCha8Rng::seed_from_u64(seed),
                None => ChaCha8Rng::from_os_rng(),
            };
            let picked = rand::seq::index::sample(&mut rng, files.len(), n_samples);
            files = picked.into_iter().map(|i| files[i].clone()).collect();
        }

        let samples = files
            .into_iter()
            .map(|filename| {
                let grade = grade_from_file_name(&filename)?;
                Ok(Sample { filename, grade })
            })
            .collect::<DatasetResult<Vec<_>>>()?;

        tracing::info!(
            dir = %config.label_dir.display(),
            samples = samples.len(),
            "loaded copy-paste samples",
        );

        Ok(Self {
            samples,
            label_dir: config.label_dir.clone(),
            transformed_dir: config.transformed_dir.clone(),
            inst_dir: config.inst_dir.clone(),
            image_transform: None,
            label_transform: None,
            common_transform: None,
            return_label: config.return_label,
            return_grade: config.return_grade,
            return_transformed: config.return_transformed,
        })
    }

    /// Transform applied to the composited image.
    pub fn with_image_transform(mut self, transform: impl ImageTransform + 'static) -> Self {
        self.image_transform = Some(Box::new(transform));
        self
    }

    /// Transform applied to the label map.
    pub fn with_label_transform(mut self, transform: impl ImageTransform + 'static) -> Self {
        self.label_transform = Some(Box::new(transform));
        self
    }

    /// Transform applied to the composited image after the image transform.
    pub fn with_common_transform(mut self, transform: impl ImageTransform + 'static) -> Self {
        self.common_transform = Some(Box::new(transform));
        self
    }

    /// Grade of every sample, in dataset order.
    pub fn grades(&self) -> impl Iterator<Item = Grade> + '_ {
        self.samples.iter().map(|s| s.grade)
    }

    /// Number of samples per grade.
    pub fn grade_histogram(&self) -> [usize; Grade::COUNT] {
        let mut histogram = [0; Grade::COUNT];
        for grade in self.grades() {
            histogram[grade.index()] += 1;
        }
        histogram
    }

    pub fn filename(&self, index: usize) -> Option<&Path> {
        self.samples.get(index).map(|s| s.filename.as_path())
    }

    /// Path of the instance map belonging to sample `index`.
    pub fn instance_path(&self, index: usize) -> Option<PathBuf> {
        self.samples
            .get(index)
            .map(|s| self.inst_dir.join(&s.filename))
    }

    pub fn label(&self, filename: &Path) -> DatasetResult<DynamicImage> {
        open_image(&self.label_dir.join(filename))
    }

    pub fn transformed(&self, filename: &Path) -> DatasetResult<DynamicImage> {
        open_image(&self.transformed_dir.join(filename))
    }

    /// Loads sample `index`, reporting why it could not be loaded.
    pub fn try_get(&self, index: usize) -> DatasetResult<CopyPasteItem> {
        let sample = self
            .samples
            .get(index)
            .ok_or(DatasetError::IndexOutOfBounds {
                index,
                len: self.samples.len(),
            })?;

        let label = if self.return_label {
            let label = self.label(&sample.filename)?;
            let label = apply(self.label_transform.as_deref(), label);
            Some(to_luma_array(&label))
        } else {
            None
        };

        let transformed = if self.return_transformed {
            let image = self.transformed(&sample.filename)?;
            let image = apply(self.image_transform.as_deref(), image);
            let image = apply(self.common_transform.as_deref(), image);
            Some(to_rgb_array(&image))
        } else {
            None
        };

        Ok(CopyPasteItem {
            filename: sample.filename.clone(),
            label,
            transformed,
            grade: self.return_grade.then_some(sample.grade),
        })
    }
}

impl Dataset<CopyPasteItem> for CopyPasteDataset {
    fn get(&self, index: usize) -> Option<CopyPasteItem> {
        match self.try_get(index) {
            Ok(item) => Some(item),
            Err(DatasetError::IndexOutOfBounds { .. }) => None,
            Err(e) => {
                tracing::warn!(index, error = %e, "failed to load copy-paste sample");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

fn apply(transform: Option<&dyn ImageTransform>, image: DynamicImage) -> DynamicImage {
    match transform {
        Some(transform) => transform.apply(image),
        None => image,
    }
}

fn open_image(path: &Path) -> DatasetResult<DynamicImage> {
    image::open(path).map_err(|source| DatasetError::ImageOpenFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// A batch of copy-paste samples as tensors.
#[derive(Debug, Clone)]
pub struct CopyPasteBatch<B: Backend> {
    /// Label maps with shape `[B, 1, H, W]`.
    pub labels: Option<Tensor<B, 4>>,
    /// Composited images with shape `[B, 3, H, W]`.
    pub transformed: Option<Tensor<B, 4>>,
    /// Grades with shape `[B]`.
    pub grades: Option<Tensor<B, 1, Int>>,
}

/// Batcher converting [`CopyPasteItem`]s into a [`CopyPasteBatch`].
///
/// A field is batched only when every item carries it, and the items must
/// share spatial dimensions.
#[derive(Clone, Default)]
pub struct CopyPasteBatcher<B: Backend> {
    _phantom: PhantomData<B>,
}

impl<B: Backend> CopyPasteBatcher<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

fn stack_arrays<B: Backend>(
    arrays: Option<Vec<ImageArray>>,
    device: &B::Device,
) -> Option<Tensor<B, 4>> {
    let arrays = arrays.filter(|a| !a.is_empty())?;
    let tensors = arrays
        .into_iter()
        .map(|array| {
            let shape = array.shape();
            // HWC to CHW
            Tensor::<B, 3>::from_data(TensorData::new(array.data, shape), device)
                .permute([2, 0, 1])
        })
        .collect();
    Some(Tensor::stack(tensors, 0))
}

impl<B: Backend> Batcher<B, CopyPasteItem, CopyPasteBatch<B>> for CopyPasteBatcher<B> {
    fn batch(&self, items: Vec<CopyPasteItem>, device: &B::Device) -> CopyPasteBatch<B> {
        let batch_size = items.len();
        assert_same_spatial_dims(&items);

        let mut labels = Some(Vec::with_capacity(batch_size));
        let mut transformed = Some(Vec::with_capacity(batch_size));
        let mut grades = Some(Vec::with_capacity(batch_size));

        for item in items {
            push_or_clear(&mut labels, item.label);
            push_or_clear(&mut transformed, item.transformed);
            push_or_clear(&mut grades, item.grade.map(|g| i64::from(g.value())));
        }

        let grades = grades.filter(|g| !g.is_empty()).map(|grades| {
            let len = grades.len();
            Tensor::<B, 1, Int>::from_data(
                TensorData::new(grades, [len]).convert::<B::IntElem>(),
                device,
            )
        });

        CopyPasteBatch {
            labels: stack_arrays(labels, device),
            transformed: stack_arrays(transformed, device),
            grades,
        }
    }
}

/// Panics with the offending file name when items differ in height or width.
fn assert_same_spatial_dims(items: &[CopyPasteItem]) {
    let mut expected: Option<(&Path, [usize; 2])> = None;
    for item in items {
        for array in [&item.label, &item.transformed].into_iter().flatten() {
            let dims = [array.height, array.width];
            match expected {
                None => expected = Some((item.filename.as_path(), dims)),
                Some((first, first_dims)) => assert!(
                    dims == first_dims,
                    "cannot batch {} ({}x{}) with {} ({}x{}); items must share spatial dimensions",
                    item.filename.display(),
                    dims[0],
                    dims[1],
                    first.display(),
                    first_dims[0],
                    first_dims[1],
                ),
            }
        }
    }
}

fn push_or_clear<T>(acc: &mut Option<Vec<T>>, value: Option<T>) {
    match (acc.as_mut(), value) {
        (Some(values), Some(value)) => values.push(value),
        _ => *acc = None,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use burn::backend::NdArray;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    use crate::transform::{CropShortEdge, Resize};

    use super::*;

    type TestBackend = NdArray<f32>;

    /// Writes a generator output directory with the given sample names.
    fn write_samples(root: &Path, names: &[&str]) -> CopyPasteConfig {
        let config = CopyPasteConfig::from_root(root);
        for dir in [&config.label_dir, &config.transformed_dir, &config.inst_dir] {
            fs::create_dir_all(dir).unwrap();
        }
        for name in names {
            GrayImage::from_fn(6, 4, |x, _| Luma([(x % 3) as u8]))
                .save(config.label_dir.join(name))
                .unwrap();
            RgbImage::from_pixel(6, 4, Rgb([255, 0, 0]))
                .save(config.transformed_dir.join(name))
                .unwrap();
        }
        config
    }

    #[test]
    fn grade_is_read_from_offset_ten_of_the_stem() {
        let grade = grade_from_file_name(Path::new("copypaste_3_00042.png")).unwrap();
        assert_eq!(grade.value(), 3);

        let err = grade_from_file_name(Path::new("copypaste_x_00042.png")).unwrap_err();
        assert!(matches!(
            err,
            DatasetError::InvalidCopyPasteName { offset: 10, .. }
        ));
        assert!(grade_from_file_name(Path::new("short.png")).is_err());
    }

    #[test]
    fn enumerates_all_samples_with_grades() {
        let tmp = tempfile::tempdir().unwrap();
        let config = write_samples(
            tmp.path(),
            &["copypaste_0_00001.png", "copypaste_4_00002.png", "copypaste_4_00003.png"],
        );

        let dataset = CopyPasteDataset::new(&config).unwrap();

        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.grade_histogram(), [1, 0, 0, 0, 2]);
        assert_eq!(
            dataset.instance_path(0).unwrap(),
            config.inst_dir.join("copypaste_0_00001.png")
        );
    }

    #[test]
    fn item_contains_label_image_and_grade() {
        let tmp = tempfile::tempdir().unwrap();
        let config = write_samples(tmp.path(), &["copypaste_2_00001.png"]);

        let dataset = CopyPasteDataset::new(&config).unwrap();
        let item = dataset.get(0).unwrap();

        let label = item.label.unwrap();
        assert_eq!(label.shape(), [4, 6, 1]);
        let scaled: Vec<u8> = label.data.iter().map(|v| (v * 255.0).round() as u8).collect();
        assert_eq!(&scaled[..3], &[0, 1, 2]);

        let image = item.transformed.unwrap();
        assert_eq!(image.shape(), [4, 6, 3]);
        assert_eq!(&image.data[..3], &[1.0, 0.0, 0.0]);

        assert_eq!(item.grade.unwrap().value(), 2);
    }

    #[test]
    fn return_flags_omit_outputs() {
        let tmp = tempfile::tempdir().unwrap();
        let config = write_samples(tmp.path(), &["copypaste_1_00001.png"])
            .with_return_label(false)
            .with_return_transformed(false);

        let item = CopyPasteDataset::new(&config).unwrap().get(0).unwrap();

        assert!(item.label.is_none());
        assert!(item.transformed.is_none());
        assert_eq!(item.grade.unwrap().value(), 1);
    }

    #[test]
    fn transforms_apply_to_their_outputs() {
        let tmp = tempfile::tempdir().unwrap();
        let config = write_samples(tmp.path(), &["copypaste_1_00001.png"]);

        let dataset = CopyPasteDataset::new(&config)
            .unwrap()
            .with_image_transform(CropShortEdge)
            .with_common_transform(Resize::new(2))
            .with_label_transform(Resize::nearest(2));
        let item = dataset.try_get(0).unwrap();

        assert_eq!(item.transformed.unwrap().shape(), [2, 2, 3]);
        assert_eq!(item.label.unwrap().shape(), [2, 3, 1]);
    }

    #[test]
    fn subsampling_draws_without_replacement() {
        let tmp = tempfile::tempdir().unwrap();
        let names: Vec<String> = (0..10)
            .map(|i| format!("copypaste_{}_{i:05}.png", i % 5))
            .collect();
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let config = write_samples(tmp.path(), &names)
            .with_n_samples(Some(4))
            .with_seed(Some(1));

        let dataset = CopyPasteDataset::new(&config).unwrap();
        let again = CopyPasteDataset::new(&config).unwrap();

        assert_eq!(dataset.len(), 4);
        let mut picked: Vec<_> = (0..4).map(|i| dataset.filename(i).unwrap()).collect();
        let repeat: Vec<_> = (0..4).map(|i| again.filename(i).unwrap()).collect();
        assert_eq!(picked, repeat);
        picked.sort();
        picked.dedup();
        assert_eq!(picked.len(), 4);
    }

    #[test]
    fn requesting_too_many_samples_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let config = write_samples(tmp.path(), &["copypaste_1_00001.png"]).with_n_samples(Some(2));

        assert!(matches!(
            CopyPasteDataset::new(&config),
            Err(DatasetError::SampleSizeTooLarge {
                requested: 2,
                available: 1
            })
        ));
    }

    #[test]
    fn malformed_names_fail_construction() {
        let tmp = tempfile::tempdir().unwrap();
        let config = write_samples(tmp.path(), &["not_a_sample.png"]);

        assert!(CopyPasteDataset::new(&config).is_err());
    }

    #[test]
    fn missing_image_yields_none() {
        let tmp = tempfile::tempdir().unwrap();
        let config = write_samples(tmp.path(), &["copypaste_1_00001.png"]);
        fs::remove_file(config.transformed_dir.join("copypaste_1_00001.png")).unwrap();

        let dataset = CopyPasteDataset::new(&config).unwrap();

        assert!(dataset.get(0).is_none());
        assert!(dataset.get(5).is_none());
        assert!(matches!(
            dataset.try_get(0),
            Err(DatasetError::ImageOpenFailed { .. })
        ));
    }

    #[test]
    fn batcher_stacks_present_fields() {
        let device = Default::default();
        let batcher = CopyPasteBatcher::<TestBackend>::new();
        let item = |grade: u8| CopyPasteItem {
            filename: PathBuf::from("x.png"),
            label: Some(ImageArray {
                data: vec![0.0; 8 * 8],
                channels: 1,
                height: 8,
                width: 8,
            }),
            transformed: Some(ImageArray {
                data: vec![0.5; 8 * 8 * 3],
                channels: 3,
                height: 8,
                width: 8,
            }),
            grade: Some(Grade::new(grade).unwrap()),
        };

        let batch = batcher.batch(vec![item(1), item(3)], &device);

        assert_eq!(batch.labels.unwrap().dims(), [2, 1, 8, 8]);
        assert_eq!(batch.transformed.unwrap().dims(), [2, 3, 8, 8]);
        let grades = batch.grades.unwrap();
        assert_eq!(grades.dims(), [2]);
        assert_eq!(
            grades.into_data().convert::<i64>().to_vec::<i64>().unwrap(),
            vec![1, 3]
        );
    }

    #[test]
    fn batcher_drops_fields_missing_from_items() {
        let device = Default::default();
        let batcher = CopyPasteBatcher::<TestBackend>::new();
        let item = CopyPasteItem {
            filename: PathBuf::from("x.png"),
            label: None,
            transformed: None,
            grade: Some(Grade::new(0).unwrap()),
        };

        let batch = batcher.batch(vec![item.clone(), item], &device);

        assert!(batch.labels.is_none());
        assert!(batch.transformed.is_none());
        assert_eq!(batch.grades.unwrap().dims(), [2]);
    }

    #[test]
    #[should_panic(expected = "cannot batch b.png (5x4) with a.png (4x4)")]
    fn batcher_names_item_with_mismatched_size() {
        let device = Default::default();
        let batcher = CopyPasteBatcher::<TestBackend>::new();
        let item = |name: &str, height: usize| CopyPasteItem {
            filename: PathBuf::from(name),
            label: Some(ImageArray {
                data: vec![0.0; height * 4],
                channels: 1,
                height,
                width: 4,
            }),
            transformed: None,
            grade: None,
        };

        batcher.batch(vec![item("a.png", 4), item("b.png", 5)], &device);
    }
}
