//! Assembling FGADR, IDRiD and DIARETDB1 into `all/train/test.csv`.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use burn::{config::Config, tensor::backend::Backend};
use drgrade_data::{
    load_diaretdb1, load_fgadr, load_idrid, train_test_split, write_records, DatasetRecord,
    Grade, GradeOracle, RandomGrades,
};
use drgrade_model::{GradePredictor, PredictorConfig};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Settings of the `split` subcommand.
///
/// Loadable from JSON with [`Config::load`]; command-line flags override
/// file values.
#[derive(Config, Debug)]
pub struct SplitConfig {
    /// FGADR root with `Original_Images/` and `DR_Seg_Grading_Label.csv`.
    pub fgadr_original_dir: PathBuf,
    /// Preprocessed FGADR root with `label/` and `inst/`.
    pub fgadr_processed_dir: PathBuf,
    pub idrid_processed_dir: PathBuf,
    pub diaretdb1_processed_dir: PathBuf,

    /// Fraction of records that go to the train subset.
    #[config(default = 0.8)]
    pub train_size: f64,

    /// Seeds both the split and the random grades.
    #[config(default = 42)]
    pub seed: u64,

    /// Drop FGADR images from the coarse grader 1.
    #[config(default = false)]
    pub exclude_grader_1: bool,

    /// Grade IDRiD and DIARETDB1 with the classifier at `model_path`
    /// instead of drawing random grades.
    #[config(default = false)]
    pub predict_grades: bool,

    #[config(default = "default_model_path()")]
    pub model_path: PathBuf,

    #[config(default = "PredictorConfig::new()")]
    pub predictor: PredictorConfig,

    /// Directory receiving the CSV files.
    #[config(default = "default_out_dir()")]
    pub out_dir: PathBuf,
}

fn default_model_path() -> PathBuf {
    PathBuf::from("results/resnet/eyepacs/checkpoints/model_latest.pth")
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("data")
}

/// Record counts of a finished split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSummary {
    pub fgadr: usize,
    pub idrid: usize,
    pub diaretdb1: usize,
    pub train: usize,
    pub test: usize,
    /// Directory holding `all.csv`, `train.csv` and `test.csv`.
    pub out_dir: PathBuf,
}

impl SplitSummary {
    pub const fn total(&self) -> usize {
        self.fgadr + self.idrid + self.diaretdb1
    }
}

fn grade_oracle<B: Backend>(
    config: &SplitConfig,
    device: &B::Device,
) -> Result<Box<dyn GradeOracle>> {
    if config.predict_grades {
        let predictor = GradePredictor::<B>::from_weights(
            config.predictor.clone(),
            &config.model_path,
            device.clone(),
        )
        .with_context(|| {
            format!(
                "failed to load grading model from {}",
                config.model_path.display()
            )
        })?;
        Ok(Box::new(predictor))
    } else {
        Ok(Box::new(RandomGrades::new(ChaCha8Rng::seed_from_u64(
            config.seed,
        ))))
    }
}

fn grade_histogram(records: &[DatasetRecord]) -> [usize; Grade::COUNT] {
    let mut histogram = [0; Grade::COUNT];
    for record in records {
        histogram[record.grade.index()] += 1;
    }
    histogram
}

/// Loads the three datasets, splits them and writes the CSV files.
///
/// # Errors
///
/// Fails if any dataset cannot be read, the grading model cannot be
/// loaded, the split is degenerate, or the CSV files cannot be written.
pub fn run_split<B: Backend>(config: &SplitConfig, device: &B::Device) -> Result<SplitSummary> {
    let fgadr = load_fgadr(
        &config.fgadr_original_dir,
        &config.fgadr_processed_dir,
        config.exclude_grader_1,
    )
    .context("failed to load FGADR")?;

    let mut oracle = grade_oracle::<B>(config, device)?;
    tracing::info!(oracle = oracle.name(), "assigning grades to IDRiD and DIARETDB1");

    let idrid =
        load_idrid(&config.idrid_processed_dir, oracle.as_mut()).context("failed to load IDRiD")?;
    let diaretdb1 = load_diaretdb1(&config.diaretdb1_processed_dir, oracle.as_mut())
        .context("failed to load DIARETDB1")?;

    tracing::info!(
        fgadr = fgadr.len(),
        idrid = idrid.len(),
        diaretdb1 = diaretdb1.len(),
        "loaded datasets",
    );

    let mut summary = SplitSummary {
        fgadr: fgadr.len(),
        idrid: idrid.len(),
        diaretdb1: diaretdb1.len(),
        train: 0,
        test: 0,
        out_dir: config.out_dir.clone(),
    };

    let combined: Vec<DatasetRecord> = fgadr.into_iter().chain(idrid).chain(diaretdb1).collect();
    let (train, test) = train_test_split(combined.clone(), config.train_size, config.seed)
        .context("failed to split records")?;
    summary.train = train.len();
    summary.test = test.len();

    tracing::info!(
        train = train.len(),
        test = test.len(),
        train_grades = ?grade_histogram(&train),
        test_grades = ?grade_histogram(&test),
        "split records",
    );

    fs::create_dir_all(&config.out_dir)
        .with_context(|| format!("failed to create {}", config.out_dir.display()))?;
    for (name, records) in [("all.csv", &combined), ("train.csv", &train), ("test.csv", &test)] {
        let path = config.out_dir.join(name);
        write_records(&path, records.iter())
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    tracing::info!(dir = %config.out_dir.display(), "wrote split files");
    Ok(summary)
}
