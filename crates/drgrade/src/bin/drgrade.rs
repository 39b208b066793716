use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::config::Config;
use clap::{Args, Parser, Subcommand};
use drgrade::{
    burn_backend_types::{InferenceBackend, InferenceDevice, NAME},
    data::{CopyPasteConfig, Grade},
    init_logging, inspect_copy_paste,
    model::{load_weights, save_weights, ResNetConfig},
    run_split, SplitConfig,
};

#[derive(Parser)]
#[command(name = "drgrade")]
#[command(about = "Prepare FGADR, IDRiD and DIARETDB1 for diabetic-retinopathy grading")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Combine the datasets and write data/{all,train,test}.csv
    Split(SplitArgs),

    /// Load one copy-paste sample and report its label classes
    InspectCopypaste {
        /// Generator output directory with transformed/, label/ and inst/
        #[arg(long, default_value = "results/copypaste")]
        root: PathBuf,

        /// Sample to load
        #[arg(long, default_value_t = 0)]
        index: usize,

        /// Subsample this many samples first
        #[arg(long = "n_samples")]
        n_samples: Option<usize>,

        /// Seed for the subsample
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Convert a PyTorch ResNet checkpoint to a Burn .mpk record
    ConvertWeights {
        /// Input .pth/.pt checkpoint
        #[arg(short, long)]
        input: PathBuf,

        /// Output path; the .mpk extension is added
        #[arg(short, long)]
        output: PathBuf,

        /// ResNet depth of the checkpoint
        #[arg(long, default_value_t = 50)]
        depth: usize,

        #[arg(long = "num_classes", default_value_t = Grade::COUNT)]
        num_classes: usize,
    },

    /// Show backend information
    Info,
}

#[derive(Args)]
struct SplitArgs {
    /// JSON split configuration; flags below override its values, and
    /// the boolean flags accept an explicit `false`
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long = "fgadr_original_dir")]
    fgadr_original_dir: Option<PathBuf>,

    #[arg(long = "fgadr_processed_dir")]
    fgadr_processed_dir: Option<PathBuf>,

    #[arg(long = "idrid_processed_dir")]
    idrid_processed_dir: Option<PathBuf>,

    #[arg(long = "diaretdb1_processed_dir")]
    diaretdb1_processed_dir: Option<PathBuf>,

    /// Fraction of records in the train subset
    #[arg(long = "train_size")]
    train_size: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// Drop FGADR images annotated by the coarse grader 1
    #[arg(long = "exclude_grader_1", num_args = 0..=1, default_missing_value = "true")]
    exclude_grader_1: Option<bool>,

    /// Grade IDRiD and DIARETDB1 with the classifier instead of randomly
    #[arg(long = "predict_grades", num_args = 0..=1, default_missing_value = "true")]
    predict_grades: Option<bool>,

    #[arg(long = "model_path")]
    model_path: Option<PathBuf>,

    /// Average predictions over flipped inputs
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    tta: Option<bool>,

    #[arg(long = "out_dir")]
    out_dir: Option<PathBuf>,
}

impl SplitArgs {
    fn into_config(self) -> Result<SplitConfig> {
        let mut config = match &self.config {
            Some(path) => SplitConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => SplitConfig::new(
                required(self.fgadr_original_dir.as_ref(), "fgadr_original_dir")?,
                required(self.fgadr_processed_dir.as_ref(), "fgadr_processed_dir")?,
                required(self.idrid_processed_dir.as_ref(), "idrid_processed_dir")?,
                required(self.diaretdb1_processed_dir.as_ref(), "diaretdb1_processed_dir")?,
            ),
        };

        if let Some(dir) = self.fgadr_original_dir {
            config.fgadr_original_dir = dir;
        }
        if let Some(dir) = self.fgadr_processed_dir {
            config.fgadr_processed_dir = dir;
        }
        if let Some(dir) = self.idrid_processed_dir {
            config.idrid_processed_dir = dir;
        }
        if let Some(dir) = self.diaretdb1_processed_dir {
            config.diaretdb1_processed_dir = dir;
        }
        if let Some(train_size) = self.train_size {
            config.train_size = train_size;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(path) = self.model_path {
            config.model_path = path;
        }
        if let Some(dir) = self.out_dir {
            config.out_dir = dir;
        }
        if let Some(exclude) = self.exclude_grader_1 {
            config.exclude_grader_1 = exclude;
        }
        if let Some(predict) = self.predict_grades {
            config.predict_grades = predict;
        }
        if let Some(tta) = self.tta {
            config.predictor.tta = tta;
        }

        Ok(config)
    }
}

fn required(value: Option<&PathBuf>, flag: &str) -> Result<PathBuf> {
    value
        .cloned()
        .with_context(|| format!("--{flag} is required when --config is not given"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let device = InferenceDevice::default();

    match cli.command {
        Commands::Split(args) => {
            let config = args.into_config()?;
            tracing::info!(backend = NAME, "starting split");
            let summary = run_split::<InferenceBackend>(&config, &device)?;

            println!("FGADR: {}", summary.fgadr);
            println!("IDRiD: {}", summary.idrid);
            println!("DIARETDB1: {}", summary.diaretdb1);
            println!("Train: {}", summary.train);
            println!("Test: {}", summary.test);
            Ok(())
        }

        Commands::InspectCopypaste {
            root,
            index,
            n_samples,
            seed,
        } => {
            let config = CopyPasteConfig::from_root(&root)
                .with_n_samples(n_samples)
                .with_seed(seed);
            let report = inspect_copy_paste(&config, index)?;

            println!("Samples: {}", report.len);
            for (grade, count) in Grade::all().zip(report.grade_histogram) {
                println!("  grade {grade}: {count}");
            }
            println!("File: {}", report.filename.display());
            if let Some(grade) = report.grade {
                println!("Grade: {grade}");
            }
            println!("Label values: {:?}", report.label_values);
            Ok(())
        }

        Commands::ConvertWeights {
            input,
            output,
            depth,
            num_classes,
        } => {
            let model = ResNetConfig::new()
                .with_depth(depth)
                .with_num_classes(num_classes)
                .init::<InferenceBackend>(&device)?;
            let model = load_weights(model, &input, &device)?;
            let written = save_weights(model, &output)?;
            println!("Wrote {}", written.display());
            Ok(())
        }

        Commands::Info => {
            println!("drgrade Information:");
            println!("  Backend: {}", NAME);
            println!("  Device: {device:?}");
            Ok(())
        }
    }
}
