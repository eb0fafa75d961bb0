//! Experiment pipelines behind the CLI subcommands.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::optim::AdamConfig;
use burn::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;

use drbm::persist::DrbmRecord;
use drbm::training::{categorical_epoch, generative_epoch, Dataset, LearningLog};
use drbm::{Drbm, DrbmParams};

use crate::config::{load_experiment, ExperimentConfig};

/// Arguments for the `train-generative` subcommand.
#[derive(Debug)]
pub struct TrainGenerativeArgs {
    /// Path to the experiment config JSON.
    pub config: PathBuf,
    pub epochs: usize,
    /// Directory receiving the log and model files.
    pub output_dir: PathBuf,
    /// Appended to the output file stem.
    pub suffix: Option<String>,
}

/// Arguments for the `train-categorical` subcommand.
#[derive(Debug)]
pub struct TrainCategoricalArgs {
    pub config: PathBuf,
    pub epochs: usize,
    /// Training dataset JSON.
    pub train: PathBuf,
    /// Test dataset JSON.
    pub test: PathBuf,
    pub output_dir: PathBuf,
    pub suffix: Option<String>,
}

/// Arguments for the `sample` subcommand.
#[derive(Debug)]
pub struct SampleArgs {
    /// Saved model JSON.
    pub model: PathBuf,
    /// Number of examples to draw.
    pub count: usize,
    /// Output dataset JSON.
    pub output: PathBuf,
    pub seed: Option<u64>,
}

/// `<dir>/<stamp>_<kind>_h<H>_<activation>[_<suffix>]_{log,model}.json`
fn output_paths(
    dir: &Path,
    stamp: &str,
    kind: &str,
    hidden: usize,
    activation: &str,
    suffix: Option<&str>,
) -> (PathBuf, PathBuf) {
    let mut parts = vec![stamp.to_string(), kind.to_string(), format!("h{hidden}"), activation.to_string()];
    if let Some(suffix) = suffix {
        parts.push(suffix.to_string());
    }
    let stem = parts.join("_");
    (dir.join(format!("{stem}_log.json")), dir.join(format!("{stem}_model.json")))
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Seeded RNG when `seed` is given, otherwise one seeded from OS entropy.
///
/// A seed also fixes backend `B`'s tensor RNG.
fn make_rng<B: Backend>(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => {
            B::seed(seed);
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    }
}

fn epoch_progress(epochs: usize) -> ProgressBar {
    let pb = ProgressBar::new(epochs as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] epoch {pos}/{len} ({eta}) {msg}")
            .expect("valid progress bar template")
            .progress_chars("=> "),
    );
    pb
}

/// Train a model against a generator DRBM and save its log and parameters.
pub fn run_train_generative(args: TrainGenerativeArgs) -> anyhow::Result<()> {
    let (experiment, raw) = load_experiment(&args.config)?;
    match experiment.dtype.as_str() {
        "float32" => train_generative::<NdArray<f32>>(&args, &experiment, raw),
        "float64" => train_generative::<NdArray<f64>>(&args, &experiment, raw),
        other => bail!("unsupported dtype {other:?}, expected \"float32\" or \"float64\""),
    }
}

fn train_generative<B: Backend>(
    args: &TrainGenerativeArgs,
    experiment: &ExperimentConfig,
    raw: serde_json::Value,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let device = B::Device::default();
    let mut rng = make_rng::<B>(experiment.seed);

    // 1. Generator and its synthetic training set
    let generator: Drbm<B> = experiment
        .generator_model()?
        .init(&device)
        .context("failed to build generator")?;
    let train = Dataset::from_generator(&generator, experiment.data_size, &mut rng);
    tracing::info!(
        hidden_num = generator.hidden_num(),
        activation = %generator.activation(),
        examples = train.len(),
        "Sampled generator data"
    );

    // 2. Trainee
    let mut model: Drbm<Autodiff<B>> = experiment
        .training_model()
        .init(&device)
        .context("failed to build training model")?;
    let training = experiment.training(args.epochs);
    let mut optimizer = AdamConfig::new().init::<Autodiff<B>, DrbmParams<Autodiff<B>>>();
    let mut log = LearningLog::new(raw);

    // 3. Epoch loop
    let pb = epoch_progress(args.epochs);
    for epoch in 0..args.epochs {
        let (updated, summary) = generative_epoch(
            &training,
            model,
            &mut optimizer,
            &train,
            &generator,
            epoch,
            &mut rng,
            &device,
        )?;
        model = updated;
        summary.record(&mut log);
        pb.set_message(format!("kl={:.5} nll={:.5}", summary.kl_divergence, summary.nll));
        pb.inc(1);
    }
    pb.finish_with_message("done");

    // 4. Outputs
    let trained = model.valid();
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;
    let (log_path, model_path) = output_paths(
        &args.output_dir,
        &timestamp(),
        "generative",
        trained.hidden_num(),
        trained.activation().name(),
        args.suffix.as_deref(),
    );
    log.save(&log_path)?;
    trained.save(&model_path)?;

    println!("\n--- Generative Training Summary ---");
    println!("Epochs: {}", args.epochs);
    if let Some(last) = args.epochs.checked_sub(1) {
        if let Some(kl) = log.get("kl-divergence", last) {
            println!("Final KL-divergence: {kl:.6}");
        }
    }
    println!("Log: {}", log_path.display());
    println!("Model: {}", model_path.display());
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}

/// Train a model on labelled train/test datasets and save its log and parameters.
pub fn run_train_categorical(args: TrainCategoricalArgs) -> anyhow::Result<()> {
    let (experiment, raw) = load_experiment(&args.config)?;
    match experiment.dtype.as_str() {
        "float32" => train_categorical::<NdArray<f32>>(&args, &experiment, raw),
        "float64" => train_categorical::<NdArray<f64>>(&args, &experiment, raw),
        other => bail!("unsupported dtype {other:?}, expected \"float32\" or \"float64\""),
    }
}

fn train_categorical<B: Backend>(
    args: &TrainCategoricalArgs,
    experiment: &ExperimentConfig,
    raw: serde_json::Value,
) -> anyhow::Result<()> {
    let start = Instant::now();
    let device = B::Device::default();
    let mut rng = make_rng::<B>(experiment.seed);

    let train = Dataset::load(&args.train)
        .with_context(|| format!("failed to load training data {}", args.train.display()))?;
    let test = Dataset::load(&args.test)
        .with_context(|| format!("failed to load test data {}", args.test.display()))?;

    let mut model: Drbm<Autodiff<B>> = experiment
        .training_model()
        .init(&device)
        .context("failed to build training model")?;
    let training = experiment.training(args.epochs);
    let mut optimizer = AdamConfig::new().init::<Autodiff<B>, DrbmParams<Autodiff<B>>>();
    let mut log = LearningLog::new(raw);

    let pb = epoch_progress(args.epochs);
    for epoch in 0..args.epochs {
        let (updated, summary) = categorical_epoch(
            &training,
            model,
            &mut optimizer,
            &train,
            &test,
            epoch,
            &mut rng,
            &device,
        )?;
        model = updated;
        summary.record(&mut log);
        pb.set_message(format!(
            "test_err={:.4} test_nll={:.5}",
            summary.test_error, summary.test_nll
        ));
        pb.inc(1);
    }
    pb.finish_with_message("done");

    let trained = model.valid();
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;
    let (log_path, model_path) = output_paths(
        &args.output_dir,
        &timestamp(),
        "categorical",
        trained.hidden_num(),
        trained.activation().name(),
        args.suffix.as_deref(),
    );
    log.save(&log_path)?;
    trained.save(&model_path)?;

    println!("\n--- Categorical Training Summary ---");
    println!("Epochs: {}", args.epochs);
    if let Some(last) = args.epochs.checked_sub(1) {
        if let Some(err) = log.get("test-error", last) {
            println!("Final test error: {:.2}%", err * 100.0);
        }
    }
    println!("Log: {}", log_path.display());
    println!("Model: {}", model_path.display());
    println!("Elapsed: {:.1}s", start.elapsed().as_secs_f64());

    Ok(())
}

/// Stick-break a labelled dataset from a saved model.
pub fn run_sample(args: SampleArgs) -> anyhow::Result<()> {
    let reader = BufReader::new(
        File::open(&args.model).with_context(|| format!("failed to open {}", args.model.display()))?,
    );
    let record: DrbmRecord = serde_json::from_reader(reader)
        .with_context(|| format!("{} is not a DRBM model record", args.model.display()))?;
    match record.dtype.as_str() {
        "float32" => sample::<NdArray<f32>>(&args, record),
        "float64" => sample::<NdArray<f64>>(&args, record),
        other => bail!("unsupported dtype {other:?}, expected \"float32\" or \"float64\""),
    }
}

fn sample<B: Backend>(args: &SampleArgs, record: DrbmRecord) -> anyhow::Result<()> {
    let device = B::Device::default();
    let mut rng = make_rng::<B>(args.seed);
    let model: Drbm<B> = record.into_model(&device)?;

    let dataset = Dataset::from_generator(&model, args.count, &mut rng);
    dataset.save(&args.output)?;

    println!("Sampled {} examples from {}", dataset.len(), args.model.display());
    println!("Output: {}", args.output.display());
    Ok(())
}
