//! binfer Command Line Interface
//!
//! Train, inspect and query cached diabetes or loan-approval classifiers.
//! All results are printed to stdout as JSON.

use binfer::api::{DatasetSource, InferenceService, TrainingPipeline};
use binfer::cache::{ModelCache, ModelOrigin};
use binfer::classifier::{ClassifierConfig, Criterion, MarginParams, TreeParams};
use binfer::core::{ClassifierError, Result, TrainingControl};
use binfer::data::{LoadOptions, SplitConfig};
use binfer::schema::{FeatureSchema, RawRecord, RawValue};
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{error, info, warn};
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "binfer")]
#[command(about = "Binary-classification inference with cached models")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Train (or load) the model for a configuration
    Train(TrainArgs),
    /// Classify one or more records
    Predict(PredictArgs),
    /// Show the feature importance ranking
    Importance(ModelArgs),
    /// Display model information
    Info(ModelArgs),
    /// Remove the cached model and its artifact
    Invalidate(ModelArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliAlgorithm {
    /// Decision tree
    Tree,
    /// Linear SVM
    Margin,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliCriterion {
    Entropy,
    Gini,
}

impl From<CliCriterion> for Criterion {
    fn from(criterion: CliCriterion) -> Self {
        match criterion {
            CliCriterion::Entropy => Criterion::Entropy,
            CliCriterion::Gini => Criterion::Gini,
        }
    }
}

/// Options identifying a model: schema, data, algorithm and cache location
#[derive(Args)]
struct ModelArgs {
    /// Schema: "diabetes", "loan" or a path to a JSON schema file
    #[arg(long, default_value = "diabetes")]
    schema: String,

    /// Training CSV file (defaults to the schema's built-in sample)
    #[arg(long)]
    data: Option<PathBuf>,

    /// Skip CSV rows with empty cells instead of failing
    #[arg(long)]
    skip_incomplete: bool,

    /// Directory holding model artifacts
    #[arg(long, default_value = "models")]
    cache_dir: PathBuf,

    /// Classifier family
    #[arg(short, long, value_enum, default_value = "tree")]
    algorithm: CliAlgorithm,

    /// Tree: maximum depth
    #[arg(long, default_value = "5")]
    max_depth: usize,

    /// Tree: minimum samples required to split a node
    #[arg(long, default_value = "5")]
    min_samples_split: usize,

    /// Tree: impurity criterion
    #[arg(long, value_enum, default_value = "entropy")]
    criterion: CliCriterion,

    /// Margin: regularization parameter C
    #[arg(short = 'C', long, default_value = "1.0")]
    c: f64,

    /// Margin: KKT tolerance
    #[arg(long, default_value = "0.001")]
    tolerance: f64,

    /// Margin: maximum solver passes
    #[arg(long, default_value = "1000")]
    max_iterations: usize,

    /// Margin: train on raw, unstandardized features
    #[arg(long)]
    no_standardize: bool,

    /// Fraction of each class held out for evaluation
    #[arg(long, default_value = "0.2")]
    test_fraction: f64,

    /// Shuffle seed for the train/test split
    #[arg(long, default_value = "2")]
    seed: u64,

    /// Tag for the training data; changing it forces a new model
    #[arg(long)]
    data_version: Option<String>,

    /// Abort training after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Args)]
struct TrainArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Discard any cached model first
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct PredictArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Field value as NAME=VALUE; repeat for every field
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,

    /// JSON file with one record object or an array of them ("-" for stdin)
    #[arg(long, conflicts_with = "set")]
    input: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Train(args) => train_command(args),
        Commands::Predict(args) => predict_command(args),
        Commands::Importance(args) => importance_command(args),
        Commands::Info(args) => info_command(args),
        Commands::Invalidate(args) => invalidate_command(args),
    };

    if let Err(e) = result {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn load_schema(spec: &str) -> Result<FeatureSchema> {
    match spec {
        "diabetes" => Ok(FeatureSchema::diabetes()),
        "loan" | "loan-approval" => Ok(FeatureSchema::loan_approval()),
        path => FeatureSchema::from_json_file(path),
    }
}

fn classifier_config(args: &ModelArgs) -> ClassifierConfig {
    match args.algorithm {
        CliAlgorithm::Tree => ClassifierConfig::Tree(
            TreeParams::default()
                .with_max_depth(args.max_depth)
                .with_min_samples_split(args.min_samples_split)
                .with_criterion(args.criterion.into()),
        ),
        CliAlgorithm::Margin => ClassifierConfig::Margin(
            MarginParams::default()
                .with_c(args.c)
                .with_tolerance(args.tolerance)
                .with_max_iterations(args.max_iterations)
                .with_standardize(!args.no_standardize),
        ),
    }
}

fn build_service(args: &ModelArgs) -> Result<InferenceService> {
    let schema = Arc::new(load_schema(&args.schema)?);

    let source = match &args.data {
        Some(path) => DatasetSource::Csv {
            path: path.clone(),
            options: LoadOptions {
                skip_incomplete_rows: args.skip_incomplete,
            },
        },
        None => DatasetSource::builtin_for(&schema).ok_or_else(|| {
            ClassifierError::InvalidParameter(format!(
                "schema '{}' has no built-in sample; pass --data",
                schema.name
            ))
        })?,
    };

    let mut pipeline = TrainingPipeline::new(schema, classifier_config(args), source).with_split(
        SplitConfig {
            test_fraction: args.test_fraction,
            seed: args.seed,
        },
    );
    if let Some(version) = &args.data_version {
        pipeline = pipeline.with_data_version(version.clone());
    }

    info!("Model cache directory: {:?}", args.cache_dir);
    Ok(InferenceService::with_pipeline(
        Arc::new(ModelCache::new(&args.cache_dir)),
        pipeline,
    ))
}

fn training_control(args: &ModelArgs) -> TrainingControl {
    match args.timeout_secs {
        Some(secs) => TrainingControl::with_timeout(Duration::from_secs(secs)),
        None => TrainingControl::new(),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ClassifierError::InvalidParameter(format!("cannot render output: {e}")))?;
    println!("{text}");
    Ok(())
}

fn train_command(args: TrainArgs) -> Result<()> {
    let service = build_service(&args.model)?;
    if args.force && service.invalidate()? {
        info!("Discarded cached model");
    }

    let acquired = service.acquire(&training_control(&args.model))?;
    let origin = match acquired.origin {
        ModelOrigin::Memory => "memory",
        ModelOrigin::Loaded => "loaded",
        ModelOrigin::Trained => "trained",
    };
    if let Some(err) = &acquired.persist_error {
        warn!("Model could not be saved: {err}");
    }

    let metadata = &acquired.model.metadata;
    print_json(&json!({
        "cache_key": metadata.cache_key,
        "origin": origin,
        "algorithm": metadata.algorithm,
        "artifact": service.cache().artifact_path(&service.cache_key()?),
        "n_train": metadata.n_train,
        "n_test": metadata.n_test,
        "test_accuracy": metadata.test_metrics.map(|m| m.accuracy()),
        "persist_error": acquired.persist_error.as_ref().map(|e| e.to_string()),
    }))
}

/// Parse `NAME=VALUE` pairs; values stay text and are typed by the schema
fn parse_assignments(pairs: &[String]) -> Result<RawRecord> {
    let mut record = RawRecord::new();
    for pair in pairs {
        let (name, value) = pair.split_once('=').ok_or_else(|| {
            ClassifierError::InvalidParameter(format!("expected NAME=VALUE, got {pair:?}"))
        })?;
        record.insert(name.trim().to_string(), RawValue::Text(value.to_string()));
    }
    Ok(record)
}

fn read_records(path: &Path) -> Result<Vec<RawRecord>> {
    let text = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(path)?
    };

    let invalid = |e: serde_json::Error| {
        ClassifierError::InvalidParameter(format!("invalid input records: {e}"))
    };
    let value: serde_json::Value = serde_json::from_str(&text).map_err(invalid)?;
    if value.is_array() {
        serde_json::from_value(value).map_err(invalid)
    } else {
        Ok(vec![serde_json::from_value(value).map_err(invalid)?])
    }
}

fn predict_command(args: PredictArgs) -> Result<()> {
    let records = match &args.input {
        Some(path) => read_records(path)?,
        None => vec![parse_assignments(&args.set)?],
    };

    let service = build_service(&args.model)?;
    // reject bad input before any training happens
    for record in &records {
        service.schema().encode_record(record)?;
    }
    service.acquire(&training_control(&args.model))?;

    if records.len() == 1 {
        print_json(&service.predict(&records[0])?)
    } else {
        print_json(&service.predict_batch(&records)?)
    }
}

fn importance_command(args: ModelArgs) -> Result<()> {
    let service = build_service(&args)?;
    service.acquire(&training_control(&args))?;
    match service.feature_importance()? {
        Some(ranking) => print_json(&ranking),
        None => Err(ClassifierError::UnsupportedCapability("feature importance")),
    }
}

fn info_command(args: ModelArgs) -> Result<()> {
    let service = build_service(&args)?;
    service.acquire(&training_control(&args))?;
    print_json(&service.model_info()?)
}

fn invalidate_command(args: ModelArgs) -> Result<()> {
    let service = build_service(&args)?;
    let removed = service.invalidate()?;
    print_json(&json!({
        "cache_key": service.cache_key()?.to_string(),
        "removed": removed,
    }))
}
