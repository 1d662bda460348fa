#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use campaign_optimizer::config::{AppConfig, MODEL_PATH_ENV};
use campaign_optimizer::data::load_raw_table;
use campaign_optimizer::loader::ModelLoader;
use campaign_optimizer::pipeline::{PipelineError, PredictionPipeline};
use campaign_optimizer::sentiment::{LexiconScorer, SentimentAnalyzer};
use campaign_optimizer::summary::Summaries;

mod render;

#[derive(Args)]
pub struct ModelSourceArgs {
    /// Path to a TOML config file (model_path, categorical columns, imputation)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to the pretrained model file (.toml); overrides the config and CAMPAIGN_MODEL_PATH
    #[arg(long, value_name = "FILE")]
    pub model: Option<PathBuf>,
}

#[derive(Args)]
pub struct PredictArgs {
    /// Path to the campaign CSV file with a header row
    pub upload: PathBuf,

    #[command(flatten)]
    pub source: ModelSourceArgs,

    /// Also write the annotated table to this CSV file
    #[arg(long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Number of uploaded rows shown before predicting
    #[arg(long, default_value = "5")]
    pub preview: usize,
}

#[derive(Parser)]
#[command(
    name = "campaign",
    about = "Marketing campaign optimization: sentiment analysis and outcome prediction",
    long_about = "Scores the sentiment of campaign messages and applies a pretrained \
                 classifier to uploaded campaign records."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the sentiment of a campaign message or customer feedback
    #[command(about = "Analyze sentiment of a text")]
    Sentiment {
        /// The text to analyze
        #[arg(value_name = "TEXT")]
        text: String,
    },

    /// Upload campaign data and predict outcomes
    #[command(about = "Predict campaign outcomes from a CSV upload")]
    Predict(PredictArgs),

    /// Show which columns and classes a model uses
    #[command(about = "Describe a pretrained model")]
    Model(ModelSourceArgs),

    /// Display version information
    #[command(about = "Display version information")]
    Version,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let Cli { command } = cli;

    let result = match command {
        Some(Commands::Sentiment { text }) => run_sentiment(&text),
        Some(Commands::Predict(args)) => run_predict(args),
        Some(Commands::Model(args)) => run_model(args),
        Some(Commands::Version) => {
            println!("campaign {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        None => {
            Cli::command().print_help().expect("print help");
            println!();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_sentiment(text: &str) -> Result<(), Box<dyn std::error::Error>> {
    let analyzer = SentimentAnalyzer::new(LexiconScorer::new());
    let report = analyzer.analyze(text)?;
    println!("Sentiment Score: {}", report.polarity);
    println!("{}", report.label);
    Ok(())
}

/// Builds a loader from the config file, the environment, and the command line.
fn model_loader(
    source: &ModelSourceArgs,
) -> Result<(AppConfig, ModelLoader), Box<dyn std::error::Error>> {
    let config = AppConfig::load(source.config.as_deref())?;
    let env_path = std::env::var(MODEL_PATH_ENV).ok();
    let model_path = config.resolve_model_path(source.model.clone(), env_path)?;
    Ok((config, ModelLoader::new(model_path)))
}

fn run_predict(args: PredictArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (config, loader) = model_loader(&args.source)?;
    let model = loader.get()?;

    let table = load_raw_table(&args.upload)?;
    println!("Loaded {} rows from: {}", table.height(), args.upload.display());
    println!();
    println!("Preview of Uploaded Data:");
    render::print_table(&table.head(args.preview), None);
    println!();

    let pipeline = PredictionPipeline::new(model, config.alignment())
        .with_label_column(config.label_column.clone());
    let result = match pipeline.run(&table) {
        Ok(result) => result,
        Err(PipelineError::SchemaMismatch(e)) => {
            return Err(format!("Upload rejected. {e}").into());
        }
        Err(PipelineError::Prediction(e)) => {
            return Err(format!("Prediction failed. Error: {e}").into());
        }
    };

    println!("Predictions completed.");
    render::print_table(result.table(), Some((result.label_column(), result.labels())));

    if let Some(output) = &args.output {
        result.write_csv(output)?;
        println!("Predictions saved to: {}", output.display());
    }

    let summary_config = config.summary();
    let summaries = Summaries::compute(&result, &summary_config);

    println!();
    println!("### Campaign Result Distribution");
    match &summaries.distribution {
        Ok(distribution) => render::print_distribution(distribution),
        Err(e) => println!("Skipped: {e}"),
    }

    println!();
    println!("### Feature Correlation Heatmap");
    match &summaries.correlation {
        Ok(matrix) => render::print_correlation(matrix),
        Err(e) => println!("Skipped: {e}"),
    }

    println!();
    println!(
        "### {} vs {}",
        summary_config.scatter_y, summary_config.scatter_x
    );
    match &summaries.scatter {
        Ok(points) => render::print_scatter(points, &summary_config),
        Err(e) => println!("Skipped: {e}"),
    }

    Ok(())
}

fn run_model(args: ModelSourceArgs) -> Result<(), Box<dyn std::error::Error>> {
    let (_, loader) = model_loader(&args)?;
    let model = loader.get()?;
    println!("Model: {}", loader.path().display());
    println!(
        "Expected feature columns ({}):",
        model.expected_columns().len()
    );
    for (i, column) in model.expected_columns().columns().iter().enumerate() {
        println!("  {:>3}. {column}", i + 1);
    }
    println!("Classes: {}", model.classes().join(", "));
    Ok(())
}
