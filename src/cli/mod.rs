//! Churn pipeline CLI module
//!
//! Command-line interface for data preparation, training, prediction and
//! schema inspection.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::data::{has_field, load_records, record, repair, write_csv, RepairConfig, UnparseableNumeric};
use crate::evaluation::{ClassMetrics, EvaluationReport, RankedFeature};
use crate::pipeline::{ChurnPipeline, PREDICTION_FIELD};
use crate::preprocessing::ColumnTransformer;
use crate::training::{ModelType, TrainEngine, TrainingConfig};

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "churn")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Customer churn prediction pipeline")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ingest and repair raw customer records
    Prepare {
        /// Raw records (JSON or CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Repaired CSV output
        #[arg(short, long)]
        output: PathBuf,

        /// Churn target field
        #[arg(short, long, default_value = "Churn")]
        target: String,

        /// Replace unparseable numeric values with 0 instead of dropping the record
        #[arg(long)]
        zero_fill: bool,
    },

    /// Train and evaluate churn models
    Train {
        /// Repaired records (CSV or JSON)
        #[arg(short, long)]
        data: PathBuf,

        /// Training config (JSON); flags below override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Model to train (logistic, random_forest, all)
        #[arg(short, long, default_value = "all")]
        model: String,

        /// Churn target field
        #[arg(short, long)]
        target: Option<String>,

        /// Fraction of records held out for evaluation
        #[arg(long)]
        test_size: Option<f64>,

        /// Random seed for the split and the models
        #[arg(long)]
        seed: Option<u64>,

        /// Number of ranked features to report
        #[arg(long)]
        top_n: Option<usize>,

        /// Save the most accurate pipeline here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Predict churn with a saved pipeline
    Predict {
        /// Saved pipeline file
        #[arg(short, long)]
        model: PathBuf,

        /// Records to score (CSV or JSON)
        #[arg(short, long)]
        data: PathBuf,

        /// Predictions CSV output
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the feature schema resolved from a data file
    Schema {
        /// Repaired records (CSV or JSON)
        #[arg(short, long)]
        data: PathBuf,

        /// Training config (JSON) supplying target, identifier and exclusions
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Dispatch a parsed command line
pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Prepare { data, output, target, zero_fill } => {
            cmd_prepare(&data, &output, &target, zero_fill)
        }
        Commands::Train { data, config, model, target, test_size, seed, top_n, output } => {
            let config = build_config(config.as_deref(), &model, target, test_size, seed, top_n)?;
            cmd_train(&data, config, output.as_deref())
        }
        Commands::Predict { model, data, output } => cmd_predict(&model, &data, output.as_deref()),
        Commands::Schema { data, config } => cmd_schema(&data, config.as_deref()),
    }
}

/// Merge a config file with command-line overrides
pub fn build_config(
    path: Option<&Path>,
    model: &str,
    target: Option<String>,
    test_size: Option<f64>,
    seed: Option<u64>,
    top_n: Option<usize>,
) -> anyhow::Result<TrainingConfig> {
    let mut config = match path {
        Some(p) => TrainingConfig::from_json_file(p)?,
        None => TrainingConfig::default(),
    };

    config = match model {
        "all" => config,
        "logistic" | "logistic_regression" => config.only(ModelType::LogisticRegression),
        "random_forest" | "rf" => config.only(ModelType::RandomForest),
        _ => anyhow::bail!("Invalid model type: {}", model),
    };
    if let Some(target) = target {
        config = config.with_target(target);
    }
    if let Some(test_size) = test_size {
        config = config.with_test_size(test_size);
    }
    if let Some(seed) = seed {
        config = config.with_random_state(seed);
    }
    if let Some(top_n) = top_n {
        config = config.with_top_n(top_n);
    }

    config.validate()?;
    Ok(config)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_prepare(data_path: &Path, output_path: &Path, target: &str, zero_fill: bool) -> anyhow::Result<()> {
    section("Prepare");

    step_run("Loading records");
    let start = Instant::now();
    let raw = load_records(data_path)?;
    step_done(&format!("{} rows × {} fields in {:?}", raw.height(), raw.width(), start.elapsed()));

    let policy = if zero_fill { UnparseableNumeric::ZeroFill } else { UnparseableNumeric::DropRecord };
    let config = RepairConfig::default()
        .with_target(target)
        .with_unparseable_numeric(policy);

    step_run("Repairing");
    let (repaired, summary) = repair(&raw, &config)?;
    step_done(&format!("{} → {} rows", summary.rows_in, summary.rows_out));

    println!();
    println!("  {:<24} {}", muted("Missing target dropped"), summary.dropped_missing_target);
    println!("  {:<24} {}", muted("Unparseable dropped"), summary.dropped_unparseable);
    println!("  {:<24} {}", muted("Zero-filled"), summary.zero_filled);
    println!("  {:<24} {}", muted("Tokens normalized"), summary.normalized_tokens);
    println!(
        "  {:<24} {} ({:.1}%)",
        muted("Churned"),
        summary.positives,
        100.0 * summary.positives as f64 / summary.rows_out.max(1) as f64
    );

    step_run(&format!("Saving → {}", output_path.display()));
    write_csv(&repaired, output_path)?;
    step_done("");

    println!();
    Ok(())
}

pub fn cmd_train(data_path: &Path, config: TrainingConfig, output: Option<&Path>) -> anyhow::Result<()> {
    section("Train");

    step_run("Loading records");
    let start = Instant::now();
    let table = load_records(data_path)?;
    step_done(&format!("{} rows × {} fields in {:?}", table.height(), table.width(), start.elapsed()));

    let names: Vec<&str> = config.models.iter().map(|m| m.model_type().as_str()).collect();
    step_run(&format!("Training {}", names.join(", ").cyan()));
    let start = Instant::now();
    let run = TrainEngine::new(config).run(&table)?;
    step_done(&format!("{:?}", start.elapsed()));

    println!();
    println!("  {:<16} {}", muted("Train records"), run.split.train.len());
    println!("  {:<16} {}", muted("Test records"), run.split.test.len());
    println!(
        "  {:<16} {} numeric, {} categorical",
        muted("Features"),
        run.schema.numeric().len(),
        run.schema.categorical().len()
    );

    for result in &run.results {
        section(&format!("{} ({:.2}s)", result.model_type, result.training_time_secs));
        print_report(&result.report);
        if !result.top_features.is_empty() {
            print_importances(&result.top_features);
        }
    }

    if let Some(path) = output {
        if let Some((best, pipeline)) = run.best() {
            pipeline.save(path)?;

            println!();
            line_box_top();
            line_box(&kv("Saved   ", &path.display().to_string()));
            line_box(&kv("Model   ", best.model_type.as_str()));
            line_box(&kv("Accuracy", &format!("{:.4}", best.report.accuracy)));
            line_box_bottom();
        }
    }

    println!();
    Ok(())
}

pub fn cmd_predict(model_path: &Path, data_path: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    section("Predict");

    step_run("Loading pipeline");
    let pipeline = ChurnPipeline::load(model_path)?;
    step_done(pipeline.model_type().as_str());

    step_run("Loading records");
    let table = load_records(data_path)?;
    step_done(&format!("{} rows", table.height()));

    step_run("Scoring");
    let start = Instant::now();
    let predictions = pipeline.predictions_table(&table)?;
    step_done(&format!("{:?}", start.elapsed()));

    let churned = predictions
        .column(PREDICTION_FIELD)?
        .i32()?
        .into_iter()
        .filter(|&l| l == Some(1))
        .count();
    println!();
    println!(
        "  {:<16} {} of {} ({:.1}%)",
        muted("Predicted churn"),
        churned,
        table.height(),
        100.0 * churned as f64 / table.height().max(1) as f64
    );

    if has_field(&table, pipeline.target_field()) {
        match pipeline.evaluate(&table) {
            Ok(report) => {
                section("Evaluation against labelled records");
                print_report(&report);
            }
            Err(e) => println!("  {}", format!("Skipping evaluation: {}", e).yellow()),
        }
    }

    match output {
        Some(path) => {
            write_csv(&predictions, path)?;
            step_ok(&format!("Predictions written to {}", path.display()));
        }
        None => {
            println!();
            println!("  {}", predictions.get_column_names_str().join("  ").white().bold());
            for i in 0..predictions.height().min(20) {
                let row = record(&predictions, i)?;
                let cells: Vec<String> = row.values().map(|v| v.to_string()).collect();
                println!("  {}", cells.join("  "));
            }
            if predictions.height() > 20 {
                println!("  {}", dim(&format!("… {} more", predictions.height() - 20)));
            }
        }
    }

    println!();
    Ok(())
}

pub fn cmd_schema(data_path: &Path, config_path: Option<&Path>) -> anyhow::Result<()> {
    section("Schema");

    let config = match config_path {
        Some(p) => TrainingConfig::from_json_file(p)?,
        None => TrainingConfig::default(),
    };
    let table = load_records(data_path)?;
    let engine = TrainEngine::new(config);
    let schema = engine.resolve_schema(&table)?;
    let state = ColumnTransformer::new(schema).fit(&table)?;

    println!("  {:<12} {}", muted("File"), data_path.display());
    println!("  {:<12} {}", muted("Rows"), table.height());
    println!("  {:<12} {}", muted("Excluded"), engine.config().excluded_fields().join(", "));
    println!("  {:<12} {}", muted("Width"), state.n_features());
    println!();

    println!("  {:<20} {:<12} {}", muted("Field"), muted("Type"), muted("Encoding"));
    println!("  {}", dim(&"─".repeat(56)));
    for stats in state.numeric_stats() {
        println!(
            "  {:<20} {:<12} mean {:.3}, std {:.3}",
            stats.field,
            "numeric".truecolor(140, 140, 140),
            stats.mean,
            stats.std
        );
    }
    for enc in state.categorical_encodings() {
        println!(
            "  {:<20} {:<12} {} (reference {})",
            enc.field,
            "categorical".truecolor(140, 140, 140),
            enc.categories.join(", "),
            enc.reference
        );
    }
    println!();
    Ok(())
}

// ─── Report rendering ──────────────────────────────────────────────────────────

fn metrics_row(label: &str, m: &ClassMetrics) {
    println!(
        "  {:<14} {:>9.4} {:>9.4} {:>9.4} {:>9}",
        label, m.precision, m.recall, m.f1, m.support
    );
}

/// Classification report, confusion matrix and ROC AUC
pub fn print_report(report: &EvaluationReport) {
    println!(
        "  {:<14} {:>9} {:>9} {:>9} {:>9}",
        "", muted("precision"), muted("recall"), muted("f1"), muted("support")
    );
    metrics_row("0 retained", &report.per_class[0]);
    metrics_row("1 churned", &report.per_class[1]);
    println!();
    println!(
        "  {:<14} {:>9} {:>9} {:>9.4} {:>9}",
        "accuracy", "", "", report.accuracy, report.n_samples()
    );
    metrics_row("macro avg", &report.macro_avg);
    metrics_row("weighted avg", &report.weighted_avg);

    let [[tn, fp], [fn_, tp]] = report.confusion.as_array();
    println!();
    println!("  {:<14} {:>9} {:>9}", muted("actual \\ pred"), muted("0"), muted("1"));
    println!("  {:<14} {:>9} {:>9}", "0", tn, fp);
    println!("  {:<14} {:>9} {:>9}", "1", fn_, tp);

    if let Some(auc) = report.roc_auc {
        println!();
        println!("  {:<14} {}", muted("ROC AUC"), format!("{:.4}", auc).white().bold());
    }
}

/// Ranked importance list with proportional bars
pub fn print_importances(features: &[RankedFeature]) {
    let max = features.iter().map(|f| f.importance).fold(0.0_f64, f64::max);
    println!();
    println!("  {}", "Top features".white().bold());
    for (rank, f) in features.iter().enumerate() {
        let width = if max > 0.0 { (f.importance / max * 24.0).round() as usize } else { 0 };
        println!(
            "  {:>2}. {:<36} {:.4} {}",
            rank + 1,
            f.name,
            f.importance,
            accent(&"█".repeat(width))
        );
    }
}
