//! Telemetry Wrangler - cluster health dataset builder
//!
//! Turns raw per-run telemetry snapshots into one typed, canonicalized and
//! optionally labelled parquet dataset.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wrangler_lib::{
    clean, cleanup::SOURCE_COLUMN, label_summary, normalize_sources, write_dataset,
    AssemblerOptions, CoercionPolicy, CombinedDataset, DatasetAssembler, LabelImputer,
    ParquetReader, TypeRegistry,
};

mod config;
mod report;
mod sources;

use config::WranglerConfig;
use report::{RunReport, Shape};

/// Cluster telemetry dataset wrangler
#[derive(Debug, Parser)]
#[command(name = "wrangler")]
#[command(
    author,
    version,
    about = "Wrangle cluster telemetry snapshots into a typed dataset",
    long_about = None
)]
pub struct Cli {
    /// Only load and validate the mapping files
    #[arg(long)]
    pub validate: bool,

    /// Dtype mapping file
    #[arg(long, short = 'm')]
    pub mapping: Option<PathBuf>,

    /// Label (severity class) mapping file
    #[arg(long, short = 'y')]
    pub y_map: Option<PathBuf>,

    /// Snapshot file or directory of parquet snapshots
    #[arg(long, short = 's')]
    pub src: Option<PathBuf>,

    /// Output file name
    #[arg(long, short = 'f')]
    pub dstfile: Option<String>,

    /// Output directory
    #[arg(long, short = 'd')]
    pub dstdir: Option<PathBuf>,

    /// Configuration file (yaml, toml or json)
    #[arg(long, short = 'c', env = "WRANGLER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Fail on columns missing from the dtype mapping
    #[arg(long)]
    pub strict_mapping: bool,

    /// Append node-permuted copies of every snapshot
    #[arg(long)]
    pub randomize_nodes: bool,

    /// Derive y_label before writing
    #[arg(long)]
    pub impute_labels: bool,

    /// Yellow, red and red_fatal weights, comma separated
    #[arg(long, value_delimiter = ',')]
    pub label_weights: Option<Vec<f64>>,

    /// Drop transient columns and duplicate rows
    #[arg(long)]
    pub clean: bool,

    /// Collapse source tags to compact/mno
    #[arg(long)]
    pub normalize_sources: bool,

    /// Write a JSON run report to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long)]
    pub log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            std::env::var("LOG_LEVEL")
                .ok()
                .and_then(|level| EnvFilter::try_new(level.to_lowercase()).ok())
        })
        .unwrap_or_else(|| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = WranglerConfig::load(cli.config.as_deref())?.with_cli(&cli);
    init_tracing(config.log_json);

    info!("Starting wrangler");
    if let Err(err) = run(&cli, &config) {
        error!(error = %format!("{:#}", err), "Wrangling failed");
        return Err(err);
    }
    Ok(())
}

fn run(cli: &Cli, config: &WranglerConfig) -> Result<()> {
    let started_at = Utc::now();
    let registry = TypeRegistry::load(&config.mapping, &config.y_map).with_context(|| {
        format!(
            "Failed to load mappings {} and {}",
            config.mapping.display(),
            config.y_map.display()
        )
    })?;

    if cli.validate {
        let summary = registry.summary();
        info!(?summary, "Mapping files are valid");
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let weights = config.weights();
    let files = sources::enumerate(&config.src)?;
    info!(src = %config.src.display(), files = files.len(), "Found snapshot files");

    let options = AssemblerOptions {
        policy: CoercionPolicy {
            strict_unmapped: config.strict_mapping,
        },
        randomize_nodes: config.randomize_nodes,
    };
    let assembler = DatasetAssembler::new(&registry, ParquetReader, options);
    let CombinedDataset {
        mut table,
        sources: inputs,
    } = assembler
        .load_and_combine(&files)
        .context("Failed to assemble dataset")?;

    if config.normalize_sources {
        table = normalize_sources(table)?;
    }

    let mut labels = None;
    let mut applied_weights = None;
    if config.impute_labels {
        let imputer = LabelImputer::from_registry(&registry, weights);
        table = imputer.impute(table).context("Failed to impute labels")?;
        labels = Some(label_summary(&table, SOURCE_COLUMN));
        applied_weights = Some(imputer.weights());
    }

    if config.clean {
        table = clean(table)?;
    }

    let output = write_dataset(&table, &config.dstdir, &config.dstfile)
        .with_context(|| format!("Failed to write dataset to {}", config.dstdir.display()))?;

    if let Some(path) = &config.report {
        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            inputs,
            combined: Shape {
                rows: table.height(),
                columns: table.width(),
            },
            output,
            randomize_nodes: config.randomize_nodes,
            label_weights: applied_weights,
            labels,
        };
        report.write(path)?;
        info!(path = %path.display(), "Wrote run report");
    }

    info!("Wrangling completed");
    Ok(())
}
