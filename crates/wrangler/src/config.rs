//! Wrangler configuration

use crate::Cli;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;
use wrangler_lib::LabelWeights;

/// Base name of the optional configuration file in the working directory
const DEFAULT_CONFIG_NAME: &str = "wrangler";

/// Wrangler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WranglerConfig {
    /// Dtype mapping file
    #[serde(default = "default_mapping")]
    pub mapping: PathBuf,

    /// Label (severity class) mapping file
    #[serde(default = "default_y_map")]
    pub y_map: PathBuf,

    /// Snapshot file, or directory searched recursively for parquet files
    #[serde(default = "default_src")]
    pub src: PathBuf,

    /// Output directory
    #[serde(default = "default_dstdir")]
    pub dstdir: PathBuf,

    /// Output file name inside `dstdir`
    #[serde(default = "default_dstfile")]
    pub dstfile: String,

    /// Abort on columns missing from the dtype mapping
    #[serde(default)]
    pub strict_mapping: bool,

    /// Append node-permuted copies of every snapshot
    #[serde(default)]
    pub randomize_nodes: bool,

    /// Derive `y_label` before writing
    #[serde(default)]
    pub impute_labels: bool,

    /// Weights for the yellow, red and red_fatal thresholds
    #[serde(default = "default_label_weights")]
    pub label_weights: Vec<f64>,

    /// Drop transient columns and duplicate rows before writing
    #[serde(default)]
    pub clean: bool,

    /// Collapse source tags to their topology family
    #[serde(default)]
    pub normalize_sources: bool,

    /// Optional JSON run report
    #[serde(default)]
    pub report: Option<PathBuf>,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,
}

fn default_mapping() -> PathBuf {
    PathBuf::from("mapping/mapping.yaml")
}

fn default_y_map() -> PathBuf {
    PathBuf::from("mapping/labels-definition.yaml")
}

fn default_src() -> PathBuf {
    PathBuf::from("data/collection")
}

fn default_dstdir() -> PathBuf {
    PathBuf::from("data/wrangle")
}

fn default_dstfile() -> String {
    "dtyped-data.parquet".to_string()
}

fn default_label_weights() -> Vec<f64> {
    let w = LabelWeights::DEFAULT;
    vec![w.yellow, w.red, w.red_fatal]
}

impl WranglerConfig {
    /// Load configuration from an optional file and `WRANGLER_*` variables
    ///
    /// Without an explicit path, `wrangler.{yaml,toml,json}` in the working
    /// directory is used when present.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let builder = config::Config::builder();
        let builder = match file {
            Some(path) => builder.add_source(config::File::from(path).required(true)),
            None => {
                builder.add_source(config::File::with_name(DEFAULT_CONFIG_NAME).required(false))
            }
        };

        let config = builder
            .add_source(
                config::Environment::with_prefix("WRANGLER")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("label_weights"),
            )
            .build()
            .context("Failed to read wrangler configuration")?;

        config
            .try_deserialize()
            .context("Invalid wrangler configuration")
    }

    /// Apply command-line overrides on top of the loaded configuration
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(mapping) = &cli.mapping {
            self.mapping = mapping.clone();
        }
        if let Some(y_map) = &cli.y_map {
            self.y_map = y_map.clone();
        }
        if let Some(src) = &cli.src {
            self.src = src.clone();
        }
        if let Some(dstdir) = &cli.dstdir {
            self.dstdir = dstdir.clone();
        }
        if let Some(dstfile) = &cli.dstfile {
            self.dstfile = dstfile.clone();
        }
        if let Some(weights) = &cli.label_weights {
            self.label_weights = weights.clone();
        }
        if let Some(report) = &cli.report {
            self.report = Some(report.clone());
        }
        self.strict_mapping |= cli.strict_mapping;
        self.randomize_nodes |= cli.randomize_nodes;
        self.impute_labels |= cli.impute_labels;
        self.clean |= cli.clean;
        self.normalize_sources |= cli.normalize_sources;
        self.log_json |= cli.log_json;
        self
    }

    /// Label weights as a triple
    ///
    /// A list that is not exactly (yellow, red, red_fatal) is replaced by
    /// the fallback weights with a warning, like out-of-range values are.
    pub fn weights(&self) -> LabelWeights {
        match self.label_weights.as_slice() {
            [yellow, red, red_fatal] => LabelWeights::new(*yellow, *red, *red_fatal),
            other => {
                warn!(
                    weights = ?other,
                    fallback = ?LabelWeights::FALLBACK,
                    "label_weights needs exactly 3 values, using fallback weights"
                );
                LabelWeights::FALLBACK
            }
        }
    }
}
