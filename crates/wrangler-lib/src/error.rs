//! Error types for the wrangling pipeline
//!
//! Structural failures (unreconcilable node topology, unmappable columns,
//! failed casts) are returned to the caller instead of terminating the
//! process. The orchestrator decides whether to abort; no stage writes
//! partial output on error.

use crate::models::{NodeSlot, SemanticType};
use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, WrangleError>;

#[derive(Debug, Error)]
pub enum WrangleError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("invalid mapping file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unknown semantic type literal `{0}`")]
    UnknownSemanticType(String),

    #[error("`{name}` is mapped to both {first} and {second}")]
    ConflictingDtype {
        name: String,
        first: SemanticType,
        second: SemanticType,
    },

    #[error("indicator `{name}` is assigned to both `{first}` and `{second}`")]
    ConflictingSeverity {
        name: String,
        first: String,
        second: String,
    },

    #[error("cannot place control-plane nodes: missing slots {missing:?}, donor nodes {donors:?}")]
    ControlPlaneMismatch {
        missing: Vec<NodeSlot>,
        donors: Vec<NodeSlot>,
    },

    #[error("expected 3 etcd node suffixes in `{family}` columns, found {found}")]
    EtcdNodeCount { family: &'static str, found: usize },

    #[error("no dtype mapping for `{canonical}` (column `{column}`)")]
    UnmappedColumn { column: String, canonical: String },

    #[error("cannot cast `{value}` in column `{column}` to {target}: {reason}")]
    Cast {
        column: String,
        value: String,
        target: SemanticType,
        reason: String,
    },

    #[error("duplicate column `{0}`")]
    DuplicateColumn(String),

    #[error("column `{column}` has {found} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("unsupported arrow type {data_type} in column `{column}`")]
    UnsupportedArrowType { column: String, data_type: String },
}
