//! Telemetry dataset wrangling for cluster health modelling
//!
//! This crate provides the core functionality for:
//! - Canonicalizing node roles and etcd member names across collection runs
//! - Casting columns to the semantic types declared in the dtype mapping
//! - Node permutation expansion for training-set augmentation
//! - Severity-weighted health label imputation
//! - Parquet snapshot I/O and combined dataset assembly

pub mod assemble;
pub mod canonical;
pub mod cleanup;
pub mod coerce;
pub mod error;
pub mod io;
pub mod labels;
pub mod models;
pub mod patterns;
pub mod permute;
pub mod registry;
pub mod table;

pub use assemble::{
    write_dataset, AssemblerOptions, CombinedDataset, DatasetAssembler, SourceShape,
};
pub use canonical::canonicalize;
pub use cleanup::{clean, normalize_sources};
pub use coerce::{CoercionPolicy, TypeCoercionEngine};
pub use error::{Result, WrangleError};
pub use io::{write_parquet, ParquetReader, SnapshotReader};
pub use labels::{label_summary, LabelImputer, LabelSummary, LabelWeights};
pub use models::*;
pub use registry::{RegistrySummary, TypeRegistry};
pub use table::{Column, Table};
