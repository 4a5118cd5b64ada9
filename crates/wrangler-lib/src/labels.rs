//! Health label imputation
//!
//! Derives a `green`/`yellow`/`red` label per row from weighted counts of
//! anomaly indicator columns. Rules are applied as a priority chain where a
//! later rule can only raise severity:
//!
//! 1. yellow when `yellow + 2 * red` exceeds `round(T * w_yellow)`
//! 2. red when `red` exceeds `round(T * w_red)`
//! 3. red when `red_fatal` exceeds `round(T * w_red_fatal)`
//! 4. red with fewer than 2 active control-plane nodes
//! 5. yellow with exactly 2 active control-plane nodes
//!
//! Hit counts saturate instead of overflowing.
//!
//! `T` is the number of indicator columns in the table.

use crate::coerce::arrow_type;
use crate::error::Result;
use crate::models::{HealthLabel, SemanticType, Severity};
use crate::patterns::CONTROL_PLANE;
use crate::registry::{IndicatorGroups, TypeRegistry};
use crate::table::{Column, Table};
use arrow::array::{StringArray, UInt32Array};
use arrow::compute::cast;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Substring shared by every indicator column
pub const INDICATOR_MARKER: &str = "yy";

/// Column holding the number of active control-plane nodes per row
pub const CONTROL_PLANE_COUNT_COLUMN: &str = "total_qty_control_plane";

/// Output label column
pub const LABEL_COLUMN: &str = "y_label";

pub const YELLOW_COUNT_COLUMN: &str = "total_y_label_yellow";
pub const RED_COUNT_COLUMN: &str = "total_y_label_red";
pub const RED_FATAL_COUNT_COLUMN: &str = "total_y_label_red_fatal";

/// Threshold weights as fractions of the indicator count
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LabelWeights {
    pub yellow: f64,
    pub red: f64,
    pub red_fatal: f64,
}

impl LabelWeights {
    /// Weights used when none are supplied
    pub const DEFAULT: LabelWeights = LabelWeights::new(0.25, 0.10, 0.0);
    /// Weights substituted for an invalid triple
    pub const FALLBACK: LabelWeights = LabelWeights::new(0.25, 0.10, 0.01);

    pub const fn new(yellow: f64, red: f64, red_fatal: f64) -> Self {
        Self {
            yellow,
            red,
            red_fatal,
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.yellow, self.red, self.red_fatal]
            .iter()
            .all(|w| (0.0..=1.0).contains(w))
    }

    /// Replace an out-of-range triple by [`LabelWeights::FALLBACK`]
    pub fn validated(self) -> Self {
        if self.is_valid() {
            self
        } else {
            warn!(
                weights = ?self,
                fallback = ?Self::FALLBACK,
                "Label weights must satisfy 0 <= w <= 1, using fallback weights"
            );
            Self::FALLBACK
        }
    }
}

impl Default for LabelWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<[f64; 3]> for LabelWeights {
    fn from(w: [f64; 3]) -> Self {
        Self::new(w[0], w[1], w[2])
    }
}

/// Per-row indicator hit counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndicatorCounts {
    pub yellow: u64,
    pub red: u64,
    pub red_fatal: u64,
}

/// Absolute thresholds derived from the indicator count and weights
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub yellow: u64,
    pub red: u64,
    pub red_fatal: u64,
}

impl Thresholds {
    /// `round(total * w)` with ties going to the even neighbour
    pub fn new(total_indicators: usize, weights: LabelWeights) -> Self {
        let scale = |w: f64| (total_indicators as f64 * w).round_ties_even().max(0.0) as u64;
        Self {
            yellow: scale(weights.yellow),
            red: scale(weights.red),
            red_fatal: scale(weights.red_fatal),
        }
    }
}

/// Label of one row
///
/// `active_control_plane` is compared as stored, so a fractional count
/// below 2 is red and only an exact 2 is yellow.
pub fn label_row(
    counts: IndicatorCounts,
    thresholds: Thresholds,
    active_control_plane: Option<f64>,
) -> HealthLabel {
    let mut label = HealthLabel::Green;
    let weighted = counts.yellow.saturating_add(counts.red.saturating_mul(2));
    if weighted > thresholds.yellow {
        label = label.escalate(HealthLabel::Yellow);
    }
    if counts.red > thresholds.red {
        label = label.escalate(HealthLabel::Red);
    }
    if counts.red_fatal > thresholds.red_fatal {
        label = label.escalate(HealthLabel::Red);
    }
    match active_control_plane {
        Some(active) if active < 2.0 => label.escalate(HealthLabel::Red),
        Some(active) if active == 2.0 => label.escalate(HealthLabel::Yellow),
        _ => label,
    }
}

pub struct LabelImputer {
    groups: IndicatorGroups,
    weights: LabelWeights,
}

impl LabelImputer {
    pub fn new(groups: IndicatorGroups, weights: LabelWeights) -> Self {
        Self {
            groups,
            weights: weights.validated(),
        }
    }

    pub fn from_registry(registry: &TypeRegistry, weights: LabelWeights) -> Self {
        Self::new(registry.indicator_groups().clone(), weights)
    }

    pub fn weights(&self) -> LabelWeights {
        self.weights
    }

    /// Add hit counters and the `y_label` column to the table
    pub fn impute(&self, table: Table) -> Result<Table> {
        debug!("Starting to impute y_label");
        let total = table
            .column_names()
            .filter(|name| name.contains(INDICATOR_MARKER))
            .count();
        let thresholds = Thresholds::new(total, self.weights);

        let yellow = self.group_hits(&table, Severity::Yellow)?;
        let red = self.group_hits(&table, Severity::Red)?;
        let red_fatal = self.group_hits(&table, Severity::RedFatal)?;
        let active = active_control_plane(&table)?;

        let labels: StringArray = (0..table.height())
            .map(|idx| {
                let counts = IndicatorCounts {
                    yellow: yellow[idx],
                    red: red[idx],
                    red_fatal: red_fatal[idx],
                };
                let active = active.as_ref().map(|a| a[idx]);
                Some(label_row(counts, thresholds, active).as_str())
            })
            .collect();
        let labels = cast(&labels, &arrow_type(SemanticType::Category))?;

        let table = table
            .with_column(counter_column(YELLOW_COUNT_COLUMN, &yellow))?
            .with_column(counter_column(RED_COUNT_COLUMN, &red))?
            .with_column(counter_column(RED_FATAL_COUNT_COLUMN, &red_fatal))?
            .with_column(Column::typed(LABEL_COLUMN, labels, SemanticType::Category))?;

        debug!(indicators = total, ?thresholds, "Completed imputing y_label");
        Ok(table)
    }

    /// Row sums over the columns whose names contain any indicator of the group
    fn group_hits(&self, table: &Table, severity: Severity) -> Result<Vec<u64>> {
        let names = self.groups.group(severity);
        if names.is_empty() {
            return Ok(vec![0; table.height()]);
        }
        let mut sums = vec![0.0f64; table.height()];
        for column in table.columns() {
            if !names.iter().any(|n| column.name.contains(n.as_str())) {
                continue;
            }
            for (sum, hits) in sums.iter_mut().zip(column.to_f64()?.iter()) {
                *sum += hits.unwrap_or(0.0);
            }
        }
        Ok(sums.into_iter().map(|s| s.max(0.0) as u64).collect())
    }
}

fn counter_column(name: &str, counts: &[u64]) -> Column {
    let counts: UInt32Array = counts
        .iter()
        .map(|c| Some(u32::try_from(*c).unwrap_or(u32::MAX)))
        .collect();
    Column::typed(name, Arc::new(counts), SemanticType::UInt(32))
}

/// Active control-plane nodes per row
///
/// Taken from `total_qty_control_plane` when present, otherwise summed over
/// the `node<d>_control_plane` indicator columns. Missing cells count as 0.
/// `None` when the table has neither, in which case the control-plane
/// overrides are skipped.
pub fn active_control_plane(table: &Table) -> Result<Option<Vec<f64>>> {
    if let Some(column) = table.column(CONTROL_PLANE_COUNT_COLUMN) {
        let counts = column.to_f64()?;
        return Ok(Some(counts.iter().map(|c| c.unwrap_or(0.0)).collect()));
    }

    let columns: Vec<&Column> = table
        .columns()
        .iter()
        .filter(|c| CONTROL_PLANE.is_match(&c.name))
        .collect();
    if columns.is_empty() {
        warn!("No control-plane information, skipping control-plane label overrides");
        return Ok(None);
    }
    let mut counts = vec![0.0f64; table.height()];
    for column in columns {
        for (count, flag) in counts.iter_mut().zip(column.to_f64()?.iter()) {
            *count += flag.unwrap_or(0.0);
        }
    }
    Ok(Some(counts))
}

/// Row counts per label and per source/label pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelSummary {
    pub by_label: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, BTreeMap<String, usize>>,
}

/// Aggregate `y_label` over the table, logging the distribution
pub fn label_summary(table: &Table, source_column: &str) -> LabelSummary {
    let mut summary = LabelSummary::default();
    let Some(labels) = table.column(LABEL_COLUMN) else {
        return summary;
    };
    let sources = table.column(source_column).map(Column::values);
    for (idx, label) in labels.values().into_iter().enumerate() {
        let label = label.to_string();
        *summary.by_label.entry(label.clone()).or_insert(0) += 1;
        if let Some(sources) = &sources {
            *summary
                .by_source
                .entry(sources[idx].to_string())
                .or_default()
                .entry(label)
                .or_insert(0) += 1;
        }
    }

    info!(by_label = ?summary.by_label, "y_label distribution");
    for (source, counts) in &summary.by_source {
        info!(source = %source, counts = ?counts, "y_label distribution by source");
    }
    summary
}
