//! Feature dtype and indicator label registry
//!
//! Holds the name → semantic type and name → severity class mappings loaded
//! from the external YAML mapping files. The registry is read-only once
//! built.

use crate::error::{Result, WrangleError};
use crate::models::{SemanticType, Severity};
use crate::patterns::canonical_name;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// One dtype mapping record: every listed name resolves to `dtype`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureMapping {
    pub names: Vec<String>,
    pub dtype: String,
}

/// One label mapping record: indicator `name` belongs to class `label`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelMapping {
    pub name: String,
    pub label: String,
}

/// Indicator names grouped by severity class, in mapping-file order
#[derive(Debug, Clone, Default)]
pub struct IndicatorGroups {
    pub yellow: Vec<String>,
    pub red: Vec<String>,
    pub red_fatal: Vec<String>,
}

impl IndicatorGroups {
    pub fn group(&self, severity: Severity) -> &[String] {
        match severity {
            Severity::Yellow => &self.yellow,
            Severity::Red => &self.red,
            Severity::RedFatal => &self.red_fatal,
        }
    }

    fn group_mut(&mut self, severity: Severity) -> &mut Vec<String> {
        match severity {
            Severity::Yellow => &mut self.yellow,
            Severity::Red => &mut self.red,
            Severity::RedFatal => &mut self.red_fatal,
        }
    }
}

/// Counts reported by validate-only mode
#[derive(Debug, Clone, Serialize)]
pub struct RegistrySummary {
    pub features: usize,
    pub features_by_dtype: BTreeMap<String, usize>,
    pub indicators: usize,
    pub yellow: usize,
    pub red: usize,
    pub red_fatal: usize,
    pub unclassified: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    dtypes: HashMap<String, SemanticType>,
    labels: HashMap<String, String>,
    groups: IndicatorGroups,
}

impl TypeRegistry {
    /// Build a registry from parsed mapping records
    pub fn from_mappings(features: &[FeatureMapping], labels: &[LabelMapping]) -> Result<Self> {
        let mut registry = Self::default();

        debug!("Initializing dtypes mapping");
        for entry in features {
            let dtype: SemanticType = entry.dtype.parse()?;
            for name in &entry.names {
                match registry.dtypes.get(name) {
                    Some(existing) if *existing != dtype => {
                        return Err(WrangleError::ConflictingDtype {
                            name: name.clone(),
                            first: *existing,
                            second: dtype,
                        });
                    }
                    Some(_) => {}
                    None => {
                        registry.dtypes.insert(name.clone(), dtype);
                    }
                }
            }
        }
        debug!(features = registry.dtypes.len(), "Completed dtypes mapping");

        debug!("Initializing y-label mapping");
        for entry in labels {
            match registry.labels.get(&entry.name) {
                Some(existing) if *existing != entry.label => {
                    return Err(WrangleError::ConflictingSeverity {
                        name: entry.name.clone(),
                        first: existing.clone(),
                        second: entry.label.clone(),
                    });
                }
                Some(_) => continue,
                None => {
                    registry
                        .labels
                        .insert(entry.name.clone(), entry.label.clone());
                }
            }
            if let Some(severity) = Severity::from_label(&entry.label) {
                registry.groups.group_mut(severity).push(entry.name.clone());
            }
        }
        debug!(indicators = registry.labels.len(), "Completed y-label mapping");

        Ok(registry)
    }

    /// Parse both mappings from YAML documents
    pub fn from_yaml_str(features_yaml: &str, labels_yaml: &str) -> Result<Self> {
        let features: Vec<FeatureMapping> = serde_yaml::from_str(features_yaml)?;
        let labels: Vec<LabelMapping> = serde_yaml::from_str(labels_yaml)?;
        Self::from_mappings(&features, &labels)
    }

    /// Load both mapping files
    pub fn load(mapping_path: &Path, y_map_path: &Path) -> Result<Self> {
        let features_yaml = std::fs::read_to_string(mapping_path)?;
        let labels_yaml = std::fs::read_to_string(y_map_path)?;
        let registry = Self::from_yaml_str(&features_yaml, &labels_yaml)?;
        info!(
            mapping = %mapping_path.display(),
            y_map = %y_map_path.display(),
            "Loaded mapping files"
        );
        Ok(registry)
    }

    /// Semantic type declared for a canonical column name
    pub fn dtype(&self, canonical: &str) -> Option<SemanticType> {
        self.dtypes.get(canonical).copied()
    }

    /// Resolve a column to its canonical lookup name and declared type
    pub fn resolve(&self, column: &str) -> (String, Option<SemanticType>) {
        let canonical = canonical_name(column);
        let dtype = self.dtype(&canonical);
        (canonical.into_owned(), dtype)
    }

    pub fn indicator_groups(&self) -> &IndicatorGroups {
        &self.groups
    }

    pub fn summary(&self) -> RegistrySummary {
        let mut features_by_dtype = BTreeMap::new();
        for dtype in self.dtypes.values() {
            *features_by_dtype.entry(dtype.to_string()).or_insert(0) += 1;
        }
        let classified =
            self.groups.yellow.len() + self.groups.red.len() + self.groups.red_fatal.len();
        RegistrySummary {
            features: self.dtypes.len(),
            features_by_dtype,
            indicators: self.labels.len(),
            yellow: self.groups.yellow.len(),
            red: self.groups.red.len(),
            red_fatal: self.groups.red_fatal.len(),
            unclassified: self.labels.len() - classified,
        }
    }
}
