//! etcd metric name normalization
//!
//! etcd metrics identify their node by an IP address or hostname suffix
//! (`etcd_object_counts_10_0_153_83`,
//! `etcd_failed_proposal_etcd_ip_10_0_153_83_us_east_2_compute_internal`)
//! rather than by the `node<d>_` prefix used elsewhere. These are rewritten
//! to `node<d>_<family>` for the three control-plane slots.

use crate::error::{Result, WrangleError};
use crate::models::NodeSlot;
use crate::patterns::{EtcdFamily, ETCD_PATTERNS};
use crate::table::Table;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Number of etcd members every dataset is expected to carry
pub const ETCD_MEMBERS: usize = 3;

/// Identity fragments (IP and hostname suffixes) mapped to node slots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EtcdAliases {
    entries: Vec<(String, NodeSlot)>,
}

impl EtcdAliases {
    /// Pair the IP fragments with the hostname fragments
    ///
    /// Slot `i` is assigned to the `i`-th IP fragment. A hostname fragment
    /// is paired with the IP it carries as an `_`-delimited token when that
    /// match is one-to-one;
    /// otherwise fragments are paired by position, which requires both
    /// lists to come from the same node ordering.
    pub fn pair(ips: &[String], names: &[String]) -> Self {
        let mut entries = Vec::with_capacity(ips.len() + names.len());
        let joined = join_by_content(ips, names);
        if joined.is_none() {
            warn!(
                ?ips,
                ?names,
                "etcd hostnames do not embed their IPs, pairing by position"
            );
        }
        for (idx, (ip, slot)) in ips.iter().zip(NodeSlot::CONTROL_PLANE).enumerate() {
            let name = match &joined {
                Some(order) => names.get(order[idx]),
                None => names.get(idx),
            };
            entries.push((ip.clone(), slot));
            if let Some(name) = name {
                entries.push((name.clone(), slot));
            }
        }
        Self { entries }
    }

    /// Slot of the longest fragment found as a token of `suffix`
    pub fn lookup(&self, suffix: &str) -> Option<NodeSlot> {
        self.entries
            .iter()
            .filter(|(fragment, _)| contains_token(suffix, fragment))
            .max_by_key(|(fragment, _)| fragment.len())
            .map(|(_, slot)| *slot)
    }
}

/// Whether `fragment` occurs in `name` delimited by `_` or the ends of `name`
///
/// `10_0_0_1` is a token of `ip_10_0_0_1_internal` but not of
/// `ip_10_0_0_12_internal`.
fn contains_token(name: &str, fragment: &str) -> bool {
    if fragment.is_empty() {
        return false;
    }
    name.match_indices(fragment).any(|(start, _)| {
        let end = start + fragment.len();
        (start == 0 || name[..start].ends_with('_'))
            && (end == name.len() || name[end..].starts_with('_'))
    })
}

/// For each IP, the index of the single hostname carrying it as a token
fn join_by_content(ips: &[String], names: &[String]) -> Option<Vec<usize>> {
    let mut order = Vec::with_capacity(ips.len());
    for ip in ips {
        let mut hits = names
            .iter()
            .enumerate()
            .filter(|(_, name)| contains_token(name, ip));
        let (idx, _) = hits.next()?;
        if hits.next().is_some() || order.contains(&idx) {
            return None;
        }
        order.push(idx);
    }
    Some(order)
}

/// Distinct suffixes of one family, in column order
fn distinct_suffixes(table: &Table, family: EtcdFamily) -> Vec<String> {
    let mut suffixes: Vec<String> = Vec::new();
    for name in table.column_names() {
        let Some(column) = ETCD_PATTERNS.classify(name) else {
            continue;
        };
        if column.family != family {
            continue;
        }
        if let Some(suffix) = column.suffix {
            if !suffixes.iter().any(|s| s == suffix) {
                suffixes.push(suffix.to_string());
            }
        }
    }
    suffixes
}

/// Rewrite suffixed etcd columns to `node<d>_<family>`
///
/// Tables whose etcd columns are all already in canonical form are returned
/// unchanged. Otherwise both the IP family (`etcd_object_counts`) and the
/// hostname family (`etcd_failed_proposal`) must yield exactly three
/// distinct suffixes.
pub fn normalize_etcd(table: Table) -> Result<Table> {
    let ips = distinct_suffixes(&table, EtcdFamily::ObjectCounts);
    let names = distinct_suffixes(&table, EtcdFamily::FailedProposal);

    if ips.is_empty() && names.is_empty() {
        let canonical = table
            .column_names()
            .filter_map(|name| ETCD_PATTERNS.classify(name))
            .any(|column| column.node.is_some());
        if canonical {
            debug!("etcd columns already normalized");
            return Ok(table);
        }
    }

    if ips.len() != ETCD_MEMBERS {
        return Err(WrangleError::EtcdNodeCount {
            family: EtcdFamily::ObjectCounts.name(),
            found: ips.len(),
        });
    }
    if names.len() != ETCD_MEMBERS {
        return Err(WrangleError::EtcdNodeCount {
            family: EtcdFamily::FailedProposal.name(),
            found: names.len(),
        });
    }

    let aliases = EtcdAliases::pair(&ips, &names);

    let mut renames = HashMap::new();
    for name in table.column_names() {
        let Some(column) = ETCD_PATTERNS.classify(name) else {
            continue;
        };
        let Some(suffix) = column.suffix else {
            continue;
        };
        match aliases.lookup(suffix) {
            Some(slot) => {
                renames.insert(name.to_string(), format!("{}_{}", slot, column.family.name()));
            }
            None => debug!(column = %name, "No etcd alias matches column"),
        }
    }

    debug!(columns = renames.len(), "Normalizing etcd feature names");
    table.rename(&renames)
}
