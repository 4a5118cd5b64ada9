//! Compiled column-name patterns
//!
//! Every pattern the pipeline matches column names against is compiled once
//! here and shared, keyed by what it recognises (node tokens, control-plane
//! markers, etcd metric families).

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::borrow::Cow;

/// Leading node token of a node-scoped column, e.g. `node3_` in `node3_cpu_busy`
pub static NODE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^node(\d)_").expect("node prefix pattern"));

/// Any node token inside a column name; the full digit run is captured so
/// that `node1` never matches inside `node10`
pub static NODE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"node(\d+)").expect("node token pattern"));

/// Control-plane indicator column of one node
pub static CONTROL_PLANE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^node(\d)_control_plane$").expect("control-plane pattern"));

/// Token that replaces the node prefix when looking up a column's dtype
pub const CANONICAL_NODE_TOKEN: &str = "node0_";

/// Name used for dtype lookup: the leading node token becomes `node0_`
pub fn canonical_name(column: &str) -> Cow<'_, str> {
    NODE_PREFIX.replace(column, CANONICAL_NODE_TOKEN)
}

/// Exchange two node tokens everywhere in a column name
///
/// Both directions are applied in a single pass, so swapping twice restores
/// the original name.
pub fn swap_node_tokens(column: &str, a: u8, b: u8) -> Cow<'_, str> {
    NODE_TOKEN.replace_all(column, |caps: &Captures<'_>| {
        match caps[1].parse::<u8>() {
            Ok(n) if n == a => format!("node{}", b),
            Ok(n) if n == b => format!("node{}", a),
            _ => caps[0].to_string(),
        }
    })
}

/// etcd metric families whose columns carry node identity as an IP or
/// hostname suffix instead of a node prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EtcdFamily {
    ObjectCounts,
    FailedProposal,
    NetworkPeerRtt,
    FsyncDuration,
}

impl EtcdFamily {
    pub const ALL: [EtcdFamily; 4] = [
        EtcdFamily::ObjectCounts,
        EtcdFamily::FailedProposal,
        EtcdFamily::NetworkPeerRtt,
        EtcdFamily::FsyncDuration,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EtcdFamily::ObjectCounts => "etcd_object_counts",
            EtcdFamily::FailedProposal => "etcd_failed_proposal",
            EtcdFamily::NetworkPeerRtt => "etcd_network_peer_rtt",
            EtcdFamily::FsyncDuration => "etcd_fsync_duration",
        }
    }
}

/// A column recognised as belonging to an etcd family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtcdColumn<'a> {
    pub family: EtcdFamily,
    /// Node prefix digit, if the column already carries one
    pub node: Option<u8>,
    /// Identity suffix (IP or hostname fragment), if any
    pub suffix: Option<&'a str>,
}

/// Per-family patterns of the form `[node<d>_]<family>[_<suffix>]`
#[derive(Debug)]
pub struct EtcdPatterns {
    families: Vec<(EtcdFamily, Regex)>,
}

impl EtcdPatterns {
    pub fn new() -> Self {
        let families = EtcdFamily::ALL
            .iter()
            .map(|family| {
                let pattern = format!(r"^(?:node(\d)_)?{}(?:_(.+))?$", family.name());
                (*family, Regex::new(&pattern).expect("etcd family pattern"))
            })
            .collect();
        Self { families }
    }

    /// Classify a column name
    pub fn classify<'a>(&self, column: &'a str) -> Option<EtcdColumn<'a>> {
        self.families.iter().find_map(|(family, regex)| {
            regex.captures(column).map(|caps| EtcdColumn {
                family: *family,
                node: caps.get(1).and_then(|m| m.as_str().parse().ok()),
                suffix: caps.get(2).map(|m| m.as_str()),
            })
        })
    }
}

impl Default for EtcdPatterns {
    fn default() -> Self {
        Self::new()
    }
}

/// Global shared instance
pub static ETCD_PATTERNS: Lazy<EtcdPatterns> = Lazy::new(EtcdPatterns::new);
