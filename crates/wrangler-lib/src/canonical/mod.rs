//! Column canonicalization
//!
//! Rewrites raw collection-run column names so that node-scoped columns are
//! keyed by logical role rather than physical node index:
//! - control-plane nodes are moved into slots node1-node3
//! - etcd metrics carrying IP/hostname suffixes become `node<d>_<family>`

mod etcd;
mod roles;


pub use etcd::{normalize_etcd, EtcdAliases, ETCD_MEMBERS};
pub use roles::{control_plane_slots, reconcile_roles, swap_nodes};

use crate::error::Result;
use crate::table::Table;
use tracing::debug;

/// Run role reconciliation followed by etcd suffix normalization
pub fn canonicalize(table: Table) -> Result<Table> {
    debug!(columns = table.width(), "Canonicalizing column names");
    let table = reconcile_roles(table)?;
    normalize_etcd(table)
}
