//! Node role reconciliation
//!
//! Node slots 1-3 must hold the control-plane nodes of a dataset. Collection
//! runs number physical nodes arbitrarily, so a control-plane node may show
//! up in a worker slot; its columns are exchanged wholesale with the empty
//! control-plane slot.

use crate::error::{Result, WrangleError};
use crate::models::NodeSlot;
use crate::patterns::{swap_node_tokens, CONTROL_PLANE};
use crate::table::Table;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Slots that carry a `node<d>_control_plane` column
pub fn control_plane_slots(table: &Table) -> BTreeSet<NodeSlot> {
    table
        .column_names()
        .filter_map(|name| CONTROL_PLANE.captures(name))
        .filter_map(|caps| caps[1].parse().ok())
        .map(NodeSlot)
        .collect()
}

/// Exchange the identities of two nodes across every column name
///
/// Columns naming `a` are renamed to `b` and vice versa through one atomic
/// rename map. Swapping the same pair twice restores the original table.
pub fn swap_nodes(table: Table, a: NodeSlot, b: NodeSlot) -> Result<Table> {
    let renames: HashMap<String, String> = table
        .column_names()
        .filter_map(|name| {
            let swapped = swap_node_tokens(name, a.0, b.0);
            (swapped != name).then(|| (name.to_string(), swapped.into_owned()))
        })
        .collect();
    debug!(%a, %b, columns = renames.len(), "Swapping node columns");
    table.rename(&renames)
}

/// Move control-plane nodes into slots 1-3
///
/// A table whose slots 1-3 already carry the control-plane indicator is
/// returned unchanged. Otherwise each missing control-plane slot is paired
/// with a worker slot (4-6) that carries the indicator; the counts must
/// match.
pub fn reconcile_roles(table: Table) -> Result<Table> {
    let present = control_plane_slots(&table);
    let missing: Vec<NodeSlot> = NodeSlot::CONTROL_PLANE
        .into_iter()
        .filter(|slot| !present.contains(slot))
        .collect();

    if missing.is_empty() {
        debug!("Node ordering already canonical");
        return Ok(table);
    }

    let donors: Vec<NodeSlot> = NodeSlot::WORKER
        .into_iter()
        .filter(|slot| present.contains(slot))
        .collect();

    if missing.len() != donors.len() {
        return Err(WrangleError::ControlPlaneMismatch { missing, donors });
    }

    info!(?missing, ?donors, "Reassigning control-plane node slots");
    missing
        .into_iter()
        .zip(donors)
        .try_fold(table, |table, (slot, donor)| swap_nodes(table, slot, donor))
}
