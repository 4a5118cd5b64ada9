//! Node permutation expansion
//!
//! Augments a canonicalized dataset with copies whose interchangeable nodes
//! have been relabelled. For every pair of control-plane slots the swap is
//! applied on top of all previous swaps, and within it every pair of worker
//! slots is swapped in turn, each step contributing one full copy of the
//! rows. With 3 control-plane pairs and 3 worker pairs the output holds
//! `rows * (3 * 3 + 1)` rows.

use crate::canonical::swap_nodes;
use crate::error::Result;
use crate::models::NodeSlot;
use crate::table::Table;
use tracing::debug;

/// All unordered pairs of the given slots, in lexicographic order
pub fn slot_pairs(slots: &[NodeSlot]) -> Vec<(NodeSlot, NodeSlot)> {
    let mut pairs = Vec::new();
    for (i, a) in slots.iter().enumerate() {
        for b in &slots[i + 1..] {
            pairs.push((*a, *b));
        }
    }
    pairs
}

/// Number of copies (including the original) produced by [`expand`]
pub fn expansion_factor() -> usize {
    let control = slot_pairs(&NodeSlot::CONTROL_PLANE).len();
    let workers = slot_pairs(&NodeSlot::WORKER).len();
    control * workers + 1
}

/// Concatenate the base table with every cumulative node relabelling
///
/// Copies may differ in column sets (e.g. a three-node cluster has no
/// worker columns to swap); the result is the column union with nulls
/// for cells a copy lacks.
pub fn expand(table: Table) -> Result<Table> {
    let rows = table.height();
    let control_pairs = slot_pairs(&NodeSlot::CONTROL_PLANE);
    let worker_pairs = slot_pairs(&NodeSlot::WORKER);

    let mut copies = Vec::with_capacity(control_pairs.len() * worker_pairs.len() + 1);
    copies.push(table.clone());

    let mut current = table;
    for (c1, c2) in &control_pairs {
        current = swap_nodes(current, *c1, *c2)?;
        debug!(%c1, %c2, "Swapped control-plane nodes");
        for (w1, w2) in &worker_pairs {
            current = swap_nodes(current, *w1, *w2)?;
            debug!(%w1, %w2, "Swapped worker nodes");
            copies.push(current.clone());
        }
    }

    let expanded = Table::concat(copies)?;
    debug!(
        rows_in = rows,
        rows_out = expanded.height(),
        "Completed node combination"
    );
    Ok(expanded)
}
