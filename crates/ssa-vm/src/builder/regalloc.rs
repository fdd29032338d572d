//! Register allocation for the values the analyser found (§4.1).
//!
//! Constants and function arguments are pinned to their own slots up front
//! by the caller (`builder::translate`) and never reach this module — they
//! are never evicted, matching the original's treatment of them as fixed
//! storage rather than allocation candidates. This module only places the
//! remaining "other values": either one slot per value (`Naive`) or by
//! greedy linear-scan reuse (`Greedy`), using the same `BTreeSet<(end, slot)>`
//! active-interval technique a linear-scan physical register allocator would
//! use for physical register assignment.

use std::collections::{BTreeSet, HashMap};

use crate::ir::ValueId;

use super::analyser::Analysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegisterAllocator {
    Naive,
    #[default]
    Greedy,
}

#[derive(Debug, Clone)]
pub struct Allocation {
    pub slot_of: HashMap<ValueId, u32>,
    /// One past the highest slot index used by this allocation.
    pub slot_count: u32,
}

/// Allocates slots for `values` (already deduplicated, alias-resolved,
/// excluding constants and arguments), starting at `starting_slot`.
#[must_use]
pub fn allocate(values: &[ValueId], analysis: &Analysis, starting_slot: u32, strategy: RegisterAllocator) -> Allocation {
    let mut ordered: Vec<ValueId> = values.to_vec();
    ordered.sort_by_key(|v| analysis.liveness.get(v).map_or(0, |l| l.first));
    ordered.dedup();

    match strategy {
        RegisterAllocator::Naive => allocate_naive(&ordered, starting_slot),
        RegisterAllocator::Greedy => allocate_greedy(&ordered, analysis, starting_slot),
    }
}

fn allocate_naive(ordered: &[ValueId], starting_slot: u32) -> Allocation {
    let mut slot_of = HashMap::new();
    let mut next = starting_slot;
    for &v in ordered {
        slot_of.insert(v, next);
        next += 1;
    }
    Allocation { slot_of, slot_count: next }
}

fn allocate_greedy(ordered: &[ValueId], analysis: &Analysis, starting_slot: u32) -> Allocation {
    let mut slot_of = HashMap::new();
    // (end, slot) of currently-live values, ordered by expiry.
    let mut active: BTreeSet<(u32, u32)> = BTreeSet::new();
    let mut free_slots: Vec<u32> = Vec::new();
    let mut next_slot = starting_slot;
    let mut high_water = starting_slot;

    for &v in ordered {
        let Some(live) = analysis.liveness.get(&v) else { continue };

        // Expire anything that ended at or before this value's first use/def.
        while let Some(&(end, slot)) = active.iter().next() {
            if end > live.first {
                break;
            }
            active.remove(&(end, slot));
            free_slots.push(slot);
        }

        let slot = free_slots.pop().unwrap_or_else(|| {
            let s = next_slot;
            next_slot += 1;
            s
        });
        high_water = high_water.max(slot + 1);
        slot_of.insert(v, slot);
        active.insert((live.last, slot));
    }

    Allocation { slot_of, slot_count: high_water }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::analyser::Liveness;
    use std::collections::HashMap as Map;

    fn analysis_from(liveness: Map<ValueId, Liveness>) -> Analysis {
        Analysis {
            rpo: vec![],
            terminator_index: Map::new(),
            block_start_index: Map::new(),
            liveness,
            aliases: Map::new(),
            value_order: vec![],
        }
    }

    #[test]
    fn naive_gives_every_value_its_own_slot() {
        let mut liveness = Map::new();
        liveness.insert(ValueId(1), Liveness { first: 1, last: 2 });
        liveness.insert(ValueId(2), Liveness { first: 2, last: 3 });
        let a = analysis_from(liveness);
        let alloc = allocate(&[ValueId(1), ValueId(2)], &a, 5, RegisterAllocator::Naive);
        assert_eq!(alloc.slot_of.len(), 2);
        assert_eq!(alloc.slot_count, 7);
    }

    #[test]
    fn greedy_reuses_a_slot_after_its_occupant_dies() {
        let mut liveness = Map::new();
        liveness.insert(ValueId(1), Liveness { first: 1, last: 2 });
        liveness.insert(ValueId(2), Liveness { first: 3, last: 4 });
        let a = analysis_from(liveness);
        let alloc = allocate(&[ValueId(1), ValueId(2)], &a, 5, RegisterAllocator::Greedy);
        assert_eq!(alloc.slot_of[&ValueId(1)], alloc.slot_of[&ValueId(2)]);
        assert_eq!(alloc.slot_count, 6);
    }

    #[test]
    fn greedy_keeps_overlapping_values_in_distinct_slots() {
        let mut liveness = Map::new();
        liveness.insert(ValueId(1), Liveness { first: 1, last: 5 });
        liveness.insert(ValueId(2), Liveness { first: 2, last: 3 });
        let a = analysis_from(liveness);
        let alloc = allocate(&[ValueId(1), ValueId(2)], &a, 5, RegisterAllocator::Greedy);
        assert_ne!(alloc.slot_of[&ValueId(1)], alloc.slot_of[&ValueId(2)]);
    }
}
