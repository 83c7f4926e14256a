//! Accelerator allocation table (spec.md §4.2).

use crate::block::BlockId;
use crate::criticality::AcceleratorKind;
use crate::timing::OccupancyHistogram;
use std::sync::Mutex;
use std::time::Instant;

struct TableState {
    slots: Vec<Vec<Option<BlockId>>>, // indexed [kind][index]
    histogram: OccupancyHistogram,
}

pub struct AcceleratorTable {
    inner: Mutex<TableState>,
    counts: [usize; 4],
}

fn kind_idx(kind: AcceleratorKind) -> usize {
    match kind {
        AcceleratorKind::Cpu => 0,
        AcceleratorKind::FftHw => 1,
        AcceleratorKind::VitHw => 2,
        AcceleratorKind::CvHw => 3,
    }
}

impl AcceleratorTable {
    pub fn new(num_cpu: usize, num_fft_hw: usize, num_vit_hw: usize, num_cv_hw: usize) -> Self {
        let counts = [num_cpu, num_fft_hw, num_vit_hw, num_cv_hw];
        let slots = counts.iter().map(|&n| vec![None; n]).collect();
        AcceleratorTable {
            inner: Mutex::new(TableState {
                slots,
                histogram: OccupancyHistogram::new(Instant::now()),
            }),
            counts,
        }
    }

    pub fn count(&self, kind: AcceleratorKind) -> usize {
        self.counts[kind_idx(kind)]
    }

    /// First-fit scan in increasing index order. Deterministic, so policies
    /// can reason about ties (spec.md §4.2).
    pub fn find_free(&self, kind: AcceleratorKind) -> Option<usize> {
        let state = self.inner.lock().unwrap();
        state.slots[kind_idx(kind)].iter().position(|s| s.is_none())
    }

    /// Like `find_free`, but also returns the number of slots examined
    /// before the scan stopped (the index of the free slot plus one, or
    /// the kind's full count if none was free) — the reference's `i`
    /// counter from the same scan, accumulated into
    /// `scheduler_decision_checks`.
    pub fn find_free_with_inspected(&self, kind: AcceleratorKind) -> (Option<usize>, usize) {
        let state = self.inner.lock().unwrap();
        let slots = &state.slots[kind_idx(kind)];
        for (i, slot) in slots.iter().enumerate() {
            if slot.is_none() {
                return (Some(i), i + 1);
            }
        }
        (None, slots.len())
    }

    pub fn is_free(&self, kind: AcceleratorKind, index: usize) -> bool {
        let state = self.inner.lock().unwrap();
        state.slots[kind_idx(kind)][index].is_none()
    }

    pub fn occupant(&self, kind: AcceleratorKind, index: usize) -> Option<BlockId> {
        let state = self.inner.lock().unwrap();
        state.slots[kind_idx(kind)][index]
    }

    pub fn occupy(&self, kind: AcceleratorKind, index: usize, block: BlockId) {
        let now = Instant::now();
        let mut state = self.inner.lock().unwrap();
        let slot = &mut state.slots[kind_idx(kind)][index];
        assert!(slot.is_none(), "occupy of already-occupied slot {kind:?}[{index}]");
        *slot = Some(block);
        state.histogram.on_occupy(kind, now);
    }

    /// Release a slot. Fatal if the slot's occupant does not match
    /// `block` (spec.md §4.2: "If mismatched, log and fail fatally" —
    /// this is a deliberate strengthening of `release_accelerator_for_task`
    /// in `scheduler.c`, which only logs and continues on mismatch). Takes
    /// the block pool so the fatal path can dump the requesting block's
    /// fields, mirroring `print_base_metadata_block_contents`.
    pub fn release(&self, kind: AcceleratorKind, index: usize, block: BlockId, pool: &crate::block::BlockPool) {
        let now = Instant::now();
        let mut state = self.inner.lock().unwrap();
        let slot = &mut state.slots[kind_idx(kind)][index];
        if *slot != Some(block) {
            let message = format!(
                "release mismatch on {kind:?}[{index}]: held by {:?}, release requested by {block}",
                *slot
            );
            pool.with_block(block, |b| crate::fatal::dump_block_and_panic(&message, b));
        }
        *slot = None;
        state.histogram.on_release(kind, now);
    }

    pub fn occupancy_snapshot(&self) -> std::collections::HashMap<crate::timing::OccupancyKey, std::time::Duration> {
        self.inner.lock().unwrap().histogram.snapshot()
    }
}
