//! Timing and usage accounting (spec.md §4.6).
//!
//! Every block-state transition stamps wall-clock time into per-block,
//! per-state accumulators. A process-global 4-D histogram indexed by the
//! number of occupied slots of each accelerator kind accumulates the
//! duration spent in each occupancy configuration, charged lazily: each
//! [`OccupancyHistogram::record_transition`] call bills the interval since
//! the last transition to the *previous* configuration, mirroring
//! `scheduler.c`'s `in_use_accel_times_array` bookkeeping.

use crate::criticality::{AcceleratorKind, JobKind};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockTimings {
    pub idle: Duration,
    pub allocated: Duration,
    pub queued: Duration,
    pub running_cpu: Duration,
    pub running_fft_hw: Duration,
    pub running_vit_hw: Duration,
    pub running_cv_hw: Duration,
    pub done: Duration,
}

impl BlockTimings {
    pub fn running_mut(&mut self, kind: AcceleratorKind) -> &mut Duration {
        match kind {
            AcceleratorKind::Cpu => &mut self.running_cpu,
            AcceleratorKind::FftHw => &mut self.running_fft_hw,
            AcceleratorKind::VitHw => &mut self.running_vit_hw,
            AcceleratorKind::CvHw => &mut self.running_cv_hw,
        }
    }
}

/// Per-job-kind, per-engine completion tallies. Grounded in `scheduler.c`'s
/// `fft_timings`/`vit_timings`/`cv_timings` `comp_by` counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelTimings {
    pub completed_on_cpu: u64,
    pub completed_on_hw: u64,
    pub total_busy: Duration,
}

#[derive(Debug, Default)]
pub struct KernelTimingTable {
    table: HashMap<JobKind, KernelTimings>,
}

impl KernelTimingTable {
    pub fn record(&mut self, job: JobKind, kind: AcceleratorKind, elapsed: Duration) {
        let entry = self.table.entry(job).or_default();
        if kind == job.native_hw() {
            entry.completed_on_hw += 1;
        } else {
            entry.completed_on_cpu += 1;
        }
        entry.total_busy += elapsed;
    }

    pub fn get(&self, job: JobKind) -> KernelTimings {
        self.table.get(&job).copied().unwrap_or_default()
    }
}

/// Occupancy configuration: count of slots in use for each accelerator
/// kind at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OccupancyKey {
    pub cpu: usize,
    pub fft_hw: usize,
    pub vit_hw: usize,
    pub cv_hw: usize,
}

impl OccupancyKey {
    pub const ZERO: OccupancyKey = OccupancyKey { cpu: 0, fft_hw: 0, vit_hw: 0, cv_hw: 0 };

    fn bump(self, kind: AcceleratorKind, delta: i8) -> OccupancyKey {
        let mut k = self;
        let slot = match kind {
            AcceleratorKind::Cpu => &mut k.cpu,
            AcceleratorKind::FftHw => &mut k.fft_hw,
            AcceleratorKind::VitHw => &mut k.vit_hw,
            AcceleratorKind::CvHw => &mut k.cv_hw,
        };
        *slot = if delta >= 0 {
            slot.saturating_add(delta as usize)
        } else {
            slot.saturating_sub((-delta) as usize)
        };
        k
    }
}

pub struct OccupancyHistogram {
    current: OccupancyKey,
    last_transition: Instant,
    totals: HashMap<OccupancyKey, Duration>,
}

impl OccupancyHistogram {
    pub fn new(now: Instant) -> Self {
        OccupancyHistogram {
            current: OccupancyKey::ZERO,
            last_transition: now,
            totals: HashMap::new(),
        }
    }

    fn charge_elapsed(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_transition);
        *self.totals.entry(self.current).or_default() += elapsed;
        self.last_transition = now;
    }

    pub fn on_occupy(&mut self, kind: AcceleratorKind, now: Instant) {
        self.charge_elapsed(now);
        self.current = self.current.bump(kind, 1);
    }

    pub fn on_release(&mut self, kind: AcceleratorKind, now: Instant) {
        self.charge_elapsed(now);
        self.current = self.current.bump(kind, -1);
    }

    pub fn snapshot(&self) -> HashMap<OccupancyKey, Duration> {
        self.totals.clone()
    }
}
