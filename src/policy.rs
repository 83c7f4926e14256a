//! Accelerator-selection policies (spec.md §4.5).
//!
//! Grounded in `scheduler.c`'s `pick_accel_and_wait_for_available`,
//! `fastest_to_slowest_first_available`, `fastest_finish_time_first`, and
//! `fastest_finish_time_first_queued`. The busy-wait loops from the
//! reference are kept (spec.md §9 notes they could be replaced with a
//! condvar but does not require it), bounded by a short sleep between
//! polls so the scheduling thread doesn't peg a core.

use crate::accel::AcceleratorTable;
use crate::block::{BlockId, BlockPool};
use crate::criticality::{AcceleratorKind, JobKind};
use crate::error::SchedulerError;
use crate::queue::{EntryId, ReadyQueue};
use rand::Rng;
use std::collections::HashMap;
use std::time::{Duration, Instant};

const SPIN_INTERVAL: Duration = Duration::from_micros(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    PickAccelAndWait,
    FastestToSlowestFirstAvailable,
    FastestFinishTimeFirst,
    FastestFinishTimeFirstQueued,
}

impl Policy {
    pub const COUNT: usize = 4;

    /// Strict `>=` bounds check (SPEC_FULL.md §9 Open Question (c): the
    /// reference uses `>`, which admits one out-of-range index).
    pub fn from_index(index: usize) -> Result<Self, SchedulerError> {
        if index >= Self::COUNT {
            return Err(SchedulerError::PolicyIndexOutOfRange { index, count: Self::COUNT });
        }
        Ok(match index {
            0 => Policy::PickAccelAndWait,
            1 => Policy::FastestToSlowestFirstAvailable,
            2 => Policy::FastestFinishTimeFirst,
            _ => Policy::FastestFinishTimeFirstQueued,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub entry: EntryId,
    pub block: BlockId,
    pub kind: AcceleratorKind,
    pub index: usize,
}

/// Per-job hardware-assignment thresholds in `[0,100]`, used by
/// Pick-Accel-And-Wait (spec.md §4.5.1, §6).
#[derive(Debug, Clone, Copy)]
pub struct HwThresholds {
    pub fft: u8,
    pub viterbi: u8,
    pub cv: u8,
}

impl HwThresholds {
    pub fn for_job(&self, job: JobKind) -> u8 {
        match job {
            JobKind::Fft => self.fft,
            JobKind::Viterbi => self.viterbi,
            JobKind::Cv => self.cv,
        }
    }
}

pub struct PolicyContext<'a> {
    pub pool: &'a BlockPool,
    pub table: &'a AcceleratorTable,
    pub queue: &'a ReadyQueue,
    pub thresholds: HwThresholds,
}

/// Candidate accelerator kinds for a job, in scan order: job-native
/// hardware first (if its count is nonzero and the profile supports it),
/// then CPU — matching the reference's CPU-as-fallback convention, except
/// when the profile marks CPU infeasible (the CV-forced-to-hardware case).
fn candidate_kinds(ctx: &PolicyContext, block: BlockId, job: JobKind) -> Vec<AcceleratorKind> {
    let profile = ctx.pool.with_block(block, |b| b.profile);
    let mut out = Vec::with_capacity(2);
    let hw = job.native_hw();
    if ctx.table.count(hw) > 0 && profile.get(hw).is_some() {
        out.push(hw);
    }
    if ctx.table.count(AcceleratorKind::Cpu) > 0 && profile.get(AcceleratorKind::Cpu).is_some() {
        out.push(AcceleratorKind::Cpu);
    }
    out
}

fn busy_wait_until_free(table: &AcceleratorTable, kind: AcceleratorKind, index: usize) {
    while !table.is_free(kind, index) {
        std::thread::sleep(SPIN_INTERVAL);
    }
}

/// §4.5.1: propose a kind via a per-job Bernoulli draw, then busy-wait for
/// a free slot of that kind. Returns the number of slots scanned across
/// every rescan performed before a slot was claimed, accumulated into
/// `scheduler_decision_checks` by the caller.
fn pick_accel_and_wait(
    ctx: &PolicyContext,
    entry: EntryId,
    block: BlockId,
    job: JobKind,
) -> (Placement, usize) {
    let candidates = candidate_kinds(ctx, block, job);
    let hw = job.native_hw();
    let threshold = ctx.thresholds.for_job(job);
    let propose_hw = candidates.contains(&hw)
        && (threshold >= 100 || rand::thread_rng().gen_range(0..100) < threshold);
    let kind = if propose_hw {
        hw
    } else {
        *candidates.iter().find(|&&k| k != hw).unwrap_or(&hw)
    };

    let mut inspected = 0usize;
    loop {
        let (found, scanned) = ctx.table.find_free_with_inspected(kind);
        inspected += scanned;
        if let Some(index) = found {
            busy_wait_until_free(ctx.table, kind, index);
            if ctx.table.is_free(kind, index) {
                return (Placement { entry, block, kind, index }, inspected);
            }
        }
        std::thread::sleep(SPIN_INTERVAL);
    }
}

/// §4.5.2: try hardware first, fall through to CPU, retry from the top
/// until something is free. Never reorders the queue.
fn fastest_to_slowest_first_available(
    ctx: &PolicyContext,
    entry: EntryId,
    block: BlockId,
    job: JobKind,
) -> (Placement, usize) {
    let candidates = candidate_kinds(ctx, block, job);
    let mut inspected = 0usize;
    loop {
        for &kind in &candidates {
            let (found, scanned) = ctx.table.find_free_with_inspected(kind);
            inspected += scanned;
            if let Some(index) = found {
                return (Placement { entry, block, kind, index }, inspected);
            }
        }
        std::thread::sleep(SPIN_INTERVAL);
    }
}

/// Estimated remaining time for the block currently occupying `(kind,
/// index)`, saturated at zero (SPEC_FULL.md §9 Open Question (a): the
/// reference performs unguarded subtraction here).
fn remaining_time(pool: &BlockPool, occupant: BlockId, kind: AcceleratorKind, now: Instant) -> Duration {
    pool.with_block(occupant, |b| {
        let profile = b.profile.get(kind).unwrap_or(Duration::ZERO);
        let elapsed = b.running_start.map(|s| now.saturating_duration_since(s)).unwrap_or(Duration::ZERO);
        profile.saturating_sub(elapsed)
    })
}

/// `committed_wait` holds a per-`(kind, index)` extension, looked up for
/// the specific candidate slot being scored — never applied uniformly
/// across candidates (see `best_slot`).
fn estimated_finish_time(
    ctx: &PolicyContext,
    block: BlockId,
    kind: AcceleratorKind,
    index: usize,
    committed_wait: &HashMap<(AcceleratorKind, usize), Duration>,
    now: Instant,
) -> Option<Duration> {
    let profile = ctx.pool.with_block(block, |b| b.profile.get(kind))?;
    let wait = match ctx.table.occupant(kind, index) {
        None => Duration::ZERO,
        Some(occupant) => remaining_time(ctx.pool, occupant, kind, now),
    };
    let extra = committed_wait.get(&(kind, index)).copied().unwrap_or(Duration::ZERO);
    Some(profile + wait + extra)
}

/// §4.5.3: minimum estimated finish time across candidate kinds, ties
/// broken by scan order (kind order, then increasing index). Busy-waits
/// for that specific slot once chosen.
fn fastest_finish_time_first(
    ctx: &PolicyContext,
    entry: EntryId,
    block: BlockId,
    job: JobKind,
) -> (Placement, usize) {
    let (kind, index, inspected) = best_slot(ctx, block, job, &HashMap::new());
    busy_wait_until_free(ctx.table, kind, index);
    (Placement { entry, block, kind, index }, inspected)
}

/// Scans every candidate `(kind, index)` slot, scoring each with
/// `committed_wait`'s entry for *that specific slot* (§4.5.4 requires the
/// lookahead extension to land only on the slot it was accumulated
/// against, never uniformly on every candidate — otherwise it can never
/// change the arg-min). Returns the winning slot plus the number of slots
/// examined, for `scheduler_decision_checks`.
fn best_slot(
    ctx: &PolicyContext,
    block: BlockId,
    job: JobKind,
    committed_wait: &HashMap<(AcceleratorKind, usize), Duration>,
) -> (AcceleratorKind, usize, usize) {
    let now = Instant::now();
    let candidates = candidate_kinds(ctx, block, job);
    let mut best: Option<(Duration, AcceleratorKind, usize)> = None;
    let mut inspected = 0usize;
    for &kind in &candidates {
        let count = ctx.table.count(kind);
        inspected += count;
        for index in 0..count {
            if let Some(finish) = estimated_finish_time(ctx, block, kind, index, committed_wait, now) {
                if best.map(|(b, _, _)| finish < b).unwrap_or(true) {
                    best = Some((finish, kind, index));
                }
            }
        }
    }
    let (_, kind, index) = best.expect("no feasible accelerator for block");
    (kind, index, inspected)
}

/// §4.5.4: traverse the ready queue from head, extending each unplaced
/// entry's finish-time estimate for `(k, i)` by the sum of `profile[k]`
/// for every earlier-in-queue entry already aimed at that same slot, then
/// re-picking its best slot under that extension. Returns the first entry
/// whose best slot is free, or `None` if none is (the caller re-scans
/// after a holdoff), plus the total number of slots examined.
fn fastest_finish_time_first_queued(ctx: &PolicyContext) -> (Option<Placement>, usize) {
    let snapshot = ctx.queue.snapshot();
    let mut committed_wait: HashMap<(AcceleratorKind, usize), Duration> = HashMap::new();
    let mut inspected = 0usize;

    for (entry, block) in snapshot {
        let job = ctx.pool.with_block(block, |b| b.job_kind).expect("queued block missing job kind");
        let base = match ctx.queue.cached_best(entry) {
            Some(b) => b,
            None => {
                let (kind, index, scanned) = best_slot(ctx, block, job, &HashMap::new());
                inspected += scanned;
                ctx.queue.cache_best(entry, (kind, index));
                (kind, index)
            }
        };
        let has_extension = committed_wait.get(&base).copied().unwrap_or(Duration::ZERO) > Duration::ZERO;
        let (kind, index) = if has_extension {
            let (kind, index, scanned) = best_slot(ctx, block, job, &committed_wait);
            inspected += scanned;
            ctx.queue.cache_best(entry, (kind, index));
            (kind, index)
        } else {
            base
        };
        if ctx.table.is_free(kind, index) {
            return (Some(Placement { entry, block, kind, index }), inspected);
        }
        let profile = ctx.pool.with_block(block, |b| b.profile.get(kind)).unwrap_or(Duration::ZERO);
        *committed_wait.entry((kind, index)).or_insert(Duration::ZERO) += profile;
    }
    (None, inspected)
}

/// Select a placement for the current policy, plus the number of
/// candidate `(kind, index)` slots examined while doing so (accumulated
/// into `scheduler_decision_checks` by the caller, matching the
/// reference's `scheduler_decision_checks += ...` accounting). `PickAccelAndWait`,
/// `FastestToSlowestFirstAvailable`, and `FastestFinishTimeFirst` always
/// consider the ready-queue head and always return `Some` (they busy-wait
/// rather than returning `None`). Only the queued variant may return
/// `None`.
pub fn select(ctx: &PolicyContext, policy: Policy) -> (Option<Placement>, usize) {
    if policy == Policy::FastestFinishTimeFirstQueued {
        return fastest_finish_time_first_queued(ctx);
    }
    let Some((entry, block)) = ctx.queue.head() else {
        return (None, 0);
    };
    let job = ctx.pool.with_block(block, |b| b.job_kind).expect("queued block missing job kind");
    let (placement, inspected) = match policy {
        Policy::PickAccelAndWait => pick_accel_and_wait(ctx, entry, block, job),
        Policy::FastestToSlowestFirstAvailable => {
            fastest_to_slowest_first_available(ctx, entry, block, job)
        }
        Policy::FastestFinishTimeFirst => fastest_finish_time_first(ctx, entry, block, job),
        Policy::FastestFinishTimeFirstQueued => unreachable!(),
    };
    (Some(placement), inspected)
}
