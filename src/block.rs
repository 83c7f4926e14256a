//! Metadata-block pool (spec.md §4.1).
//!
//! The free-list is a plain `Vec<usize>` used as a stack: `acquire` pops,
//! `release` pushes. This replaces the reference's intrusive pointer-linked
//! free list with the arena-plus-index style mandated by SPEC_FULL.md §9,
//! though here the "index" structure degenerates to a flat stack since the
//! free list has no ordering requirement.

use crate::criticality::{AcceleratorKind, BlockStatus, Criticality, JobKind};
use crate::critical::CriticalList;
use crate::timing::BlockTimings;
use std::time::{Duration, Instant};

pub type BlockId = usize;

/// Execution-time profile across accelerator kinds. `None` for a kind means
/// the task is infeasible on that kind (the reference's `INFEASIBLE`
/// sentinel).
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskProfile {
    times: [Option<Duration>; 4],
}

impl TaskProfile {
    pub fn new() -> Self {
        TaskProfile::default()
    }

    pub fn with(mut self, kind: AcceleratorKind, time: Duration) -> Self {
        self.times[kind_index(kind)] = Some(time);
        self
    }

    pub fn get(&self, kind: AcceleratorKind) -> Option<Duration> {
        self.times[kind_index(kind)]
    }
}

fn kind_index(kind: AcceleratorKind) -> usize {
    match kind {
        AcceleratorKind::Cpu => 0,
        AcceleratorKind::FftHw => 1,
        AcceleratorKind::VitHw => 2,
        AcceleratorKind::CvHw => 3,
    }
}

/// A single metadata block. Field access is excluded by the ownership
/// handoff described in spec.md §5 (submitter → queue → scheduler →
/// worker → releaser): only one role touches a block's fields at a time,
/// with the pool mutex (or the queue-append edge, or the condvar signal)
/// as the happens-before boundary between roles.
pub struct Block {
    pub id: BlockId,
    pub status: BlockStatus,
    pub job_kind: Option<JobKind>,
    pub criticality: Criticality,
    pub profile: TaskProfile,
    pub accel: Option<(AcceleratorKind, usize)>,
    pub running_start: Option<Instant>,
    pub timings: BlockTimings,
    completion: Option<Box<dyn FnOnce(BlockId) + Send>>,
    last_transition: Instant,
    alloc_count: u64,
    free_count: u64,
}

/// Hand-written: `completion` is a `dyn FnOnce` and doesn't implement
/// `Debug`, so this can't be `#[derive(Debug)]`d directly. Used by
/// `crate::fatal::dump_block_and_panic` to snapshot a block's fields on a
/// fatal invariant violation, mirroring `print_base_metadata_block_contents`.
impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("job_kind", &self.job_kind)
            .field("criticality", &self.criticality)
            .field("profile", &self.profile)
            .field("accel", &self.accel)
            .field("running_start", &self.running_start)
            .field("timings", &self.timings)
            .field("has_completion", &self.completion.is_some())
            .field("alloc_count", &self.alloc_count)
            .field("free_count", &self.free_count)
            .finish()
    }
}

impl Block {
    fn new(id: BlockId, now: Instant) -> Self {
        Block {
            id,
            status: BlockStatus::Free,
            job_kind: None,
            criticality: Criticality::None,
            profile: TaskProfile::new(),
            accel: None,
            running_start: None,
            timings: BlockTimings::default(),
            completion: None,
            last_transition: now,
            alloc_count: 0,
            free_count: 0,
        }
    }

    fn stamp(&mut self, now: Instant, bucket: impl FnOnce(&mut BlockTimings) -> &mut Duration) {
        let elapsed = now.saturating_duration_since(self.last_transition);
        *bucket(&mut self.timings) += elapsed;
        self.last_transition = now;
    }
}

pub struct PoolState {
    pub blocks: Vec<Block>,
    free_list: Vec<BlockId>,
    pub critical_list: CriticalList,
}

/// Fixed-size pool of `N` metadata blocks plus the shared free-list and
/// critical-task list (spec.md §5: these three share a single mutex).
pub struct BlockPool {
    inner: std::sync::Mutex<PoolState>,
    capacity: usize,
}

impl BlockPool {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "pool capacity must be positive");
        let now = Instant::now();
        let blocks: Vec<Block> = (0..capacity).map(|id| Block::new(id, now)).collect();
        let free_list: Vec<BlockId> = (0..capacity).rev().collect();
        BlockPool {
            inner: std::sync::Mutex::new(PoolState {
                blocks,
                free_list,
                critical_list: CriticalList::new(capacity),
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Acquire a free block. Returns `None` on pool exhaustion (soft
    /// failure; callers retry with their own holdoff per spec.md §4.1).
    pub fn acquire(
        &self,
        job_kind: JobKind,
        criticality: Criticality,
        profile: TaskProfile,
    ) -> Option<BlockId> {
        let now = Instant::now();
        let mut state = self.inner.lock().unwrap();
        let id = state.free_list.pop()?;
        {
            let block = &mut state.blocks[id];
            assert_eq!(block.status, BlockStatus::Free, "acquired a non-free block");
            block.stamp(now, |t| &mut t.idle);
            block.status = BlockStatus::Allocated;
            block.job_kind = Some(job_kind);
            block.criticality = criticality;
            block.profile = profile;
            block.accel = None;
            block.running_start = None;
            block.completion = None;
            block.alloc_count += 1;
        }
        if criticality.is_critical() {
            state.critical_list.insert(id);
        }
        Some(id)
    }

    /// Transition a block from ALLOCATED to QUEUED. The caller is
    /// responsible for then appending it to the ready queue; that append
    /// is the happens-before edge the scheduler relies on (spec.md §5).
    pub fn mark_queued(&self, id: BlockId) {
        let now = Instant::now();
        let mut state = self.inner.lock().unwrap();
        let block = &mut state.blocks[id];
        assert_eq!(block.status, BlockStatus::Allocated, "submit of non-allocated block");
        block.stamp(now, |t| &mut t.allocated);
        block.status = BlockStatus::Queued;
    }

    /// Transition a block from QUEUED to RUNNING on the given accelerator.
    /// Called by the scheduling thread after occupying the slot and before
    /// signaling the worker.
    pub fn mark_running(&self, id: BlockId, accel: (AcceleratorKind, usize)) {
        let now = Instant::now();
        let mut state = self.inner.lock().unwrap();
        let block = &mut state.blocks[id];
        assert_eq!(block.status, BlockStatus::Queued, "dispatch of non-queued block");
        block.stamp(now, |t| &mut t.queued);
        block.status = BlockStatus::Running;
        block.accel = Some(accel);
        block.running_start = Some(now);
    }

    /// Transition RUNNING to DONE. The accelerator slot must already have
    /// been released by the caller (see `Scheduler::mark_done`, which does
    /// so before taking the pool mutex, per the lock-order rule in
    /// spec.md §5). Returns the block's completion callback, if any, so
    /// the caller can invoke it after dropping the pool mutex.
    pub fn mark_done(&self, id: BlockId) -> Option<Box<dyn FnOnce(BlockId) + Send>> {
        let now = Instant::now();
        let mut state = self.inner.lock().unwrap();
        let block = &mut state.blocks[id];
        assert_eq!(block.status, BlockStatus::Running, "mark_done of non-running block");
        let kind = block.accel.map(|(k, _)| k).expect("running block missing accelerator");
        block.stamp(now, |t| t.running_mut(kind));
        block.status = BlockStatus::Done;
        block.completion.take()
    }

    /// Register a completion callback on an already-acquired block. Must
    /// be called before `submit`.
    pub fn set_completion(&self, id: BlockId, callback: Box<dyn FnOnce(BlockId) + Send>) {
        let mut state = self.inner.lock().unwrap();
        state.blocks[id].completion = Some(callback);
    }

    /// Release a block back to the free pool. Requires DONE or ALLOCATED
    /// status (the latter covers a task that never ran, e.g. cancelled
    /// before dispatch). Fatal if the block is already FREE (double-free)
    /// or if a critical block cannot be found on the critical list.
    pub fn release(&self, id: BlockId) {
        let now = Instant::now();
        let mut state = self.inner.lock().unwrap();
        {
            let block = &state.blocks[id];
            if block.status == BlockStatus::Free {
                crate::fatal::dump_block_and_panic(&format!("double free of block {id}"), block);
            }
            assert!(
                matches!(block.status, BlockStatus::Done | BlockStatus::Allocated),
                "release of block {id} in status {:?}",
                block.status
            );
        }
        if state.blocks[id].criticality.is_critical() && !state.critical_list.remove(id) {
            let block = &state.blocks[id];
            crate::fatal::dump_block_and_panic(
                &format!("critical block {id} missing from critical list on release"),
                block,
            );
        }
        let block = &mut state.blocks[id];
        block.stamp(now, |t| &mut t.done);
        block.job_kind = None;
        block.accel = None;
        block.running_start = None;
        block.status = BlockStatus::Free;
        block.free_count += 1;
        state.free_list.push(id);
    }

    pub fn with_block<R>(&self, id: BlockId, f: impl FnOnce(&Block) -> R) -> R {
        let state = self.inner.lock().unwrap();
        f(&state.blocks[id])
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&PoolState) -> R) -> R {
        let state = self.inner.lock().unwrap();
        f(&state)
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().unwrap().free_list.len()
    }

    pub fn status_counts(&self) -> [usize; 5] {
        let state = self.inner.lock().unwrap();
        let mut counts = [0usize; 5];
        for block in &state.blocks {
            counts[block.status as usize] += 1;
        }
        counts
    }

    /// Blocks until every block currently on the critical-task list has
    /// reached DONE. Polling, restart-from-head semantics, matching
    /// `scheduler.c`'s `wait_all_critical` (it does not itself release the
    /// blocks it waits on).
    pub fn wait_all_critical(&self, poll_interval: Duration) {
        loop {
            let all_done = {
                let state = self.inner.lock().unwrap();
                state
                    .critical_list
                    .iter()
                    .all(|id| state.blocks[id].status == BlockStatus::Done)
            };
            if all_done {
                return;
            }
            std::thread::sleep(poll_interval);
        }
    }

    /// Blocks until every block in the pool is FREE. Supplemental barrier
    /// from `scheduler.c`'s `wait_all_tasks_finish` (see SPEC_FULL.md).
    pub fn wait_all_tasks_finish(&self, poll_interval: Duration) {
        loop {
            let all_free = {
                let state = self.inner.lock().unwrap();
                state.blocks.iter().all(|b| b.status == BlockStatus::Free)
            };
            if all_free {
                return;
            }
            std::thread::sleep(poll_interval);
        }
    }
}
