//! Ties the metadata-block pool, accelerator table, and ready queue
//! together with the worker threads and the scheduling thread (spec.md
//! §4.4, §4.5). Concurrency idiom (`Arc<Mutex<_>>` shared state plus
//! `thread::spawn` monitor loops, `thread::sleep`-driven holdoff) is
//! grounded in `cli/src/nonosctl/mesh.rs`'s `CapsuleRuntime` and
//! `daemon.rs`'s `start_daemon` supervisor loop.

use crate::accel::AcceleratorTable;
use crate::block::{BlockId, BlockPool, TaskProfile};
use crate::config::SchedulerConfig;
use crate::criticality::{Criticality, JobKind};
use crate::policy::{HwThresholds, Policy, PolicyContext};
use crate::queue::ReadyQueue;
use crate::timing::{KernelTimingTable, KernelTimings};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

struct WorkerSignal {
    ready: bool,
    shutdown: bool,
}

/// Snapshot of scheduler-wide counters, exposed for diagnostics and tests.
/// `decisions`/`decision_checks` supplement spec.md (see SPEC_FULL.md) from
/// `scheduler.c`'s `scheduler_decisions`/`scheduler_decision_checks`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedulerStats {
    pub decisions: u64,
    pub decision_checks: u64,
}

pub struct Scheduler {
    pool: BlockPool,
    table: AcceleratorTable,
    queue: ReadyQueue,
    policy: Mutex<Policy>,
    holdoff: Mutex<Duration>,
    thresholds: HwThresholds,
    worker_signals: Vec<(Mutex<WorkerSignal>, Condvar)>,
    scheduling_lock: Mutex<()>,
    decisions: AtomicU64,
    decision_checks: AtomicU64,
    kernel_timings: Mutex<KernelTimingTable>,
    shutting_down: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(config: &SchedulerConfig) -> Result<Arc<Self>, crate::error::SchedulerError> {
        config.validate()?;
        let capacity = config.pool_size;
        let worker_signals = (0..capacity)
            .map(|_| (Mutex::new(WorkerSignal { ready: false, shutdown: false }), Condvar::new()))
            .collect();

        let scheduler = Arc::new(Scheduler {
            pool: BlockPool::new(capacity),
            table: AcceleratorTable::new(
                config.num_cpu,
                config.num_fft_hw,
                config.num_vit_hw,
                config.num_cv_hw,
            ),
            queue: ReadyQueue::new(capacity),
            policy: Mutex::new(config.policy()?),
            holdoff: Mutex::new(Duration::from_micros(config.holdoff_usec)),
            thresholds: config.thresholds(),
            worker_signals,
            scheduling_lock: Mutex::new(()),
            decisions: AtomicU64::new(0),
            decision_checks: AtomicU64::new(0),
            kernel_timings: Mutex::new(KernelTimingTable::default()),
            shutting_down: AtomicBool::new(false),
            threads: Mutex::new(Vec::new()),
        });

        scheduler.clone().spawn_workers();
        scheduler.clone().spawn_scheduling_thread();
        Ok(scheduler)
    }

    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    pub fn table(&self) -> &AcceleratorTable {
        &self.table
    }

    pub fn set_policy(&self, policy: Policy) {
        *self.policy.lock().unwrap() = policy;
    }

    pub fn set_holdoff_usec(&self, usec: u64) {
        *self.holdoff.lock().unwrap() = Duration::from_micros(usec);
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            decisions: self.decisions.load(Ordering::Relaxed),
            decision_checks: self.decision_checks.load(Ordering::Relaxed),
        }
    }

    /// Acquire a free block (spec.md §6 submitter API). `None` on pool
    /// exhaustion; callers retry with their own holdoff.
    pub fn acquire(
        &self,
        job: JobKind,
        criticality: Criticality,
        profile: TaskProfile,
    ) -> Option<BlockId> {
        self.pool.acquire(job, criticality, profile)
    }

    /// Optionally register a completion callback, invoked after the
    /// block's kernel finishes and the block is marked DONE.
    pub fn set_completion(&self, block: BlockId, callback: impl FnOnce(BlockId) + Send + 'static) {
        self.pool.set_completion(block, Box::new(callback));
    }

    /// Transition ALLOCATED to QUEUED and append to the ready queue. The
    /// append is the happens-before edge the scheduling thread relies on.
    pub fn submit(&self, block: BlockId) {
        self.pool.mark_queued(block);
        self.queue.push_back(block);
    }

    pub fn release(&self, block: BlockId) {
        self.pool.release(block);
    }

    pub fn wait_all_critical(&self) {
        self.pool.wait_all_critical(Duration::from_micros(50));
    }

    pub fn wait_all_tasks_finish(&self) {
        self.pool.wait_all_tasks_finish(Duration::from_micros(50));
    }

    /// Called by a kernel (`crate::kernel::dispatch`) on every exit path.
    /// Releases the accelerator slot first, then marks the block DONE,
    /// then fires the completion callback — all outside the pool mutex at
    /// the point the accelerator table is touched, per the lock-order rule
    /// in spec.md §5 ("never hold the pool mutex while taking any other").
    pub fn mark_done(&self, block: BlockId) {
        let (job, kind, index, elapsed) = self.pool.with_block(block, |b| {
            let (kind, index) = b.accel.expect("mark_done of block without accelerator assignment");
            let elapsed = b.running_start.map(|s| s.elapsed()).unwrap_or_default();
            (b.job_kind.expect("mark_done of block without job kind"), kind, index, elapsed)
        });
        self.table.release(kind, index, block, &self.pool);
        self.kernel_timings.lock().unwrap().record(job, kind, elapsed);
        let completion = self.pool.mark_done(block);
        if let Some(completion) = completion {
            completion(block);
        }
    }

    /// Per-job-kind, CPU-vs-hardware completion tallies (SPEC_FULL.md
    /// "Per-kernel fine-grained timing counters").
    pub fn kernel_timings(&self, job: JobKind) -> KernelTimings {
        self.kernel_timings.lock().unwrap().get(job)
    }

    fn spawn_workers(self: Arc<Self>) {
        let mut handles = self.threads.lock().unwrap();
        for id in 0..self.pool.capacity() {
            let scheduler = Arc::clone(&self);
            handles.push(std::thread::spawn(move || scheduler.worker_loop(id)));
        }
    }

    fn worker_loop(self: Arc<Self>, id: BlockId) {
        loop {
            let (lock, cvar) = &self.worker_signals[id];
            let mut signal = lock.lock().unwrap();
            while !signal.ready && !signal.shutdown {
                signal = cvar.wait(signal).unwrap();
            }
            if signal.shutdown {
                return;
            }
            signal.ready = false;
            drop(signal);

            crate::kernel::dispatch(&self, id);
        }
    }

    fn spawn_scheduling_thread(self: Arc<Self>) {
        let scheduler = Arc::clone(&self);
        self.threads
            .lock()
            .unwrap()
            .push(std::thread::spawn(move || scheduler.scheduling_loop()));
    }

    fn scheduling_loop(self: Arc<Self>) {
        loop {
            if self.shutting_down.load(Ordering::Relaxed) {
                return;
            }
            let _exclusion = self.scheduling_lock.lock().unwrap();

            if self.queue.is_empty() {
                drop(_exclusion);
                std::thread::sleep(*self.holdoff.lock().unwrap());
                continue;
            }

            let ctx = PolicyContext {
                pool: &self.pool,
                table: &self.table,
                queue: &self.queue,
                thresholds: self.thresholds,
            };
            let policy = *self.policy.lock().unwrap();
            let (placement, inspected) = crate::policy::select(&ctx, policy);
            self.decision_checks.fetch_add(inspected as u64, Ordering::Relaxed);
            drop(_exclusion);

            let Some(placement) = placement else {
                std::thread::sleep(*self.holdoff.lock().unwrap());
                continue;
            };

            self.table.occupy(placement.kind, placement.index, placement.block);
            self.queue.remove(placement.entry);
            self.pool.mark_running(placement.block, (placement.kind, placement.index));
            self.decisions.fetch_add(1, Ordering::Relaxed);

            tracing::info!(
                block_id = placement.block,
                accel_kind = ?placement.kind,
                accel_index = placement.index,
                "dispatched block"
            );

            self.signal_worker(placement.block);
        }
    }

    fn signal_worker(&self, block: BlockId) {
        let (lock, cvar) = &self.worker_signals[block];
        let mut signal = lock.lock().unwrap();
        signal.ready = true;
        cvar.notify_one();
    }

    /// Cancels all worker threads and the scheduling thread and joins
    /// them. Idiomatic Rust cannot `pthread_cancel` a thread the way
    /// `scheduler.c`'s `cleanup_state` does, so shutdown is cooperative:
    /// each worker's condvar is signaled with its `shutdown` flag set.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Relaxed);
        for (lock, cvar) in &self.worker_signals {
            let mut signal = lock.lock().unwrap();
            signal.shutdown = true;
            cvar.notify_all();
        }
        let mut handles = self.threads.lock().unwrap();
        for handle in handles.drain(..) {
            let _ = handle.join();
        }
    }
}
