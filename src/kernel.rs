//! Kernel dispatch contract (spec.md §4.4, §6).
//!
//! The three compute kernels (FFT, Viterbi, CV) are external collaborators
//! per spec.md §1's Non-goals; what belongs to the core is the fixed
//! per-(job, accelerator) dispatch table and the contract that every
//! kernel invocation ends by calling `mark_done` exactly once, mirroring
//! `cpu_fft_accel.c`'s `execute_cpu_fft_accelerator`, which times the
//! kernel call and then calls `mark_task_done` on every exit path.
//!
//! The kernel bodies here are lightweight stand-ins (a busy-sleep scaled
//! by the block's profile for the accelerator it landed on) standing in
//! for the real signal-processing kernels, which this crate does not
//! implement.

use crate::block::BlockId;
use crate::criticality::{AcceleratorKind, JobKind};
use crate::scheduler::Scheduler;
use std::time::Duration;

/// Runs the kernel for `block` on the accelerator it was placed on, then
/// marks it done. Fatal if the (job, accelerator) pair has no dispatch
/// entry (spec.md §4.4: "reaching them is fatal").
pub fn dispatch(scheduler: &Scheduler, block: BlockId) {
    let (job, kind) = scheduler
        .pool()
        .with_block(block, |b| (b.job_kind, b.accel.map(|(k, _)| k)));
    let job = job.expect("dispatch of block without job kind");
    let kind = kind.expect("dispatch of block without accelerator assignment");

    match (job, kind) {
        (JobKind::Fft, AcceleratorKind::Cpu) | (JobKind::Fft, AcceleratorKind::FftHw) => {
            run_timed(scheduler, block, kind)
        }
        (JobKind::Viterbi, AcceleratorKind::Cpu) | (JobKind::Viterbi, AcceleratorKind::VitHw) => {
            run_timed(scheduler, block, kind)
        }
        (JobKind::Cv, AcceleratorKind::Cpu) | (JobKind::Cv, AcceleratorKind::CvHw) => {
            run_timed(scheduler, block, kind)
        }
        (job, kind) => {
            let message = format!("no kernel dispatch entry for job {job:?} on accelerator {kind:?}");
            scheduler.pool().with_block(block, |b| crate::fatal::dump_block_and_panic(&message, b))
        }
    }
}

fn run_timed(scheduler: &Scheduler, block: BlockId, kind: AcceleratorKind) {
    let budget = scheduler
        .pool()
        .with_block(block, |b| b.profile.get(kind))
        .unwrap_or(Duration::ZERO);
    if !budget.is_zero() {
        std::thread::sleep(budget.min(Duration::from_millis(50)));
    }
    scheduler.mark_done(block);
}
