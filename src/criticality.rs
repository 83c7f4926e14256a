//! Core enums shared across the crate: job kinds, accelerator kinds,
//! criticality levels, and block lifecycle status (spec.md §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    Fft,
    Viterbi,
    Cv,
}

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Fft, JobKind::Viterbi, JobKind::Cv];

    /// The accelerator kind with hardware support for this job, if any.
    pub fn native_hw(self) -> AcceleratorKind {
        match self {
            JobKind::Fft => AcceleratorKind::FftHw,
            JobKind::Viterbi => AcceleratorKind::VitHw,
            JobKind::Cv => AcceleratorKind::CvHw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcceleratorKind {
    Cpu,
    FftHw,
    VitHw,
    CvHw,
}

impl AcceleratorKind {
    pub const ALL: [AcceleratorKind; 4] = [
        AcceleratorKind::Cpu,
        AcceleratorKind::FftHw,
        AcceleratorKind::VitHw,
        AcceleratorKind::CvHw,
    ];
}

/// Mixed-criticality level. Ordered: only `>= Critical` participates in the
/// critical-task list and the `wait_all_critical` barrier — see
/// SPEC_FULL.md §9 Open Question (b); the reference compares against the
/// raw literal `3` instead of a named constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Criticality {
    None,
    Base,
    Elevated,
    Critical,
}

impl Criticality {
    pub fn is_critical(self) -> bool {
        self >= Criticality::Critical
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockStatus {
    Free,
    Allocated,
    Queued,
    Running,
    Done,
}
