//! Error types for configuration validation.
//!
//! Runtime invariant violations (double-free, slot mismatch, missing
//! critical-list entry, ...) are not represented here: the reference
//! implementation treats them as unrecoverable and dumps state before
//! exiting the process (`cleanup_and_exit`), which this crate mirrors with
//! [`crate::block::fatal`] and a `panic!`, not a propagated `Result`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("accelerator count for {kind:?} ({count}) exceeds MAX_PER_KIND ({max})")]
    AcceleratorCountExceedsMax {
        kind: crate::criticality::AcceleratorKind,
        count: usize,
        max: usize,
    },

    #[error("policy index {index} is out of range (must be < {count})")]
    PolicyIndexOutOfRange { index: usize, count: usize },

    #[error("pool size {0} must be greater than zero")]
    EmptyPool(usize),

    #[error("hw threshold for {job:?} must be in [0,100], got {value}")]
    ThresholdOutOfRange {
        job: crate::criticality::JobKind,
        value: u8,
    },

    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
