//! Configuration surface (spec.md §6).
//!
//! Modeled on `cli/src/nonosctl/daemon.rs`'s `check_config_flag` and
//! `capsule_runtime.rs`'s TOML-at-a-fixed-path persistence: a `serde`
//! struct loadable from a TOML file or built programmatically for tests
//! and the demo binary.

use crate::error::SchedulerError;
use crate::policy::{HwThresholds, Policy};
use serde::{Deserialize, Serialize};

/// Upper bound on the number of engines of a single accelerator kind; a
/// configuration error (not a runtime invariant) if exceeded.
pub const MAX_PER_KIND: usize = 64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed pool size `N` (spec.md §3; default 32).
    pub pool_size: usize,
    pub num_cpu: usize,
    pub num_fft_hw: usize,
    pub num_vit_hw: usize,
    pub num_cv_hw: usize,
    /// Scheduling-thread holdoff when the ready queue is empty or no
    /// placement is available, in microseconds (spec.md §4.5; default 1).
    pub holdoff_usec: u64,
    /// Index into the four selection policies (spec.md §4.5).
    pub policy_index: usize,
    pub fft_hw_threshold: u8,
    pub viterbi_hw_threshold: u8,
    pub cv_hw_threshold: u8,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            pool_size: 32,
            num_cpu: 1,
            num_fft_hw: 1,
            num_vit_hw: 1,
            num_cv_hw: 1,
            holdoff_usec: 1,
            policy_index: 0,
            // 75% HW / 25% CPU when hardware is present, matching the
            // reference's FFT_HW_THRESHOLD=25-as-percent-CPU convention.
            fft_hw_threshold: 75,
            viterbi_hw_threshold: 75,
            cv_hw_threshold: 75,
        }
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, SchedulerError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, SchedulerError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SchedulerError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn policy(&self) -> Result<Policy, SchedulerError> {
        Policy::from_index(self.policy_index)
    }

    pub fn thresholds(&self) -> HwThresholds {
        HwThresholds {
            fft: self.fft_hw_threshold,
            viterbi: self.viterbi_hw_threshold,
            cv: self.cv_hw_threshold,
        }
    }

    /// Validates the configuration-error class from spec.md §7: oversized
    /// per-kind accelerator counts, an out-of-range policy index, and
    /// out-of-range thresholds. Fatal at init if violated.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        use crate::criticality::{AcceleratorKind, JobKind};

        if self.pool_size == 0 {
            return Err(SchedulerError::EmptyPool(self.pool_size));
        }
        for (kind, count) in [
            (AcceleratorKind::Cpu, self.num_cpu),
            (AcceleratorKind::FftHw, self.num_fft_hw),
            (AcceleratorKind::VitHw, self.num_vit_hw),
            (AcceleratorKind::CvHw, self.num_cv_hw),
        ] {
            if count > MAX_PER_KIND {
                return Err(SchedulerError::AcceleratorCountExceedsMax {
                    kind,
                    count,
                    max: MAX_PER_KIND,
                });
            }
        }
        self.policy()?;
        for (job, value) in [
            (JobKind::Fft, self.fft_hw_threshold),
            (JobKind::Viterbi, self.viterbi_hw_threshold),
            (JobKind::Cv, self.cv_hw_threshold),
        ] {
            if value > 100 {
                return Err(SchedulerError::ThresholdOutOfRange { job, value });
            }
        }
        Ok(())
    }
}
