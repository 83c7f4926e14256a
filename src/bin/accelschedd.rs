// src/bin/accelschedd.rs — scenario-driving demo binary.
//
// Plays the role spec.md calls "the trace/simulation driver": out of the
// scheduler core's own scope, but required ambient surface for a runnable
// crate. Modeled on `cli/src/main.rs`'s clap derive pattern, trimmed to the
// handful of flags a synthetic-workload runner needs.

use accelsched::{AcceleratorKind, Criticality, JobKind, Policy, Scheduler, SchedulerConfig, TaskProfile};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(
    name = "accelschedd",
    version,
    about = "Drives a synthetic workload through the accelerator scheduler core"
)]
struct Cli {
    /// Path to a TOML configuration file; falls back to built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the active placement policy (0-3).
    #[arg(long)]
    policy: Option<usize>,

    /// Override the scheduling holdoff, in microseconds.
    #[arg(long)]
    holdoff_usec: Option<u64>,

    /// Number of synthetic tasks to submit.
    #[arg(long, default_value_t = 64)]
    tasks: usize,

    /// Emit the run summary as JSON instead of plain text.
    #[arg(long)]
    json: bool,

    #[arg(long)]
    verbose: bool,
}

#[derive(Serialize)]
struct JobSummary {
    job: String,
    completed_on_hw: u64,
    completed_on_cpu: u64,
    total_busy_micros: u128,
}

#[derive(Serialize)]
struct RunSummary {
    finished_at: DateTime<Utc>,
    tasks_submitted: usize,
    scheduling_decisions: u64,
    candidate_slots_inspected: u64,
    jobs: Vec<JobSummary>,
}

fn main() {
    let cli = Cli::parse();
    accelsched::logging::init(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => SchedulerConfig::from_toml_file(path).unwrap_or_else(|err| {
            eprintln!("failed to load config from {}: {err}", path.display());
            std::process::exit(1);
        }),
        None => SchedulerConfig::default(),
    };
    if let Some(policy) = cli.policy {
        config.policy_index = policy;
    }
    if let Some(holdoff) = cli.holdoff_usec {
        config.holdoff_usec = holdoff;
    }

    let scheduler = Scheduler::new(&config).unwrap_or_else(|err| {
        eprintln!("invalid configuration: {err}");
        std::process::exit(1);
    });

    run_workload(&scheduler, cli.tasks);

    scheduler.wait_all_tasks_finish();
    let stats = scheduler.stats();
    let jobs: Vec<JobSummary> = [JobKind::Fft, JobKind::Viterbi, JobKind::Cv]
        .into_iter()
        .map(|job| {
            let t = scheduler.kernel_timings(job);
            JobSummary {
                job: format!("{job:?}"),
                completed_on_hw: t.completed_on_hw,
                completed_on_cpu: t.completed_on_cpu,
                total_busy_micros: t.total_busy.as_micros(),
            }
        })
        .collect();
    let summary = RunSummary {
        finished_at: Utc::now(),
        tasks_submitted: cli.tasks,
        scheduling_decisions: stats.decisions,
        candidate_slots_inspected: stats.decision_checks,
        jobs,
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary).expect("summary is serializable"));
    } else {
        println!(
            "[{}] submitted {} tasks; {} scheduling decisions, {} candidate slots inspected",
            summary.finished_at.to_rfc3339(),
            summary.tasks_submitted,
            summary.scheduling_decisions,
            summary.candidate_slots_inspected,
        );
        for job in &summary.jobs {
            println!(
                "  {}: {} on hw, {} on cpu, {}us total busy",
                job.job, job.completed_on_hw, job.completed_on_cpu, job.total_busy_micros
            );
        }
    }
    scheduler.shutdown();
}

fn run_workload(scheduler: &std::sync::Arc<Scheduler>, tasks: usize) {
    let jobs = [JobKind::Fft, JobKind::Viterbi, JobKind::Cv];
    for i in 0..tasks {
        let job = jobs[i % jobs.len()];
        let criticality = if i % 16 == 0 { Criticality::Critical } else { Criticality::Base };
        let profile = TaskProfile::new()
            .with(AcceleratorKind::Cpu, Duration::from_micros(500))
            .with(job.native_hw(), Duration::from_micros(100));

        let block = loop {
            match scheduler.acquire(job, criticality, profile) {
                Some(block) => break block,
                None => std::thread::sleep(Duration::from_micros(50)),
            }
        };
        let releaser = std::sync::Arc::clone(scheduler);
        scheduler.set_completion(block, move |block| {
            tracing::debug!(block_id = block, "task completion callback fired");
            releaser.release(block);
        });
        scheduler.submit(block);
    }
    scheduler.wait_all_critical();
}
