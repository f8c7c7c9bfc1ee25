//! # Dynamometer DAQ entry point
//!
//! Runs one control session against the simulated rig:
//! config → profile → tick source, shaft generators, control loop → records
//! written to the configured output file → one summary row appended to the
//! session summary CSV.
//!
//! The termination policy has no default and must be chosen per run.

use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::{Parser, ValueEnum};
use log::{error, info, warn};

use dyno_daq::{
    DaqConfig, Result,
    acquisition::adc::AdcChannel,
    control::setpoint::{Profile, SetpointSequence, TerminationPolicy},
    logging::storage::FileStorage,
    sim::SimSession,
    utils::{export::export_session_summary, metrics::calculate_stats_u64},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProfileKind {
    /// Same brake/throttle targets for every step
    Constant,
    /// Both targets rise linearly from zero
    Ramp,
}

/// Command line arguments for one simulated session
#[derive(Parser, Debug)]
#[command(author, version, about = "Dynamometer control session on a simulated rig")]
struct Args {
    /// JSON configuration file; built-in defaults when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// What happens at the end of the setpoint sequence
    #[arg(short, long, value_enum)]
    policy: TerminationPolicy,

    /// Setpoint profile shape
    #[arg(long, value_enum, default_value_t = ProfileKind::Ramp)]
    profile: ProfileKind,

    /// Number of setpoint steps (one per tick)
    #[arg(short, long, default_value_t = 2_000)]
    steps: usize,

    /// Brake-current target, % of full scale (peak for ramps)
    #[arg(long, default_value_t = 40.0)]
    brake: f64,

    /// Throttle target, % (peak for ramps)
    #[arg(long, default_value_t = 80.0)]
    throttle: f64,

    /// Record file; overrides `logging.output_path`
    #[arg(short, long)]
    output: Option<String>,

    /// Session summary CSV (appended)
    #[arg(long, default_value = "dyno_data/session_summary.csv")]
    summary: PathBuf,

    /// Halt the session after this many milliseconds
    #[arg(short = 't', long)]
    duration_ms: Option<u64>,

    /// Simulated primary shaft speed, rpm
    #[arg(long, default_value_t = 3_000.0)]
    primary_rpm: f64,

    /// Simulated secondary shaft speed, rpm
    #[arg(long, default_value_t = 1_200.0)]
    secondary_rpm: f64,

    /// Force an overcurrent reading from this step on
    #[arg(long)]
    inject_overcurrent_at: Option<usize>,
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => DaqConfig::from_json_file(path)?,
        None => DaqConfig::default(),
    };
    if let Some(output) = &args.output {
        config.logging.output_path = output.clone();
    }
    config.validate()?;

    let sequence = match args.profile {
        ProfileKind::Constant => SetpointSequence::constant(args.steps, args.brake, args.throttle)?,
        ProfileKind::Ramp => SetpointSequence::ramp(args.steps, args.brake, args.throttle)?,
    };
    let profile = Profile::new(config.session.profile_id.clone(), sequence, args.policy);

    if args.policy == TerminationPolicy::Loop && args.duration_ms.is_none() {
        warn!("[Main] loop policy without --duration-ms runs until a fault trips");
    }

    let mut session = SimSession::new(&config);
    session.primary.rpm = args.primary_rpm;
    session.secondary.rpm = args.secondary_rpm;
    if let Some(step) = args.inject_overcurrent_at {
        let amps = config.faults.brake_current_max_amps * 1.2;
        session.adc.inject(step, AdcChannel::BrakeCurrent, amps);
    }

    let storage = FileStorage::new(&config.logging.output_path);
    info!(
        "[Main] {} steps at {} Hz, records to {}",
        profile.sequence.len(),
        config.tick.hz,
        storage.path().display()
    );

    let outcome = session.run(
        &config,
        profile,
        storage,
        args.duration_ms.map(Duration::from_millis),
    )?;
    let report = &outcome.report;

    info!(
        "[Main] outcome {:?}: {} iterations in {:?}",
        report.outcome, report.iterations, report.elapsed
    );
    info!("[Main] counters: {:?}", report.counters);
    info!("[Main] last sample: {}", outcome.last_sample.to_record().trim_end());
    if let Some(jitter) = calculate_stats_u64(&outcome.timing.jitter_us) {
        info!(
            "[Main] tick jitter µs: min {:.1}, max {:.1}, mean {:.1} over {} ticks",
            jitter.min, jitter.max, jitter.mean, jitter.count
        );
    }
    for fault in &report.faults {
        error!(
            "[Main] {} fault: {:.3} > {:.3} at step {}",
            fault.kind, fault.value, fault.limit, fault.index
        );
    }

    export_session_summary(&args.summary, report, Some(&outcome.timing))
}

fn main() -> ExitCode {
    env_logger::init();
    info!("=== DYNO DAQ SESSION START ===");

    match run(Args::parse()) {
        Ok(()) => {
            info!("=== DYNO DAQ SESSION FINISHED ===");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("[Main] session aborted: {e}");
            ExitCode::FAILURE
        }
    }
}
