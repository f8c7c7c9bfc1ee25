//! Session summary export.
//!
//! One row per session appended to a CSV file (header written when the file
//! is created), so repeated runs build a comparable history:
//! outcome, iteration count, first fault, every counter and tick jitter stats.

use std::{
    fs::{OpenOptions, create_dir_all},
    path::Path,
};

use csv::WriterBuilder;
use log::info;
use serde::Serialize;

use crate::{
    control::control_loop::{LoopState, SessionOutcome, SessionReport},
    error::Result,
    utils::metrics::{TickTiming, calculate_stats_u64},
};

#[derive(Debug, Serialize)]
struct SummaryRow<'a> {
    profile_id: &'a str,
    outcome: SessionOutcome,
    final_state: LoopState,
    iterations: u64,
    elapsed_ms: u64,
    /// `kind@index` for every latched fault, `;`-separated.
    faults: String,
    ticks_fired: u64,
    ticks_overwritten: u64,
    ticks_late: u64,
    samples_logged: u64,
    samples_dropped: u64,
    swaps: u64,
    drains_completed: u64,
    drains_skipped: u64,
    records_written: u64,
    storage_errors: u64,
    edges_rejected: u64,
    adc_errors: u64,
    jitter_min_us: Option<f64>,
    jitter_max_us: Option<f64>,
    jitter_mean_us: Option<f64>,
}

impl<'a> SummaryRow<'a> {
    fn new(report: &'a SessionReport, timing: Option<&TickTiming>) -> Self {
        let c = &report.counters;
        let jitter = timing.and_then(|t| calculate_stats_u64(&t.jitter_us));
        Self {
            profile_id: &report.profile_id,
            outcome: report.outcome,
            final_state: report.final_state,
            iterations: report.iterations,
            elapsed_ms: report.elapsed.as_millis() as u64,
            faults: report
                .faults
                .iter()
                .map(|f| format!("{}@{}", f.kind, f.index))
                .collect::<Vec<_>>()
                .join(";"),
            ticks_fired: c.ticks_fired,
            ticks_overwritten: c.ticks_overwritten,
            ticks_late: c.ticks_late,
            samples_logged: c.samples_logged,
            samples_dropped: c.samples_dropped,
            swaps: c.swaps,
            drains_completed: c.drains_completed,
            drains_skipped: c.drains_skipped,
            records_written: c.records_written,
            storage_errors: c.storage_errors,
            edges_rejected: c.edges_rejected,
            adc_errors: c.adc_errors,
            jitter_min_us: jitter.map(|s| s.min),
            jitter_max_us: jitter.map(|s| s.max),
            jitter_mean_us: jitter.map(|s| s.mean),
        }
    }
}

/// Append one summary row for `report` to `path`.
pub fn export_session_summary(
    path: impl AsRef<Path>,
    report: &SessionReport,
    timing: Option<&TickTiming>,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        create_dir_all(dir)?;
    }
    let file_exists = path.exists();
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut wtr = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);
    wtr.serialize(SummaryRow::new(report, timing))?;
    wtr.flush()?;

    info!("[Export] session summary appended to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        control::fault::{FaultKind, FaultRecord},
        utils::metrics::CounterSnapshot,
    };
    use std::{env, fs, process, time::Duration};

    fn report() -> SessionReport {
        SessionReport {
            profile_id: "ramp".into(),
            outcome: SessionOutcome::Faulted,
            final_state: LoopState::Stopped,
            iterations: 2,
            faults: vec![FaultRecord {
                kind: FaultKind::Overcurrent,
                value: 4.0,
                limit: 3.6,
                index: 2,
            }],
            counters: CounterSnapshot {
                samples_logged: 2,
                ..CounterSnapshot::default()
            },
            elapsed: Duration::from_millis(3),
        }
    }

    #[test]
    fn appends_rows_under_a_single_header() {
        let dir = env::temp_dir().join(format!("dyno_daq_export_{}", process::id()));
        let path = dir.join("summary.csv");
        let _ = fs::remove_dir_all(&dir);

        let mut timing = TickTiming::default();
        timing.jitter_us.extend([4, 8]);
        export_session_summary(&path, &report(), Some(&timing)).unwrap();
        export_session_summary(&path, &report(), None).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("profile_id,outcome,final_state,iterations"));
        assert!(lines[1].starts_with("ramp,faulted,Stopped,2,3,overcurrent@2,"));
        assert!(lines[1].ends_with(",4.0,8.0,6.0"));
        assert!(lines[2].ends_with(",,,"));
        let _ = fs::remove_dir_all(&dir);
    }
}
