//! Parameter sweeps over the buffering module settings.
//!
//! Each point builds and runs an independent line, so with the `parallel`
//! feature the points run on the rayon thread pool. Results come back in the
//! order of the requested values either way.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::Serialize;

use crate::config::LineConfig;
use crate::error::SimResult;
use crate::line::AssemblyLine;
use crate::stats::LineReport;

/// Result of one sweep point.
#[derive(Clone, Debug, Serialize)]
pub struct SweepPoint {
    /// Oven turn-on margin of the first buffering module
    pub k: usize,
    /// Buffer capacity of the first buffering module
    pub capacity: usize,
    pub report: LineReport,
}

impl SweepPoint {
    /// Share of time the named oven spent in each of its states, in percent.
    pub fn oven_utilization(&self, oven: &str) -> Vec<f64> {
        self.report
            .entity(oven)
            .map(|e| e.states.iter().map(|s| s.percent).collect())
            .unwrap_or_default()
    }
}

fn run_point(base: &LineConfig, apply: impl FnOnce(&mut LineConfig)) -> SimResult<SweepPoint> {
    let mut config = base.clone();
    apply(&mut config);
    let (k, capacity) = config
        .buffering_params()
        .map_or((0, 0), |p| (p.k, p.capacity));
    tracing::debug!(k, capacity, "sweep point");
    let report = AssemblyLine::new(config)?.run()?;
    Ok(SweepPoint {
        k,
        capacity,
        report,
    })
}

/// Runs `base` once per value, after `apply` writes the value into a copy.
///
/// The first invalid point fails the whole sweep.
#[cfg(not(feature = "parallel"))]
pub fn sweep<T, F>(base: &LineConfig, values: &[T], apply: F) -> SimResult<Vec<SweepPoint>>
where
    T: Copy + Sync,
    F: Fn(&mut LineConfig, T) + Sync,
{
    values
        .iter()
        .map(|&value| run_point(base, |config| apply(config, value)))
        .collect()
}

/// Runs `base` once per value, in parallel, after `apply` writes the value
/// into a copy.
///
/// The first invalid point fails the whole sweep.
#[cfg(feature = "parallel")]
pub fn sweep<T, F>(base: &LineConfig, values: &[T], apply: F) -> SimResult<Vec<SweepPoint>>
where
    T: Copy + Sync,
    F: Fn(&mut LineConfig, T) + Sync,
{
    values
        .par_iter()
        .map(|&value| run_point(base, |config| apply(config, value)))
        .collect()
}

/// Runs `base` once per oven turn-on margin in `ks`.
pub fn k_sweep(base: &LineConfig, ks: &[usize]) -> SimResult<Vec<SweepPoint>> {
    sweep(base, ks, LineConfig::set_turn_on_margin)
}

/// Runs `base` once per buffer capacity in `capacities`.
///
/// Every capacity must divide the batch size.
pub fn capacity_sweep(base: &LineConfig, capacities: &[usize]) -> SimResult<Vec<SweepPoint>> {
    sweep(base, capacities, LineConfig::set_buffer_capacity)
}

/// Formats sweep results as CSV, one row per point.
///
/// The trailing columns are the oven's state percentages in state order.
pub fn sweep_to_csv(points: &[SweepPoint], oven: &str) -> String {
    let mut csv = String::new();

    csv.push_str(
        "k,capacity,throughput_per_hour,avg_cycle_time_hrs,max_cycle_time_hrs,energy_per_pcb_kj",
    );
    if let Some(entity) = points.first().and_then(|p| p.report.entity(oven)) {
        for share in &entity.states {
            csv.push_str(&format!(",{}", share.state));
        }
    }
    csv.push('\n');

    for point in points {
        let r = &point.report;
        csv.push_str(&format!(
            "{},{},{:.2},{:.4},{:.4},{:.2}",
            point.k,
            point.capacity,
            r.throughput_per_hour,
            r.avg_cycle_time_secs / 3600.0,
            r.max_cycle_time_secs / 3600.0,
            r.energy_per_pcb_kj,
        ));
        for percent in point.oven_utilization(oven) {
            csv.push_str(&format!(",{:.2}", percent));
        }
        csv.push('\n');
    }

    csv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_reference() -> LineConfig {
        let mut config = LineConfig::reference();
        config.simulation.batch_size = 32;
        config.simulation.max_hours = 20.0;
        config
    }

    #[test]
    fn test_sweep_keeps_requested_order() {
        let points = k_sweep(&quick_reference(), &[4, 0]).unwrap();
        assert_eq!(points.iter().map(|p| p.k).collect::<Vec<_>>(), vec![4, 0]);
        assert!(points.iter().all(|p| p.capacity == 32));
        assert!(points.iter().all(|p| p.report.pcbs_finished == 32));

        let csv = sweep_to_csv(&points, "reflow_oven");
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().ends_with("temperature_maintain_occupied"));
        assert!(lines.next().unwrap().starts_with("4,32,"));
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_invalid_margin_fails_the_sweep() {
        assert!(k_sweep(&quick_reference(), &[0, 32]).is_err());
    }

    #[test]
    fn test_capacity_sweep_records_capacity() {
        let points = capacity_sweep(&quick_reference(), &[16, 8]).unwrap();
        assert_eq!(points.iter().map(|p| p.capacity).collect::<Vec<_>>(), vec![16, 8]);
        assert!(points.iter().all(|p| p.k == 0));

        let csv = sweep_to_csv(&points, "reflow_oven");
        assert!(csv.lines().nth(1).unwrap().starts_with("0,16,"));
        assert!(csv.lines().nth(2).unwrap().starts_with("0,8,"));
    }
}
