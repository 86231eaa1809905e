//! Utilization, energy and throughput statistics.
//!
//! Every machine and operator owns a [`StateTracker`] that partitions elapsed
//! virtual time between its states. At the end of a run the trackers are
//! turned into [`EntityReport`]s and gathered, together with the sink's
//! cycle-time figures, into a [`LineReport`] that can be exported to JSON or
//! CSV or printed as a human-readable summary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::path::Path;

use crate::clock::to_secs;
use crate::kernel::{Context, KernelStats, RunOutcome};
use crate::trace::TraceEvent;
use crate::types::SimTime;

/// A closed set of states an entity can be in.
///
/// `ALL` lists the states in reporting order; `index` must return the position
/// of a state within `ALL`.
pub trait StateSet: Copy + Eq + fmt::Debug + Send + 'static {
    const ALL: &'static [Self];

    /// Name used in traces and reports.
    fn name(self) -> &'static str;

    fn index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }
}

/// Per-state time accumulator with power ratings.
#[derive(Clone, Debug)]
pub struct StateTracker<S: StateSet> {
    entity: String,
    current: S,
    since: SimTime,
    spent: Vec<SimTime>,
    power_w: Vec<f64>,
}

impl<S: StateSet> StateTracker<S> {
    /// Creates a tracker in `initial`, accounting from time zero with no power draw.
    pub fn new(entity: impl Into<String>, initial: S) -> Self {
        Self {
            entity: entity.into(),
            current: initial,
            since: 0,
            spent: vec![0; S::ALL.len()],
            power_w: vec![0.0; S::ALL.len()],
        }
    }

    /// Sets the power draw in watts for each state, in `S::ALL` order.
    ///
    /// Missing entries draw nothing; extra entries are ignored.
    pub fn with_power(mut self, power_w: &[f64]) -> Self {
        for (slot, watts) in self.power_w.iter_mut().zip(power_w) {
            *slot = *watts;
        }
        self
    }

    pub fn state(&self) -> S {
        self.current
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Moves to `state` at the context's current time.
    ///
    /// Time since the last change is charged to the state being left. A
    /// transition to the current state only updates the accumulator.
    pub fn enter(&mut self, ctx: &mut Context<'_>, state: S) {
        let now = ctx.now();
        let from = self.current;
        self.charge(now);
        self.current = state;
        if from != state {
            ctx.record(TraceEvent::StateChanged {
                time: now,
                entity: self.entity.clone(),
                from: from.name(),
                to: state.name(),
            });
        }
    }

    fn charge(&mut self, now: SimTime) {
        self.spent[self.current.index()] += now.saturating_sub(self.since);
        self.since = now.max(self.since);
    }

    /// Time spent in each state up to `now`, in `S::ALL` order.
    pub fn snapshot(&self, now: SimTime) -> Vec<SimTime> {
        let mut spent = self.spent.clone();
        spent[self.current.index()] += now.saturating_sub(self.since);
        spent
    }

    /// Time spent in `state` up to `now`.
    pub fn time_in(&self, state: S, now: SimTime) -> SimTime {
        self.snapshot(now)[state.index()]
    }

    /// Builds the utilization and energy report at `now`.
    pub fn report(&self, kind: &str, now: SimTime) -> EntityReport {
        let spent = self.snapshot(now);
        let total: SimTime = spent.iter().sum();
        let states = S::ALL
            .iter()
            .zip(&spent)
            .zip(&self.power_w)
            .map(|((state, &time), &power_w)| {
                let seconds = to_secs(time);
                StateShare {
                    state: state.name().to_string(),
                    seconds,
                    percent: if total > 0 {
                        time as f64 / total as f64 * 100.0
                    } else {
                        0.0
                    },
                    power_w,
                    energy_j: power_w * seconds,
                }
            })
            .collect();
        EntityReport::new(self.entity.clone(), kind, to_secs(total), states)
    }
}

/// Share of elapsed time an entity spent in one state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateShare {
    pub state: String,
    pub seconds: f64,
    pub percent: f64,
    pub power_w: f64,
    pub energy_j: f64,
}

/// Utilization and energy of one entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityReport {
    /// Entity name
    pub name: String,
    /// Entity kind, e.g. `conveyor_belt`
    pub kind: String,
    /// Total accounted time in seconds
    pub elapsed_secs: f64,
    /// Per-state breakdown, in the entity's state order
    pub states: Vec<StateShare>,
    /// Sum of the per-state energies
    pub energy_j: f64,
    /// Entity-specific counters (boards processed, blocked outputs, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub counters: BTreeMap<String, u64>,
}

impl EntityReport {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        elapsed_secs: f64,
        states: Vec<StateShare>,
    ) -> Self {
        let energy_j = states.iter().map(|s| s.energy_j).sum();
        Self {
            name: name.into(),
            kind: kind.into(),
            elapsed_secs,
            states,
            energy_j,
            counters: BTreeMap::new(),
        }
    }

    /// Adds a named counter.
    pub fn with_counter(mut self, name: impl Into<String>, value: u64) -> Self {
        self.counters.insert(name.into(), value);
        self
    }

    /// Percentage of time spent in a state, if the entity has it.
    pub fn percent(&self, state: &str) -> Option<f64> {
        self.states
            .iter()
            .find(|s| s.state == state)
            .map(|s| s.percent)
    }

    /// Sum of all state percentages; 100 for any entity with elapsed time.
    pub fn utilization_total(&self) -> f64 {
        self.states.iter().map(|s| s.percent).sum()
    }
}

/// Results of one assembly-line run.
#[derive(Clone, Debug, Serialize)]
pub struct LineReport {
    /// Line name
    pub name: String,
    /// How the run ended
    pub outcome: RunOutcome,
    /// Virtual time elapsed, in seconds
    pub elapsed_secs: f64,
    /// Boards created by the source
    pub pcbs_created: u64,
    /// Boards consumed by the sink
    pub pcbs_finished: u64,
    /// Boards still inside the line when the run ended
    pub pcbs_in_line: u64,
    pub avg_cycle_time_secs: f64,
    pub max_cycle_time_secs: f64,
    /// Finished boards per hour of virtual time
    pub throughput_per_hour: f64,
    /// Energy of every entity, in joules
    pub total_energy_j: f64,
    /// Energy per finished board, in kilojoules
    pub energy_per_pcb_kj: f64,
    /// Per-entity breakdown, in registration order
    pub entities: Vec<EntityReport>,
    /// Kernel counters
    pub kernel: KernelStats,
    /// Wall-clock duration of the run in milliseconds
    pub wall_time_ms: f64,
}

impl LineReport {
    /// Returns the report of an entity by name.
    pub fn entity(&self, name: &str) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Exports the report to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports the report to a JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Exports the headline figures to CSV.
    pub fn to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("metric,value\n");
        csv.push_str(&format!("elapsed_secs,{:.1}\n", self.elapsed_secs));
        csv.push_str(&format!("pcbs_created,{}\n", self.pcbs_created));
        csv.push_str(&format!("pcbs_finished,{}\n", self.pcbs_finished));
        csv.push_str(&format!("pcbs_in_line,{}\n", self.pcbs_in_line));
        csv.push_str(&format!("avg_cycle_time_secs,{:.2}\n", self.avg_cycle_time_secs));
        csv.push_str(&format!("max_cycle_time_secs,{:.2}\n", self.max_cycle_time_secs));
        csv.push_str(&format!("throughput_per_hour,{:.2}\n", self.throughput_per_hour));
        csv.push_str(&format!("total_energy_j,{:.2}\n", self.total_energy_j));
        csv.push_str(&format!("energy_per_pcb_kj,{:.2}\n", self.energy_per_pcb_kj));
        csv.push_str(&format!("kernel_steps,{}\n", self.kernel.steps));
        csv.push_str(&format!("interrupts,{}\n", self.kernel.interrupts));

        csv
    }

    /// Exports the headline figures to a CSV file.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        std::fs::write(path, self.to_csv())
    }

    /// Exports the per-entity, per-state breakdown to CSV.
    pub fn entities_to_csv(&self) -> String {
        let mut csv = String::new();

        csv.push_str("entity,kind,state,seconds,percent,power_w,energy_j\n");
        for entity in &self.entities {
            for share in &entity.states {
                csv.push_str(&format!(
                    "{},{},{},{:.1},{:.2},{},{:.2}\n",
                    entity.name,
                    entity.kind,
                    share.state,
                    share.seconds,
                    share.percent,
                    share.power_w,
                    share.energy_j,
                ));
            }
        }

        csv
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        writeln!(w, "=== {} ===", self.name)?;
        writeln!(w)?;

        writeln!(
            w,
            "Total time elapsed: {:.1} s ({:.2} hours)",
            self.elapsed_secs,
            self.elapsed_secs / 3600.0
        )?;
        writeln!(w, "PCBs created: {}", self.pcbs_created)?;
        writeln!(w, "PCBs finished: {}", self.pcbs_finished)?;
        writeln!(w, "PCBs still in line: {}", self.pcbs_in_line)?;
        writeln!(
            w,
            "Average cycle time: {:.2} s ({:.2} hours)",
            self.avg_cycle_time_secs,
            self.avg_cycle_time_secs / 3600.0
        )?;
        writeln!(
            w,
            "Max cycle time: {:.2} s ({:.2} hours)",
            self.max_cycle_time_secs,
            self.max_cycle_time_secs / 3600.0
        )?;
        writeln!(w, "Throughput: {:.2} PCBs per hour", self.throughput_per_hour)?;
        writeln!(w)?;

        writeln!(w, "--- Utilization ---")?;
        for entity in &self.entities {
            write!(w, "{}:", entity.name)?;
            for share in &entity.states {
                write!(w, " {} = {:.2}%", share.state, share.percent)?;
            }
            writeln!(w)?;
        }
        writeln!(w)?;

        writeln!(w, "--- Energy ---")?;
        for entity in self.entities.iter().filter(|e| e.energy_j > 0.0) {
            writeln!(w, "{}: {:.2} kJ", entity.name, entity.energy_j / 1e3)?;
        }
        writeln!(w, "Total energy: {:.2} kJ", self.total_energy_j / 1e3)?;
        writeln!(w, "Energy per PCB: {:.2} kJ", self.energy_per_pcb_kj)?;

        Ok(())
    }

    /// Returns the summary as a string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // writing into a Vec cannot fail
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::secs;
    use crate::kernel::World;
    use crate::trace::MemoryTrace;
    use crate::types::ProcessId;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Lamp {
        Off,
        On,
    }

    impl StateSet for Lamp {
        const ALL: &'static [Self] = &[Lamp::Off, Lamp::On];

        fn name(self) -> &'static str {
            match self {
                Lamp::Off => "off",
                Lamp::On => "on",
            }
        }
    }

    fn with_ctx<F: FnOnce(&mut Context<'_>)>(now: SimTime, trace: &mut MemoryTrace, f: F) {
        let mut world = World::new();
        let mut interrupts = Vec::new();
        let mut stop = false;
        let mut ctx = Context {
            now,
            pid: ProcessId(0),
            world: &mut world,
            trace,
            interrupts: &mut interrupts,
            stop_requested: &mut stop,
        };
        f(&mut ctx);
    }

    #[test]
    fn test_tracker_partitions_time() {
        let mut trace = MemoryTrace::new();
        let mut lamp = StateTracker::new("lamp", Lamp::Off).with_power(&[1.0, 60.0]);

        with_ctx(secs(10), &mut trace, |ctx| lamp.enter(ctx, Lamp::On));
        with_ctx(secs(40), &mut trace, |ctx| lamp.enter(ctx, Lamp::Off));

        assert_eq!(lamp.time_in(Lamp::On, secs(50)), secs(30));
        assert_eq!(lamp.time_in(Lamp::Off, secs(50)), secs(20));

        let report = lamp.report("lamp", secs(50));
        assert!((report.utilization_total() - 100.0).abs() < 1e-9);
        assert_eq!(report.percent("on"), Some(60.0));
        assert_eq!(report.energy_j, 20.0 + 60.0 * 30.0);
        assert_eq!(trace.len(), 2);
    }

    #[test]
    fn test_same_state_is_silent() {
        let mut trace = MemoryTrace::new();
        let mut lamp = StateTracker::new("lamp", Lamp::Off);
        with_ctx(secs(5), &mut trace, |ctx| lamp.enter(ctx, Lamp::Off));
        assert!(trace.is_empty());
        assert_eq!(lamp.time_in(Lamp::Off, secs(5)), secs(5));
    }

    #[test]
    fn test_empty_report() {
        let lamp = StateTracker::new("lamp", Lamp::Off);
        let report = lamp.report("lamp", 0);
        assert_eq!(report.utilization_total(), 0.0);
        assert_eq!(report.energy_j, 0.0);
    }

    fn sample_report() -> LineReport {
        let entity = EntityReport::new(
            "oven",
            "reflow_oven",
            100.0,
            vec![StateShare {
                state: "off".into(),
                seconds: 100.0,
                percent: 100.0,
                power_w: 320.0,
                energy_j: 32000.0,
            }],
        )
        .with_counter("blocked_outputs", 0);
        LineReport {
            name: "Test Line".into(),
            outcome: RunOutcome::Stopped { at: secs(100) },
            elapsed_secs: 100.0,
            pcbs_created: 16,
            pcbs_finished: 10,
            pcbs_in_line: 6,
            avg_cycle_time_secs: 42.0,
            max_cycle_time_secs: 60.0,
            throughput_per_hour: 360.0,
            total_energy_j: 32000.0,
            energy_per_pcb_kj: 3.2,
            entities: vec![entity],
            kernel: KernelStats::default(),
            wall_time_ms: 1.0,
        }
    }

    #[test]
    fn test_report_exports() {
        let report = sample_report();

        let json = report.to_json().unwrap();
        assert!(json.contains("\"pcbs_finished\": 10"));
        assert!(json.contains("\"outcome\": \"stopped\""));

        let csv = report.to_csv();
        assert!(csv.contains("pcbs_created,16"));
        assert!(csv.contains("throughput_per_hour,360.00"));

        let csv = report.entities_to_csv();
        assert!(csv.contains("oven,reflow_oven,off,100.0,100.00,320,32000.00"));

        let summary = report.summary();
        assert!(summary.contains("Test Line"));
        assert!(summary.contains("oven: 32.00 kJ"));
    }
}
