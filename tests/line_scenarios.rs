//! End-to-end runs of complete assembly lines.
//!
//! These tests verify properties that only show up when every entity runs
//! together:
//! - Board conservation at every instant
//! - Utilization closure for every entity
//! - Operator interplay (refills and reel replacements) on a full line
//! - Deterministic traces

use std::io::BufWriter;

use smtline::clock::{secs, HALF_TICK};
use smtline::config::MachineConfig;
use smtline::machines::BufferingParams;
use smtline::{AssemblyLine, LineConfig, MemoryTrace, RunOutcome, TextTrace, TraceEvent};

// ============================================================================
// Helpers
// ============================================================================

/// The reference line with a batch small enough for a unit-test budget.
fn reference_with_batch(batch_size: u64) -> LineConfig {
    let mut config = LineConfig::reference();
    config.simulation.batch_size = batch_size;
    config.simulation.max_hours = 50.0;
    config
}

fn machine_mut<'a>(config: &'a mut LineConfig, name: &str) -> &'a mut MachineConfig {
    config
        .machines
        .iter_mut()
        .find(|m| m.name() == name)
        .unwrap()
}

fn counter(report: &smtline::LineReport, entity: &str, name: &str) -> u64 {
    report.entity(entity).unwrap().counters[name]
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_reference_line_finishes_batch() {
    let report = AssemblyLine::new(reference_with_batch(64))
        .unwrap()
        .run()
        .unwrap();

    assert!(matches!(report.outcome, RunOutcome::Stopped { .. }));
    assert_eq!(report.pcbs_created, 64);
    assert_eq!(report.pcbs_finished, 64);
    assert_eq!(report.pcbs_in_line, 0);
    assert!(report.avg_cycle_time_secs > 0.0);
    assert!(report.max_cycle_time_secs >= report.avg_cycle_time_secs);
    assert!(report.throughput_per_hour > 0.0);

    // the first pick-and-place is the bottleneck
    let elapsed_lower_bound = 64.0 * 85.0;
    assert!(report.elapsed_secs > elapsed_lower_bound);

    // one reel per 50 boards on each pick-and-place
    assert_eq!(counter(&report, "pick_and_place_1", "reel_replacements"), 1);
    assert_eq!(counter(&report, "pick_and_place_2", "reel_replacements"), 1);
    assert_eq!(counter(&report, "human_operator_1", "tasks_completed"), 2);

    // two bursts of 32 boards, one oven setup per burst
    assert_eq!(counter(&report, "buffering_module", "bursts"), 2);
    assert_eq!(counter(&report, "reflow_oven", "setups"), 2);
    assert_eq!(counter(&report, "reflow_oven", "blocked_outputs"), 0);
}

#[test]
fn test_conservation_at_every_instant() {
    let mut line = AssemblyLine::new(reference_with_batch(32)).unwrap();
    let mut t = 0;
    loop {
        let outcome = line.run_until(t).unwrap();
        assert_eq!(
            line.pcbs_created(),
            line.pcbs_finished() + line.pcbs_in_line(),
            "boards lost or duplicated at t={}",
            t
        );
        if matches!(outcome, RunOutcome::Stopped { .. }) || t >= line.limit() {
            break;
        }
        t += HALF_TICK;
    }
    assert_eq!(line.pcbs_finished(), 32);
}

#[test]
fn test_utilization_closes_for_every_entity() {
    let report = AssemblyLine::new(reference_with_batch(32))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(report.entities.len(), 9);
    for entity in &report.entities {
        assert!(
            (entity.utilization_total() - 100.0).abs() < 1e-6,
            "{} sums to {}",
            entity.name,
            entity.utilization_total()
        );
        assert!((entity.elapsed_secs - report.elapsed_secs).abs() < 1e-9);
    }

    let energy: f64 = report.entities.iter().map(|e| e.energy_j).sum();
    assert!((report.total_energy_j - energy).abs() < 1e-6);
    assert!(
        (report.energy_per_pcb_kj - report.total_energy_j / 32.0 / 1e3).abs() < 1e-9
    );
    // the oven dominates the energy bill
    let oven = report.entity("reflow_oven").unwrap();
    assert!(oven.energy_j > report.total_energy_j / 2.0);
}

#[test]
fn test_low_solder_triggers_refills() {
    let mut config = reference_with_batch(32);
    if let MachineConfig::ScreenPrinter { params, .. } = machine_mut(&mut config, "screen_printer") {
        params.solder_capacity_g = 40.0;
        params.solder_initial_g = 40.0;
    }
    let trace = MemoryTrace::new();
    let line = AssemblyLine::with_trace(config, Box::new(trace.clone())).unwrap();
    let report = line.run().unwrap();

    assert_eq!(report.pcbs_finished, 32);
    // 8 boards per 40 g fill
    let refills = trace.filter(|e| {
        matches!(e, TraceEvent::TaskFinished { task, .. } if task.as_str() == "solder_refill")
    });
    assert_eq!(refills.len(), 3);
    let waiting = report
        .entity("screen_printer")
        .unwrap()
        .percent("waiting_for_refill")
        .unwrap();
    assert!(waiting > 0.0);
}

#[test]
fn test_double_buffering_line() {
    let mut config = reference_with_batch(64);
    if let MachineConfig::BufferingModule { double, params, .. } =
        machine_mut(&mut config, "buffering_module")
    {
        *double = true;
        *params = BufferingParams {
            capacity: 16,
            power_w: vec![250.0, 250.0],
            ..BufferingParams::default()
        };
    }
    let report = AssemblyLine::new(config).unwrap().run().unwrap();

    assert_eq!(report.pcbs_finished, 64);
    assert_eq!(report.pcbs_in_line, 0);
    assert_eq!(report.entity("buffering_module").unwrap().kind, "double_buffering_module");
    assert_eq!(counter(&report, "reflow_oven", "blocked_outputs"), 0);
}

#[test]
fn test_bypass_keeps_oven_on() {
    let mut config = reference_with_batch(32);
    if let MachineConfig::BufferingModule { params, .. } =
        machine_mut(&mut config, "buffering_module")
    {
        params.enabled = false;
    }
    let report = AssemblyLine::new(config).unwrap().run().unwrap();

    assert_eq!(report.pcbs_finished, 32);
    assert_eq!(counter(&report, "reflow_oven", "setups"), 1);
    let buffering = report.entity("buffering_module").unwrap();
    assert_eq!(buffering.percent("bypass"), Some(100.0));
    assert_eq!(buffering.counters["bypassed"], 32);
}

#[test]
fn test_trace_is_deterministic() {
    let run = || {
        let trace = MemoryTrace::new();
        AssemblyLine::with_trace(reference_with_batch(16 * 2), Box::new(trace.clone()))
            .unwrap()
            .run()
            .unwrap();
        trace.events()
    };
    let first = run();
    let second = run();
    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert!(matches!(first.last(), Some(TraceEvent::Stopped { by, .. }) if by == "sink_1"));
    // the buffering module drives the oven
    assert!(first
        .iter()
        .any(|e| matches!(e, TraceEvent::OvenSetup { oven, .. } if oven == "reflow_oven")));
}

#[test]
fn test_activity_log_file() {
    let path = std::env::temp_dir().join(format!("smtline_activity_{}.log", std::process::id()));
    let file = std::fs::File::create(&path).unwrap();
    let mut config = reference_with_batch(32);
    config.simulation.max_hours = 100.0 / 3600.0;

    let line =
        AssemblyLine::with_trace(config, Box::new(TextTrace::new(BufWriter::new(file)))).unwrap();
    let report = line.run().unwrap();
    assert_eq!(report.outcome, RunOutcome::LimitReached { at: secs(100) });

    let log = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert!(!log.is_empty());
    assert!(log.lines().all(|l| l.starts_with("T=")));
    assert!(log.contains("line_loader"));
}
