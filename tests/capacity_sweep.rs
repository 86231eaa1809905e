//! Buffer capacity sweeps.

use smtline::config::{ConfigError, MachineConfig};
use smtline::{capacity_sweep, sweep, sweep_to_csv, AssemblyLine, DrawOrder, LineConfig, SimError};

fn base() -> LineConfig {
    let mut config = LineConfig::reference();
    config.simulation.batch_size = 64;
    config.simulation.max_hours = 50.0;
    config
}

#[test]
fn test_points_keep_requested_order() {
    let capacities = [16, 4, 32];
    let points = capacity_sweep(&base(), &capacities).unwrap();

    assert_eq!(
        points.iter().map(|p| p.capacity).collect::<Vec<_>>(),
        capacities.to_vec()
    );
    for point in &points {
        assert_eq!(point.report.pcbs_finished, 64);
        // one burst per buffer load
        let bursts = point.report.entity("buffering_module").unwrap().counters["bursts"];
        assert_eq!(bursts, 64 / point.capacity as u64);
    }
}

#[test]
fn test_points_match_individual_runs() {
    let points = capacity_sweep(&base(), &[8, 64]).unwrap();

    for point in &points {
        let mut config = base();
        config.set_buffer_capacity(point.capacity);
        let single = AssemblyLine::new(config).unwrap().run().unwrap();

        assert_eq!(point.report.elapsed_secs, single.elapsed_secs);
        assert_eq!(point.report.total_energy_j, single.total_energy_j);
        assert_eq!(point.report.entities, single.entities);
    }
}

#[test]
fn test_capacity_must_divide_batch() {
    match capacity_sweep(&base(), &[16, 24]) {
        Err(SimError::Config(ConfigError::Validation(msg))) => {
            assert!(msg.contains("not a multiple of the buffer capacity 24"), "{}", msg)
        }
        other => panic!("expected a validation error, got {:?}", other.map(|p| p.len())),
    }
}

#[test]
fn test_double_buffering_fifo_sweep() {
    let mut config = base();
    for machine in &mut config.machines {
        if let MachineConfig::BufferingModule { double, params, .. } = machine {
            *double = true;
            params.draw_order = DrawOrder::Fifo;
            params.power_w = vec![250.0, 250.0];
        }
    }
    let points = capacity_sweep(&config, &[8, 16]).unwrap();
    assert!(points.iter().all(|p| p.report.pcbs_finished == 64));

    let csv = sweep_to_csv(&points, "reflow_oven");
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.lines().nth(2).unwrap().starts_with("0,16,"));
}

#[test]
fn test_custom_sweep_parameter() {
    let points = sweep(&base(), &[2u64, 4], |config, stack| {
        config.simulation.stack_size = stack;
    })
    .unwrap();
    assert_eq!(points.len(), 2);
    assert!(points.iter().all(|p| p.capacity == 32 && p.report.pcbs_finished == 64));
}
