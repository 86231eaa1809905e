//! Oven turn-on margin sweeps.

use smtline::{k_sweep, sweep_to_csv, AssemblyLine, LineConfig};

fn base() -> LineConfig {
    let mut config = LineConfig::reference();
    config.simulation.batch_size = 64;
    config.simulation.max_hours = 50.0;
    config
}

#[test]
fn test_sweep_matches_individual_runs() {
    let ks = [0, 8, 16];
    let points = k_sweep(&base(), &ks).unwrap();
    assert_eq!(points.len(), ks.len());

    for point in &points {
        let mut config = base();
        config.set_turn_on_margin(point.k);
        let single = AssemblyLine::new(config).unwrap().run().unwrap();

        assert_eq!(point.report.elapsed_secs, single.elapsed_secs);
        assert_eq!(point.report.pcbs_finished, single.pcbs_finished);
        assert_eq!(point.report.total_energy_j, single.total_energy_j);
        assert_eq!(point.report.entities, single.entities);
    }
}

#[test]
fn test_sweep_is_deterministic() {
    let ks = [2, 4];
    let first = k_sweep(&base(), &ks).unwrap();
    let second = k_sweep(&base(), &ks).unwrap();
    assert_eq!(
        sweep_to_csv(&first, "reflow_oven"),
        sweep_to_csv(&second, "reflow_oven")
    );
}

#[test]
fn test_earlier_turn_on_shortens_oven_idle_wait() {
    let points = k_sweep(&base(), &[0, 16]).unwrap();
    let late = &points[0].report;
    let early = &points[1].report;

    assert_eq!(late.pcbs_finished, 64);
    assert_eq!(early.pcbs_finished, 64);
    // starting the oven 16 boards early overlaps its setup with buffering
    assert!(early.elapsed_secs < late.elapsed_secs);
}
