//! Loading lines from configuration files.

use smtline::config::{ConfigError, MachineConfig};
use smtline::{AssemblyLine, DrawOrder, LineConfig, RunOutcome, SimError};

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("smtline_{}_{}", std::process::id(), name))
}

const SMALL_LINE: &str = r#"
name: small_line
simulation:
  batch_size: 8
  stack_size: 4
  max_hours: 5

slots: [tray, printed, done]

belts:
  - name: belt_1
    params:
      num_stages: 3
      delay_per_stage: 1

machines:
  - type: source
    name: source
    output: tray
  - type: line_loader
    name: loader
    input: tray
    output: belt_1
  - type: screen_printer
    name: printer
    input: belt_1
    output: printed
    operator: operator
    params:
      printing_delay: 10
      num_pcbs_per_cleaning: 4
      solder_capacity_g: 20
      solder_initial_g: 20
  - type: buffering_module
    name: buffer
    input: printed
    output: done_belt
    oven: oven
    params:
      capacity: 4
      draw_order: FIFO
  - type: reflow_oven
    name: oven
    input: done_belt
    output: done
    params:
      num_stages: 3
      delay_per_stage: 2
      heating_rate: 3400
  - type: sink
    name: sink
    input: done

operators:
  - name: operator
    tasks:
      - { machine: printer, task: solder_refill, delay: 30 }
      - { machine: printer, task: adhesive_refill, delay: 30 }
"#;

fn small_line_yaml() -> String {
    SMALL_LINE.replace(
        "belts:\n",
        "belts:\n  - name: done_belt\n    params:\n      num_stages: 2\n",
    )
}

#[test]
fn test_yaml_line_runs() {
    let config = LineConfig::from_yaml(&small_line_yaml()).unwrap();
    assert_eq!(config.belts.len(), 2);
    match config.find_machine("buffer") {
        Some(MachineConfig::BufferingModule { params, oven, .. }) => {
            assert_eq!(params.draw_order, DrawOrder::Fifo);
            assert_eq!(oven.as_deref(), Some("oven"));
        }
        other => panic!("unexpected {:?}", other),
    }

    let report = AssemblyLine::new(config).unwrap().run().unwrap();
    assert!(matches!(report.outcome, RunOutcome::Stopped { .. }));
    assert_eq!(report.pcbs_finished, 8);
    // 20 g of solder covers 4 boards
    assert_eq!(report.entity("operator").unwrap().counters["tasks_completed"], 1);
    assert_eq!(report.entity("oven").unwrap().counters["setups"], 2);
}

#[test]
fn test_file_roundtrip_by_extension() {
    let config = LineConfig::reference();

    let yaml = temp_path("line.yaml");
    config.to_yaml_file(&yaml).unwrap();
    let from_yaml = LineConfig::from_file(&yaml).unwrap();
    std::fs::remove_file(&yaml).ok();
    assert_eq!(from_yaml, config);

    let json = temp_path("line.json");
    config.to_json_file(&json).unwrap();
    let from_json = LineConfig::from_file(&json).unwrap();
    std::fs::remove_file(&json).ok();
    assert_eq!(from_json, config);
}

#[test]
fn test_missing_file_is_io_error() {
    let result = LineConfig::from_file(temp_path("does_not_exist.yml"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

#[test]
fn test_malformed_yaml() {
    let result = LineConfig::from_yaml("machines: [ { type: conveyor } ]");
    assert!(matches!(result, Err(ConfigError::Yaml(_))));
}

#[test]
fn test_validation_failures_surface_at_assembly() {
    let cases: &[(&str, &str)] = &[
        ("batch_size: 8", "batch_size: 10"),
        ("max_hours: 5", "max_hours: .inf"),
        ("capacity: 4", "capacity: 1"),
        ("      num_stages: 3\n      delay_per_stage: 2", "      num_stages: 1"),
        ("operator: operator", "operator: nobody"),
        ("      - { machine: printer, task: adhesive_refill, delay: 30 }\n", ""),
    ];
    for (from, to) in cases {
        let yaml = small_line_yaml().replacen(from, to, 1);
        assert_ne!(yaml, small_line_yaml(), "pattern '{}' not found", from);
        let config: LineConfig = serde_yaml::from_str(&yaml).unwrap();
        match AssemblyLine::new(config) {
            Err(SimError::Config(ConfigError::Validation(_))) => {}
            Err(other) => panic!("'{}': unexpected error {}", to, other),
            Ok(_) => panic!("'{}' should be rejected", to),
        }
    }
}
