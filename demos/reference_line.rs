//! Reference SMT Line Example
//!
//! Runs the reference assembly line (or a line loaded from a YAML/JSON file)
//! and prints the utilization and energy report.
//!
//! Usage:
//!
//! ```text
//! cargo run --example reference_line
//! cargo run --example reference_line -- line.yaml
//! cargo run --example reference_line -- line.yaml activity_log.txt
//! ```
//!
//! With a second argument, every state change and hand-off is written to
//! that file. The log can get very large.

use std::fs::File;
use std::io::BufWriter;

use smtline::{
    capacity_sweep, k_sweep, sweep_to_csv, AssemblyLine, LineConfig, SimError, TextTrace,
};

fn main() -> Result<(), SimError> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let config = match args.first() {
        Some(path) => LineConfig::from_file(path)?,
        None => LineConfig::reference(),
    };
    smtline::init_logging(&config.simulation.log_level);

    println!(
        "Running '{}' for a maximum of {} hours,",
        config.name, config.simulation.max_hours
    );
    println!(
        "or until {} PCBs have been processed, whichever is earlier.",
        config.simulation.batch_size
    );

    let sweep_base = config.clone();
    let line = match args.get(1) {
        Some(log) => {
            let file = File::create(log).map_err(smtline::ConfigError::from)?;
            println!("Activity log: {}", log);
            AssemblyLine::with_trace(config, Box::new(TextTrace::new(BufWriter::new(file))))?
        }
        None => AssemblyLine::new(config)?,
    };

    let report = line.run()?;
    println!();
    println!("{}", report.summary());
    println!("(wall time {:.1} ms)", report.wall_time_ms);

    // small k and capacity sweeps on the same line, as in the buffering experiments
    if sweep_base.find_machine("reflow_oven").is_some() {
        let mut base = sweep_base;
        base.simulation.batch_size = base.simulation.batch_size.min(256);
        match k_sweep(&base, &[0, 4, 8, 16]) {
            Ok(points) => {
                println!("--- Oven turn-on margin sweep ---");
                print!("{}", sweep_to_csv(&points, "reflow_oven"));
            }
            Err(e) => println!("sweep skipped: {}", e),
        }
        match capacity_sweep(&base, &[4, 8, 16, 32]) {
            Ok(points) => {
                println!("--- Buffer capacity sweep ---");
                print!("{}", sweep_to_csv(&points, "reflow_oven"));
            }
            Err(e) => println!("sweep skipped: {}", e),
        }
    }

    Ok(())
}
