//! Command for running scenario simulations.

use colored::Colorize;

use drslib::io::{fs, Scenario};
use drslib::restoration::TimestepOutcome;
use drslib::sim::{RunReport, SimError};
use drslib::solver::sweep::SweepSolver;
use drslib::topology::LinkStatus;

use super::*;

fn print_step_lines(report: &RunReport) {
    for step in &report.steps {
        let voltage = match step.min_voltage_pu {
            Some(pu) => format!("{:.4} pu min", pu),
            None => "de-energized".to_string(),
        };
        match &step.outcome {
            TimestepOutcome::Idle => {
                println!("step {:>3}  {}  {}", step.step, "supported".green(), voltage);
            }
            TimestepOutcome::Restored(restored) => {
                let actions: Vec<String> = restored
                    .plan
                    .iter()
                    .map(|a| {
                        let verb = match a.status {
                            LinkStatus::Closed => "close",
                            LinkStatus::Open => "open",
                        };
                        format!("{} {}", verb, a.name)
                    })
                    .collect();
                println!(
                    "step {:>3}  {}  {} after {} trial(s): {}",
                    step.step,
                    "restored".yellow().bold(),
                    voltage,
                    restored.attempts,
                    actions.join(", ")
                );
                for minimum in &restored.feeder_minimums {
                    println!(
                        "          feeder {}: {:.4} pu minimum at {}",
                        minimum.feeder, minimum.min_voltage_pu, minimum.bus
                    );
                }
            }
        }
    }
}

fn print_failure(err: &SimError) {
    eprintln!("{} {}", "Run failed:".red().bold(), err);
    eprintln!("Final protection states:");
    for state in &err.protection_states {
        eprintln!("  {:<24} {:?} {:?}", state.name, state.kind, state.status);
    }
}

impl Run {
    pub fn run(self) {
        let Run {
            path,
            json,
            report_dir,
        } = self;

        let scenario = match Scenario::read_from_file(&path) {
            Ok(s) => s,
            Err(err) => fatal_error!(1, "Cannot read scenario: {}", err),
        };
        let name = scenario.name.clone().unwrap_or_else(|| "-".to_string());

        eprintln!("{} {}", "Scenario:".bold(), name);
        let mut sim = match scenario.prepare(SweepSolver::default()) {
            Ok(sim) => sim,
            Err(err) => fatal_error!(1, "Cannot prepare scenario: {}", err),
        };

        match sim.run() {
            Ok(report) => {
                print_step_lines(&report);
                if let Some(dir) = report_dir {
                    if let Err(err) = fs::save_report(&dir, &name, &report) {
                        log::error!("Failed to save report {}: {}", name, err);
                    }
                }
                if json {
                    let serialized = match serde_json::to_string_pretty(&report) {
                        Ok(s) => s,
                        Err(err) => fatal_error!(1, "Error while serializing report: {}", err),
                    };
                    println!("{}", serialized);
                }
                eprintln!("{} {}", "Max memory usage:".bold(), report.max_memory);
                eprintln!("{}", "Done!".green().bold());
            }
            Err(err) => {
                print_failure(&err);
                std::process::exit(2);
            }
        }
    }
}
