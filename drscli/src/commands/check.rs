//! Command for inspecting a scenario's network without running it.

use colored::Colorize;

use drslib::feeders::{self, SwitchRole};
use drslib::io::Scenario;
use drslib::support;
use drslib::types::UNASSIGNED;
use drslib::utils::format_phases;

use super::*;

impl Check {
    pub fn run(self) {
        let Check { path } = self;

        let scenario = match Scenario::read_from_file(&path) {
            Ok(s) => s,
            Err(err) => fatal_error!(1, "Cannot read scenario: {}", err),
        };
        let top = match scenario.network.build() {
            Ok(top) => top,
            Err(err) => fatal_error!(1, "Cannot build network: {}", err),
        };

        let flags = support::compute(&top);
        let partition = feeders::partition(&top);

        println!("{}", "Buses:".bold());
        for (i, bus) in top.buses.iter().enumerate() {
            let feeder = match partition.feeder_of[i] {
                UNASSIGNED => "-".to_string(),
                id => id.to_string(),
            };
            let supported = if flags.bus_supported(&top, i) {
                "supported".green()
            } else {
                "unsupported".red().bold()
            };
            println!(
                "  {:>3}  {:<16} {:<4} feeder {:<3} {}",
                i,
                bus.name,
                format_phases(&bus.phases),
                feeder,
                supported
            );
        }

        println!("{}", "Switches:".bold());
        for i in 0..top.branch_count() {
            if let Some(role) = partition.classify(&top, i) {
                let branch = &top.branches[i];
                let role = match role {
                    SwitchRole::Tie => "tie".yellow(),
                    SwitchRole::Sectionalizing => "sectionalizing".normal(),
                };
                println!(
                    "  {:>3}  {:<16} {:?} {}",
                    i, branch.name, branch.status, role
                );
            }
        }

        let unsupported = flags.unsupported_buses(&top);
        if unsupported.is_empty() {
            println!("{}", "All buses supported.".green().bold());
        } else {
            println!(
                "{} {:?}",
                "Unsupported buses:".red().bold(),
                unsupported
            );
        }
    }
}
