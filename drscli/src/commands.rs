use super::*;

mod check;
mod run;

pub use check::*;
pub use run::*;

/// All CLI commands available in this binary.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Run a scenario simulation.
    #[command(alias = "r")]
    Run(Run),

    /// Inspect a scenario's network: source support, feeder partition and
    /// switch classification.
    #[command(alias = "c")]
    Check(Check),
}

#[derive(clap::Args, Debug)]
pub struct Run {
    /// Path to the scenario JSON/YAML file.
    path: PathBuf,
    /// Print the run report as JSON (Hint: redirect stdout)
    #[arg(short, long, default_value_t = false)]
    json: bool,
    /// Directory to save the run report into.
    #[arg(short, long)]
    report_dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct Check {
    /// Path to the scenario JSON/YAML file.
    path: PathBuf,
}

impl Command {
    pub fn run(self) {
        match self {
            Command::Run(args) => args.run(),
            Command::Check(args) => args.run(),
        }
    }
}
