use clap::Parser;
use std::path::PathBuf;

/// Print an error message and exit with the given code.
macro_rules! fatal_error {
    ($code:expr, $($arg:tt)*) => {{
        use colored::Colorize;
        eprintln!("{} {}", "ERROR:".red().bold(), format!($($arg)*));
        std::process::exit($code);
    }};
}

mod commands;

#[derive(clap::Parser, Debug)]
#[command(version, about = "Distribution restoration simulator")]
struct Args {
    #[command(subcommand)]
    command: commands::Command,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    args.command.run();
}
