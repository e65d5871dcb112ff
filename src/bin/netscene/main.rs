use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use gen_config::gen_config;
use run::run;

mod gen_config;
mod run;

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a scenario config file with the reference defaults
    GenConfig {
        /// File to write the scenario config to
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Assemble a scenario and run it to its stop time
    Run {
        /// Scenario config file (JSON); omit for the built-in defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the number of shared-medium nodes beyond the bridge
        #[arg(long)]
        shared: Option<usize>,

        /// Override the number of wireless stations
        #[arg(long)]
        stations: Option<usize>,

        /// Override the run's random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Record frame traces and print them after the run
        #[arg(short, long)]
        tracing: bool,

        /// Log scheduler, stack, and agent activity as the run progresses
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Scripted network scenario simulator", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::GenConfig { output } => gen_config(&output),
        Command::Run {
            config,
            shared,
            stations,
            seed,
            tracing,
            verbose,
        } => run(
            config.as_deref(),
            shared,
            stations,
            seed,
            tracing,
            verbose,
        ),
    }
}
