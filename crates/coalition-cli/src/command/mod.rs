use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use self::{analyze::AnalyzeArg, default_weights::DefaultWeightsArg};

mod analyze;
mod default_weights;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Log debug events (overridden by `COALITION_LOG`)
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Compute Shapley contributions for one roster
    Analyze(#[clap(flatten)] AnalyzeArg),
    /// Print the default value weights as JSON
    DefaultWeights(#[clap(flatten)] DefaultWeightsArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    init_logging(args.verbose);
    match args.mode {
        Mode::Analyze(arg) => analyze::run(&arg)?,
        Mode::DefaultWeights(arg) => default_weights::run(&arg)?,
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env("COALITION_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
