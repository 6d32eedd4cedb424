mod commands;
mod opts;
mod output;
mod script;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::inspect::InspectArgs;
use commands::replay::ReplayArgs;
use opts::GlobalOpts;

#[derive(Parser, Debug)]
#[command(name = "waypoint", version, about = "Navigation history sync tools")]
struct Cli {
    #[command(flatten)]
    opts: GlobalOpts,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a JSON navigation script against a simulated platform history
    Replay(ReplayArgs),

    /// Print the stack persisted in a mirror directory
    Inspect(InspectArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.opts);

    match cli.command {
        Command::Replay(args) => commands::replay::cmd_replay(&cli.opts, &args).await,
        Command::Inspect(args) => commands::inspect::cmd_inspect(&cli.opts, &args),
    }
}

/// Logs go to stderr; `log` records from the engine crates are bridged in.
fn setup_logging(opts: &GlobalOpts) {
    let default = if opts.quiet { "error" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
