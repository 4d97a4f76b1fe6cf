//! kubestep - declarative end-to-end tests for Kubernetes
//!
//! Runs step-based YAML tests against a cluster through kubectl.

use clap::Parser;
use kubestep::common::logging;
use kubestep::{cli, commands::Commands};

#[derive(Parser)]
#[command(name = "kubestep", about = "Declarative Kubernetes test runner")]
#[command(version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.command.verbose());

    if let Err(e) = cli::dispatch(cli.command).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
