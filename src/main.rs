//! Marionette test harness
//!
//! Runs data-defined JavaScript tests against a browser through the
//! Marionette remote protocol and reports one outcome per test.

use clap::Parser;
use marionette_harness::commands::Commands;
use marionette_harness::common::logging;
use marionette_harness::{cli, Error};

#[derive(Parser)]
#[command(name = "marionette-harness", about = "Marionette test harness")]
#[command(version, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    let code = match cli::dispatch(cli.command).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(Error::Interrupted) => 130,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };
    std::process::exit(code);
}
