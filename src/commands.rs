//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::Subcommand;
use std::path::PathBuf;

use crate::harness::Expectation;

#[derive(Subcommand)]
pub enum Commands {
    /// Run data-defined tests against a Marionette server
    Run {
        /// Test files or directories containing test_*.js files
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Marionette server address (host:port)
        #[arg(long)]
        address: Option<String>,

        /// Browser binary to launch with -marionette before connecting
        #[arg(long)]
        binary: Option<PathBuf>,

        /// Uniform search/script/page timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Whether the tests are expected to pass or fail
        #[arg(long, value_enum)]
        expected: Option<Expectation>,

        /// Write structured results as JSON lines to this file
        #[arg(long)]
        log_json: Option<PathBuf>,

        /// Configuration file (defaults to the platform config path)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Run tests inside the test container app
        #[arg(long)]
        test_container: bool,
    },

    /// List data-defined tests and their directives
    List {
        /// Test files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}
