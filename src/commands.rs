//! CLI command definitions
//!
//! Defines the clap commands for the kubestep CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run tests against the current cluster
    Test {
        /// Test files, or directories searched for test files
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,

        /// Configuration file (default: config.toml in the user config directory)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Keep objects created by tests
        #[arg(long)]
        skip_delete: bool,

        /// Number of tests run concurrently
        #[arg(long)]
        parallel: Option<usize>,

        /// Run every test in this namespace
        #[arg(long)]
        namespace: Option<String>,

        /// Write a JSON report to this file
        #[arg(long)]
        report_path: Option<PathBuf>,

        /// Stop after the first failed test
        #[arg(long)]
        fail_fast: bool,

        /// kubeconfig context to use
        #[arg(long)]
        kube_context: Option<String>,

        /// kubeconfig file to use
        #[arg(long)]
        kubeconfig: Option<PathBuf>,

        /// Verbose output
        #[arg(long, short)]
        verbose: bool,
    },

    /// Check that test files parse and build without touching a cluster
    Lint {
        /// Test files, or directories searched for test files
        #[arg(default_value = ".")]
        paths: Vec<PathBuf>,

        /// Configuration file (default: config.toml in the user config directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Commands {
    pub fn verbose(&self) -> bool {
        matches!(self, Commands::Test { verbose: true, .. })
    }
}
