//! Test execution engine
//!
//! Reads YAML test documents and runs their steps against a cluster client.
//! Steps are built in full before they run; assertions poll until the
//! cluster converges or the operation's timeout expires.

pub mod cleanup;
pub mod collect;
pub mod config;
pub mod context;
pub mod logging;
pub mod namespacer;
pub mod operation;
pub mod poll;
pub mod report;
pub mod runner;
pub mod step;
pub mod timeout;

pub use config::{discover, load_test, Test};
pub use context::Context;
pub use report::Report;
pub use runner::{print_summary, Runner, TestResult};
