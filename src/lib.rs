//! kubestep - declarative end-to-end tests for Kubernetes
//!
//! Tests are YAML documents made of steps. Each step runs `try`
//! operations (apply, create, assert, error, delete, command, script,
//! sleep), then `catch` collectors when something failed and `finally`
//! operations regardless. Objects created along the way are deleted
//! in reverse order when the test ends.

pub mod check;
pub mod cli;
pub mod client;
pub mod commands;
pub mod common;
pub mod operations;
pub mod resource;
pub mod testing;

pub use common::{Error, Result};
