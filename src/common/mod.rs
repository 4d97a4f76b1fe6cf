//! Common utilities shared by the engine and the CLI

pub mod config;
pub mod duration;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the data if a holder panicked
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
