//! Per-kind operation timeouts
//!
//! Timeouts are layered: global configuration, then the test, then the step.
//! A more specific layer only overrides the fields it sets.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_APPLY: Duration = Duration::from_secs(5);
pub const DEFAULT_ASSERT: Duration = Duration::from_secs(30);
pub const DEFAULT_CLEANUP: Duration = Duration::from_secs(30);
pub const DEFAULT_DELETE: Duration = Duration::from_secs(15);
pub const DEFAULT_ERROR: Duration = Duration::from_secs(30);
pub const DEFAULT_EXEC: Duration = Duration::from_secs(5);

/// Optional timeout per operation kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeouts {
    #[serde(
        default,
        with = "crate::common::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub apply: Option<Duration>,
    #[serde(
        default,
        with = "crate::common::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub assert: Option<Duration>,
    #[serde(
        default,
        with = "crate::common::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub cleanup: Option<Duration>,
    #[serde(
        default,
        with = "crate::common::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub delete: Option<Duration>,
    #[serde(
        default,
        with = "crate::common::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<Duration>,
    #[serde(
        default,
        with = "crate::common::duration::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub exec: Option<Duration>,
}

impl Timeouts {
    /// Overlay `other` on top of `self`; fields set in `other` win
    pub fn combine(&self, other: &Timeouts) -> Timeouts {
        Timeouts {
            apply: other.apply.or(self.apply),
            assert: other.assert.or(self.assert),
            cleanup: other.cleanup.or(self.cleanup),
            delete: other.delete.or(self.delete),
            error: other.error.or(self.error),
            exec: other.exec.or(self.exec),
        }
    }

    pub fn apply_duration(&self) -> Duration {
        self.apply.unwrap_or(DEFAULT_APPLY)
    }

    pub fn assert_duration(&self) -> Duration {
        self.assert.unwrap_or(DEFAULT_ASSERT)
    }

    pub fn cleanup_duration(&self) -> Duration {
        self.cleanup.unwrap_or(DEFAULT_CLEANUP)
    }

    pub fn delete_duration(&self) -> Duration {
        self.delete.unwrap_or(DEFAULT_DELETE)
    }

    pub fn error_duration(&self) -> Duration {
        self.error.unwrap_or(DEFAULT_ERROR)
    }

    pub fn exec_duration(&self) -> Duration {
        self.exec.unwrap_or(DEFAULT_EXEC)
    }
}

/// An explicit per-operation timeout wins, otherwise the layered default
pub fn resolve(explicit: Option<Duration>, fallback: impl FnOnce() -> Duration) -> Duration {
    explicit.unwrap_or_else(fallback)
}
