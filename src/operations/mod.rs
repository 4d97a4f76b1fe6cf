//! Actions executed by operations
//!
//! One action type per directive kind. Build-time concerns (resource
//! loading, namespacing, timeouts) are handled by the step processor; the
//! actions here only talk to the cluster or the local system.

pub mod apply;
pub mod assert;
pub mod command;
pub mod create;
pub mod delete;
pub mod error;
pub mod script;
pub mod sleep;

pub use apply::Apply;
pub use assert::Assert;
pub use command::Command;
pub use create::Create;
pub use delete::Delete;
pub use error::ErrorCheck;
pub use script::Script;
pub use sleep::Sleep;
