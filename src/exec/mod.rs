//! Execution control
//!
//! Forks the supervisor, drives the child through the type-state pre-exec
//! chain, and waits for it in the parent.

pub mod launcher;
pub mod preexec;

pub use launcher::{spawn, supervise, RunningChild};
