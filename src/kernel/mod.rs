//! Thin wrappers around Linux kernel primitives.
//!
//! Raw libc calls live here with explicit SAFETY comments.
//! `rlimit`, `signal` and the sealing half of `fd` run in the forked child
//! and are async-signal-safe; `wait` runs in the parent.

pub mod fd;
pub mod rlimit;
pub mod signal;
pub mod wait;
