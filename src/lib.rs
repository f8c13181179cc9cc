//! limitrun: launch one program under kernel resource limits and report how it ended
//!
//! The supervisor forks, installs `setrlimit` ceilings in the child, seals
//! inherited descriptors and execs the target. The parent waits for it and
//! writes a single fixed-layout usage record to a descriptor supplied by the
//! caller.
//!
//! # Architecture
//!
//! ## Kernel Primitives ([`kernel`])
//! - [`kernel::rlimit`]: CPU, address space and file size limits
//! - [`kernel::fd`]: descriptor flags and close-on-exec sealing
//! - [`kernel::signal`]: signal dispositions reset before exec
//! - [`kernel::wait`]: `wait4` with resource usage
//!
//! ## Execution Control ([`exec`])
//! - [`exec::preexec`]: type-state enforced pre-exec ordering
//! - [`exec::launcher`]: fork, launch and wait
//!
//! ## Reporting ([`report`])
//! - [`report::record`]: native and versioned record layouts
//! - [`report::channel`]: the one-shot report descriptor
//! - [`report::outcome`]: status decoding and verdict tags
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: shared types and error taxonomy
//! - [`config::loader`]: JSON configuration file
//!
//! # Design Principles
//!
//! 1. **Fail before the fork** - everything that can be validated is validated in the parent
//! 2. **Async-signal-safe child** - no allocation or logging between fork and exec
//! 3. **Types prevent errors** - the pre-exec order cannot be written wrong
//! 4. **Kernel as truth** - usage comes from `wait4`, never from sampling

// Kernel Primitives
pub mod kernel;

// Execution Control
pub mod exec;

// Reporting
pub mod report;

// Configuration
pub mod config;

// CLI entrypoint wiring for the limitrun binary.
pub mod cli;

// Re-export commonly used types for convenience
pub use config::types::*;
pub use exec::{spawn, supervise, RunningChild};
pub use report::{read_record, Outcome, ReportChannel, ResultRecord, Verdict};
