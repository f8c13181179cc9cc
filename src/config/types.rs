//! Core types shared by the launcher, the reporter and the CLI

use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use thiserror::Error;

/// Exit code of a child whose image replacement failed.
pub const EXIT_LAUNCH_FAILED: i32 = 127;

/// Exit code of a child that could not install its limits under `LimitPolicy::Strict`.
pub const EXIT_LIMITS_FAILED: i32 = 125;

/// Resource ceilings applied to the launched program.
///
/// Each value is installed as both soft and hard limit. Zero is passed to the
/// kernel unchanged; `u64::MAX` is `RLIM_INFINITY`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSet {
    /// CPU time ceiling in seconds
    pub cpu_time_secs: u64,
    /// Virtual address space ceiling in bytes
    pub address_space_bytes: u64,
    /// Largest file the program may write, in bytes
    pub file_size_bytes: u64,
}

impl LimitSet {
    pub fn new(cpu_time_secs: u64, address_space_bytes: u64, file_size_bytes: u64) -> Self {
        Self {
            cpu_time_secs,
            address_space_bytes,
            file_size_bytes,
        }
    }

    /// Parse one limit value from the command line.
    ///
    /// Accepts a decimal integer or `unlimited` / `infinity`.
    pub fn parse_value(raw: &str) -> std::result::Result<u64, String> {
        match raw.trim() {
            "unlimited" | "infinity" => Ok(libc::RLIM_INFINITY as u64),
            value => value
                .parse::<u64>()
                .map_err(|e| format!("invalid limit '{}': {}", raw, e)),
        }
    }
}

/// What to do when `setrlimit` fails in the child.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitPolicy {
    /// Report the failure on stderr and launch anyway.
    #[default]
    BestEffort,
    /// Terminate the child with `EXIT_LIMITS_FAILED` before exec.
    Strict,
}

/// Wire encoding of the result record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RecordFormat {
    /// Fixed `repr(C)` layout in native byte order, no header.
    #[default]
    Native,
    /// Magic, version and length prefix followed by little-endian fields.
    Versioned,
}

/// Program to launch and its argument vector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Path or bare name, resolved through `PATH` like `execvp`
    pub program: OsString,
    /// Arguments after argv[0]
    pub args: Vec<OsString>,
}

impl LaunchSpec {
    pub fn new<P, I, A>(program: P, args: I) -> Self
    where
        P: Into<OsString>,
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from a full command line where the first element is the program.
    pub fn from_command(command: Vec<OsString>) -> Result<Self> {
        let mut parts = command.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| SupervisorError::Setup("empty command".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }

    /// The full argv as C strings, argv[0] being the program as given.
    pub fn to_cstrings(&self) -> Result<Vec<CString>> {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|arg| {
                CString::new(arg.as_bytes()).map_err(|_| {
                    SupervisorError::Setup(format!(
                        "command argument contains NUL byte: {:?}",
                        arg
                    ))
                })
            })
            .collect()
    }
}

/// Options of a single launch that are not limits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpawnOptions {
    pub limit_policy: LimitPolicy,
    /// Descriptors above stderr that survive into the launched program
    pub keep_fds: Vec<RawFd>,
}

/// Errors raised by the supervisor (parent side)
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Setup error: {0}")]
    Setup(String),

    #[error("fork() failed: {0}")]
    Split(Errno),

    #[error("wait4() failed: {0}")]
    Wait(Errno),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

impl SupervisorError {
    /// Process exit code used by the binary for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Io(_) | Self::Config(_) | Self::Setup(_) => 3,
            Self::Split(_) => 4,
            Self::Wait(_) => 5,
            Self::Report(_) => 6,
        }
    }
}

/// Errors writing or reading a result record
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("write() failed: {0}")]
    Write(Errno),

    #[error("incomplete record: {read} of {expected} bytes")]
    Incomplete { read: usize, expected: usize },

    #[error("bad record magic {0:02x?}")]
    BadMagic([u8; 3]),

    #[error("unsupported record version {0}")]
    UnsupportedVersion(u8),

    #[error("record payload length {found}, expected {expected}")]
    LengthMismatch { found: usize, expected: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
