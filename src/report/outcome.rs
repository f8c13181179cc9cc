//! Decoding of raw wait statuses into caller-facing outcomes
//!
//! The supervisor never decodes the status it reports; this is the reader's
//! half of the contract.

use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};

/// How a child ended, decoded from its raw wait status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Exited { code: i32 },
    Signaled { signal: i32, core_dumped: bool },
    Unknown { raw: i32 },
}

/// Judging classification of an outcome - STABLE TAXONOMY
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Program exited on its own (any exit code)
    #[serde(rename = "OK")]
    Ok,
    /// CPU time ceiling reached (SIGXCPU)
    #[serde(rename = "TLE")]
    TimeLimit,
    /// Killed with SIGKILL (hard CPU limit or external kill)
    #[serde(rename = "KILLED")]
    Killed,
    /// File size ceiling reached (SIGXFSZ)
    #[serde(rename = "OLE")]
    OutputLimit,
    /// Any other fatal signal
    #[serde(rename = "RE")]
    RuntimeError,
    #[serde(rename = "UKE")]
    Unknown,
}

impl Outcome {
    pub fn from_raw(status: libc::c_int) -> Self {
        if libc::WIFEXITED(status) {
            Self::Exited {
                code: libc::WEXITSTATUS(status),
            }
        } else if libc::WIFSIGNALED(status) {
            Self::Signaled {
                signal: libc::WTERMSIG(status),
                core_dumped: libc::WCOREDUMP(status),
            }
        } else {
            Self::Unknown { raw: status }
        }
    }

    pub fn verdict(&self) -> Verdict {
        match *self {
            Self::Exited { .. } => Verdict::Ok,
            Self::Signaled { signal, .. } => match Signal::try_from(signal) {
                Ok(Signal::SIGXCPU) => Verdict::TimeLimit,
                Ok(Signal::SIGKILL) => Verdict::Killed,
                Ok(Signal::SIGXFSZ) => Verdict::OutputLimit,
                _ => Verdict::RuntimeError,
            },
            Self::Unknown { .. } => Verdict::Unknown,
        }
    }

    /// Exit code for `Exited`, signal number for `Signaled`, raw status otherwise.
    pub fn code(&self) -> i32 {
        match *self {
            Self::Exited { code } => code,
            Self::Signaled { signal, .. } => signal,
            Self::Unknown { raw } => raw,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Exited { code } => write!(f, "exited with code {}", code),
            Self::Signaled {
                signal,
                core_dumped,
            } => {
                match Signal::try_from(signal) {
                    Ok(sig) => write!(f, "killed by {}", sig.as_str())?,
                    Err(_) => write!(f, "killed by signal {}", signal)?,
                }
                if core_dumped {
                    write!(f, " (core dumped)")?;
                }
                Ok(())
            }
            Self::Unknown { raw } => write!(f, "unknown status {:#x}", raw),
        }
    }
}
