//! Signal disposition handling for the launched child
//!
//! The Rust runtime ignores SIGPIPE in every binary it starts, and ignored
//! dispositions survive exec. The child puts SIGPIPE back to its default so
//! the target program sees the same signal behaviour it would under a shell.

use nix::errno::Errno;

/// Restore the default disposition of SIGPIPE. Async-signal-safe.
pub fn restore_default_sigpipe() -> Result<(), Errno> {
    // SAFETY: installing SIG_DFL never runs user code.
    let previous = unsafe { libc::signal(libc::SIGPIPE, libc::SIG_DFL) };
    if previous == libc::SIG_ERR {
        Err(Errno::last())
    } else {
        Ok(())
    }
}
