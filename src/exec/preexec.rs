//! Pre-exec ordering for the launched child
//!
//! The child-side sequence is fixed:
//! 1. install resource limits (CPU, address space, file size)
//! 2. seal inherited state: descriptors (only stdio and the explicit keep
//!    list survive) and the runtime's ignored SIGPIPE
//! 3. exec payload
//!
//! Limits go in before the image is replaced so the new image starts under
//! them. Nothing here allocates once a `Payload` exists: between `fork()`
//! and `execvp()` of a multi-threaded parent only async-signal-safe calls
//! are allowed.

use crate::config::types::{
    LimitPolicy, LimitSet, Result, SupervisorError, EXIT_LAUNCH_FAILED, EXIT_LIMITS_FAILED,
};
use crate::kernel::{fd, rlimit, signal};
use nix::errno::Errno;
use std::ffi::CString;
use std::marker::PhantomData;
use std::os::unix::io::RawFd;

/// Argument vector prepared before the fork.
pub struct ExecArgv {
    args: Vec<CString>,
    ptrs: Vec<*const libc::c_char>,
}

impl ExecArgv {
    /// `args[0]` is the program, resolved through `PATH` by `execvp`.
    pub fn new(args: Vec<CString>) -> Result<Self> {
        if args.is_empty() {
            return Err(SupervisorError::Setup(
                "empty command for exec".to_string(),
            ));
        }
        let ptrs = args
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect();
        Ok(Self { args, ptrs })
    }

    pub fn program(&self) -> &CString {
        &self.args[0]
    }
}

/// A failed child-side step. Carries only static data so it can be built and
/// reported without allocating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildFailure {
    pub context: &'static str,
    pub errno: Errno,
    pub exit_code: i32,
}

impl ChildFailure {
    /// Write `limitrun: <context>: <errno>` to stderr and `_exit`.
    pub fn abort(self, subject: Option<&[u8]>) -> ! {
        report_child_error(self.context, subject, self.errno);
        // SAFETY: _exit skips atexit handlers and stdio flushing of the
        // parent's duplicated state, which is what a forked child needs.
        unsafe { libc::_exit(self.exit_code) }
    }
}

fn write_stderr(bytes: &[u8]) {
    // SAFETY: writing a valid buffer to stderr.
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            bytes.as_ptr() as *const libc::c_void,
            bytes.len(),
        );
    }
}

/// Async-signal-safe error line on stderr.
pub fn report_child_error(context: &str, subject: Option<&[u8]>, errno: Errno) {
    write_stderr(b"limitrun: ");
    write_stderr(context.as_bytes());
    if let Some(subject) = subject {
        write_stderr(b" '");
        write_stderr(subject);
        write_stderr(b"'");
    }
    write_stderr(b": ");
    write_stderr(errno.desc().as_bytes());
    write_stderr(b"\n");
}

fn limit_failure_context(resource: rlimit::LimitResource) -> &'static str {
    match resource {
        rlimit::LimitResource::CpuTime => "setrlimit(RLIMIT_CPU) failed",
        rlimit::LimitResource::AddressSpace => "setrlimit(RLIMIT_AS) failed",
        rlimit::LimitResource::FileSize => "setrlimit(RLIMIT_FSIZE) failed",
    }
}

/// Apply the limit policy to one failed `setrlimit`.
///
/// Best effort reports and continues; strict turns the failure into a child
/// exit with `EXIT_LIMITS_FAILED`.
pub fn on_limit_failure(
    policy: LimitPolicy,
    resource: rlimit::LimitResource,
    errno: Errno,
) -> std::result::Result<(), ChildFailure> {
    let context = limit_failure_context(resource);
    match policy {
        LimitPolicy::Strict => Err(ChildFailure {
            context,
            errno,
            exit_code: EXIT_LIMITS_FAILED,
        }),
        LimitPolicy::BestEffort => {
            report_child_error(context, None, errno);
            Ok(())
        }
    }
}

/// Type-state marker: freshly forked child, nothing applied yet
pub struct Forked;

/// Type-state marker: resource limits installed
pub struct LimitsInstalled;

/// Type-state marker: descriptors sealed, ready for exec
pub struct Sealed;

/// Child process on its way to exec, state tracked by `S`.
///
/// Each step consumes the prior state; only `Payload<Sealed>` can exec.
///
/// ```compile_fail
/// use limitrun::exec::preexec::{ExecArgv, Payload};
/// let argv = ExecArgv::new(vec![std::ffi::CString::new("true").unwrap()]).unwrap();
/// // exec before limits are installed
/// Payload::new(&argv).exec();
/// ```
///
/// ```compile_fail
/// use limitrun::config::types::{LimitPolicy, LimitSet};
/// use limitrun::exec::preexec::{ExecArgv, Payload};
/// let argv = ExecArgv::new(vec![std::ffi::CString::new("true").unwrap()]).unwrap();
/// let payload = Payload::new(&argv)
///     .install_limits(&LimitSet::new(1, 1 << 28, 1 << 20), LimitPolicy::Strict)
///     .unwrap();
/// // exec with descriptors still unsealed
/// payload.exec();
/// ```
///
/// ```compile_fail
/// use limitrun::exec::preexec::{ExecArgv, Payload};
/// let argv = ExecArgv::new(vec![std::ffi::CString::new("true").unwrap()]).unwrap();
/// // sealing before limits are installed
/// Payload::new(&argv).seal_descriptors(&[], &[]);
/// ```
pub struct Payload<'a, S> {
    argv: &'a ExecArgv,
    _state: PhantomData<S>,
}

impl<'a> Payload<'a, Forked> {
    /// Start the chain. Only meaningful in a freshly forked child: each step
    /// changes the calling process.
    pub fn new(argv: &'a ExecArgv) -> Self {
        Self {
            argv,
            _state: PhantomData,
        }
    }

    pub fn install_limits(
        self,
        limits: &LimitSet,
        policy: LimitPolicy,
    ) -> std::result::Result<Payload<'a, LimitsInstalled>, ChildFailure> {
        rlimit::install_all(limits, |resource, errno| {
            on_limit_failure(policy, resource, errno)
        })?;

        Ok(Payload {
            argv: self.argv,
            _state: PhantomData,
        })
    }
}

impl<'a> Payload<'a, LimitsInstalled> {
    /// `keep` must already be normalized; `snapshot` is the parent's
    /// descriptor table taken before the fork.
    pub fn seal_descriptors(
        self,
        keep: &[RawFd],
        snapshot: &[RawFd],
    ) -> std::result::Result<Payload<'a, Sealed>, ChildFailure> {
        fd::seal_inherited_fds(keep, snapshot).map_err(|errno| ChildFailure {
            context: "sealing inherited descriptors failed",
            errno,
            exit_code: EXIT_LAUNCH_FAILED,
        })?;
        signal::restore_default_sigpipe().map_err(|errno| ChildFailure {
            context: "restoring SIGPIPE disposition failed",
            errno,
            exit_code: EXIT_LAUNCH_FAILED,
        })?;

        Ok(Payload {
            argv: self.argv,
            _state: PhantomData,
        })
    }
}

impl<'a> Payload<'a, Sealed> {
    /// Replace the process image. Returns only on failure.
    pub fn exec(self) -> ChildFailure {
        // SAFETY: `ptrs` is a NULL-terminated array of pointers into `args`,
        // both owned by `argv` which outlives this call.
        unsafe {
            libc::execvp(self.argv.args[0].as_ptr(), self.argv.ptrs.as_ptr());
        }
        ChildFailure {
            context: "execvp() failed for",
            errno: Errno::last(),
            exit_code: EXIT_LAUNCH_FAILED,
        }
    }
}
