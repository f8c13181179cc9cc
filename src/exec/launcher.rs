use crate::config::types::{LaunchSpec, LimitSet, Result, SpawnOptions, SupervisorError};
use crate::exec::preexec::{ExecArgv, Payload};
use crate::kernel::fd;
use crate::kernel::wait::wait_for_termination;
use crate::report::{ReportChannel, ResultRecord};
use nix::unistd::{fork, ForkResult, Pid};
use std::os::unix::io::RawFd;

/// A launched child that has not been waited for yet.
#[must_use = "a spawned child must be waited for, or it stays a zombie"]
#[derive(Debug)]
pub struct RunningChild {
    pid: Pid,
}

impl RunningChild {
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Block until the child terminates and collect its result record.
    pub fn wait(self) -> Result<ResultRecord> {
        let termination = wait_for_termination(self.pid).map_err(SupervisorError::Wait)?;
        let record = ResultRecord::from_termination(&termination);
        log::debug!("child {} terminated: {:?}", self.pid, record);
        Ok(record)
    }
}

fn validate_keep_fds(keep: &[RawFd]) -> Result<()> {
    for &candidate in keep {
        fd::is_cloexec(candidate).map_err(|errno| {
            SupervisorError::Setup(format!(
                "descriptor {} requested to stay open is not open: {}",
                candidate, errno
            ))
        })?;
    }
    Ok(())
}

/// Fork and launch `spec` under `limits`.
///
/// Everything that can fail in the parent (argument conversion, keep-list
/// validation, descriptor snapshot) happens before the fork. The child
/// installs limits, seals descriptors and execs; if any of that fails it
/// exits with `EXIT_LIMITS_FAILED` or `EXIT_LAUNCH_FAILED`, which the parent
/// observes as an ordinary termination.
pub fn spawn(spec: &LaunchSpec, limits: &LimitSet, options: &SpawnOptions) -> Result<RunningChild> {
    let argv = ExecArgv::new(spec.to_cstrings()?)?;
    let keep = fd::normalize_keep_fds(&options.keep_fds);
    validate_keep_fds(&keep)?;

    let snapshot = fd::open_fds().unwrap_or_else(|e| {
        log::warn!("Failed to snapshot /proc/self/fd, relying on close_range: {}", e);
        Vec::new()
    });

    log::debug!(
        "launching {:?} with {:?}, policy {:?}, keep {:?}",
        spec.program,
        limits,
        options.limit_policy,
        keep
    );

    // SAFETY: the child branch only runs async-signal-safe code (setrlimit,
    // fcntl, close_range, execvp, write, _exit) on data prepared above.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            match Payload::new(&argv)
                .install_limits(limits, options.limit_policy)
                .and_then(|payload| payload.seal_descriptors(&keep, &snapshot))
            {
                Ok(payload) => payload.exec().abort(Some(argv.program().as_bytes())),
                Err(failure) => failure.abort(None),
            }
        }
        Ok(ForkResult::Parent { child }) => {
            log::info!("spawned child {} for {:?}", child, spec.program);
            Ok(RunningChild { pid: child })
        }
        Err(errno) => Err(SupervisorError::Split(errno)),
    }
}

/// Launch, wait, and deliver the record on `channel`: the whole supervisor.
///
/// `channel` must already be prepared (close-on-exec) and may not appear in
/// the keep list.
pub fn supervise(
    spec: &LaunchSpec,
    limits: &LimitSet,
    options: &SpawnOptions,
    channel: ReportChannel,
) -> Result<ResultRecord> {
    if options.keep_fds.contains(&channel.fd()) {
        return Err(SupervisorError::Setup(format!(
            "report channel {} cannot be passed to the child",
            channel.fd()
        )));
    }

    let child = spawn(spec, limits, options)?;
    let record = child.wait()?;
    channel.send(&record)?;
    Ok(record)
}
