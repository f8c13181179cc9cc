//! Blocking wait for one child with resource accounting

use nix::errno::Errno;
use nix::unistd::Pid;

/// Raw wait status and resource usage of a terminated child.
#[derive(Clone, Copy, Debug)]
pub struct Termination {
    /// Status exactly as filled in by `wait4(2)`
    pub raw_status: libc::c_int,
    pub user_time_us: u64,
    pub system_time_us: u64,
    /// `ru_maxrss`, kilobytes on Linux
    pub max_rss_kb: u64,
}

fn timeval_to_us(tv: libc::timeval) -> u64 {
    (tv.tv_sec as u64)
        .saturating_mul(1_000_000)
        .saturating_add(tv.tv_usec as u64)
}

/// Block until `pid` terminates.
///
/// Without `WUNTRACED` a stopped child does not end the wait, so the result
/// always describes a real exit or a fatal signal. Interrupted waits restart.
pub fn wait_for_termination(pid: Pid) -> Result<Termination, Errno> {
    let mut status: libc::c_int = 0;
    // SAFETY: rusage is plain old data; all-zero is a valid value.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };

    loop {
        // SAFETY: both out-pointers are valid for the duration of the call.
        let rc = unsafe { libc::wait4(pid.as_raw(), &mut status, 0, &mut usage) };
        if rc >= 0 {
            break;
        }
        match Errno::last() {
            Errno::EINTR => continue,
            errno => return Err(errno),
        }
    }

    Ok(Termination {
        raw_status: status,
        user_time_us: timeval_to_us(usage.ru_utime),
        system_time_us: timeval_to_us(usage.ru_stime),
        max_rss_kb: usage.ru_maxrss.max(0) as u64,
    })
}
