//! File descriptor preparation and sealing
//!
//! The parent validates descriptors and snapshots its descriptor table; the
//! child marks everything it must not inherit as close-on-exec. Functions
//! called in the child (`set_cloexec`, `seal_inherited_fds`) only issue
//! `fcntl(2)` / `close_range(2)` and never allocate.

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use std::fs;
use std::os::unix::io::RawFd;

/// close_range(2) syscall number (same on every Linux architecture)
const SYS_CLOSE_RANGE: libc::c_long = 436;
/// Mark the range close-on-exec instead of closing it (Linux 5.11+)
const CLOSE_RANGE_CLOEXEC: libc::c_uint = 1 << 2;

const FIRST_NON_STDIO_FD: RawFd = 3;

/// Access mode (`O_RDONLY`, `O_WRONLY` or `O_RDWR`) of an open descriptor.
pub fn access_mode(fd: RawFd) -> Result<OFlag, Errno> {
    let flags = fcntl(fd, FcntlArg::F_GETFL)?;
    Ok(OFlag::from_bits_truncate(flags) & OFlag::O_ACCMODE)
}

/// Whether writes to `fd` are permitted by its access mode.
pub fn is_writable(fd: RawFd) -> Result<bool, Errno> {
    let mode = access_mode(fd)?;
    Ok(mode == OFlag::O_WRONLY || mode == OFlag::O_RDWR)
}

/// Whether `fd` carries `FD_CLOEXEC`. Fails with `EBADF` when not open.
pub fn is_cloexec(fd: RawFd) -> Result<bool, Errno> {
    let flags = fcntl(fd, FcntlArg::F_GETFD)?;
    Ok(FdFlag::from_bits_truncate(flags).contains(FdFlag::FD_CLOEXEC))
}

pub fn set_cloexec(fd: RawFd, cloexec: bool) -> Result<(), Errno> {
    let flags = if cloexec {
        FdFlag::FD_CLOEXEC
    } else {
        FdFlag::empty()
    };
    fcntl(fd, FcntlArg::F_SETFD(flags)).map(drop)
}

/// Sort, dedup and drop stdio from a keep list.
pub fn normalize_keep_fds(keep: &[RawFd]) -> Vec<RawFd> {
    let mut keep: Vec<RawFd> = keep
        .iter()
        .copied()
        .filter(|fd| *fd >= FIRST_NON_STDIO_FD)
        .collect();
    keep.sort_unstable();
    keep.dedup();
    keep
}

/// Call `f(first, last)` for every inclusive descriptor range above stderr
/// that is not in `keep`. `keep` must be normalized.
pub fn for_each_gap(keep: &[RawFd], mut f: impl FnMut(u32, u32)) {
    let mut next = FIRST_NON_STDIO_FD as u32;
    for &fd in keep {
        let fd = fd as u32;
        if fd > next {
            f(next, fd - 1);
        }
        next = fd + 1;
    }
    f(next, u32::MAX);
}

fn close_range_cloexec(first: u32, last: u32) -> Result<(), Errno> {
    // SAFETY: close_range only manipulates descriptor flags of this process.
    let rc = unsafe {
        libc::syscall(
            SYS_CLOSE_RANGE,
            first as libc::c_uint,
            last as libc::c_uint,
            CLOSE_RANGE_CLOEXEC,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(Errno::last())
    }
}

/// Make every descriptor above stderr close-on-exec except those in `keep`,
/// which get `FD_CLOEXEC` cleared.
///
/// Uses `close_range(CLOSE_RANGE_CLOEXEC)`; on kernels without it, falls back
/// to the `snapshot` of descriptors taken before the fork. `keep` must be
/// normalized.
pub fn seal_inherited_fds(keep: &[RawFd], snapshot: &[RawFd]) -> Result<(), Errno> {
    for &fd in keep {
        set_cloexec(fd, false)?;
    }

    let mut outcome = Ok(());
    for_each_gap(keep, |first, last| {
        if outcome.is_ok() {
            outcome = close_range_cloexec(first, last);
        }
    });

    match outcome {
        Err(Errno::ENOSYS) | Err(Errno::EINVAL) => {
            for &fd in snapshot {
                if fd >= FIRST_NON_STDIO_FD && keep.binary_search(&fd).is_err() {
                    // EBADF: closed since the snapshot was taken
                    let _ = set_cloexec(fd, true);
                }
            }
            Ok(())
        }
        other => other,
    }
}

/// Get list of open file descriptors
pub fn open_fds() -> std::io::Result<Vec<RawFd>> {
    let mut fds: Vec<RawFd> = fs::read_dir("/proc/self/fd")?
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| name.parse::<RawFd>().ok())
        .collect();
    fds.sort_unstable();
    Ok(fds)
}
