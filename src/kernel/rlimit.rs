//! Resource limit installation
//!
//! Everything here may run between `fork()` and `execvp()` in a
//! multi-threaded parent, so the install path only calls `setrlimit(2)` and
//! never allocates.

use crate::config::types::LimitSet;
use nix::errno::Errno;

/// The three ceilings a launch installs, in installation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitResource {
    CpuTime,
    AddressSpace,
    FileSize,
}

impl LimitResource {
    pub const ALL: [LimitResource; 3] = [Self::CpuTime, Self::AddressSpace, Self::FileSize];

    fn raw(self) -> libc::__rlimit_resource_t {
        match self {
            Self::CpuTime => libc::RLIMIT_CPU,
            Self::AddressSpace => libc::RLIMIT_AS,
            Self::FileSize => libc::RLIMIT_FSIZE,
        }
    }

    /// The value of this resource inside a limit set.
    pub fn value_in(self, limits: &LimitSet) -> u64 {
        match self {
            Self::CpuTime => limits.cpu_time_secs,
            Self::AddressSpace => limits.address_space_bytes,
            Self::FileSize => limits.file_size_bytes,
        }
    }
}

/// Install `value` as both soft and hard limit of the calling process.
pub fn install(resource: LimitResource, value: u64) -> Result<(), Errno> {
    let limit = libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };

    // SAFETY: `limit` is a valid, initialised rlimit for the whole call.
    let rc = unsafe { libc::setrlimit(resource.raw(), &limit) };
    if rc == 0 {
        Ok(())
    } else {
        Err(Errno::last())
    }
}

/// Install every ceiling of `limits` in `LimitResource::ALL` order.
///
/// Each failure is handed to `on_error`, which either continues with the
/// next resource (`Ok`) or aborts the whole installation (`Err`).
pub fn install_all<E>(
    limits: &LimitSet,
    mut on_error: impl FnMut(LimitResource, Errno) -> Result<(), E>,
) -> Result<(), E> {
    for resource in LimitResource::ALL {
        if let Err(errno) = install(resource, resource.value_in(limits)) {
            on_error(resource, errno)?;
        }
    }
    Ok(())
}
