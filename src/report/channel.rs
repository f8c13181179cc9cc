use crate::config::types::{RecordFormat, ReportError, Result, SupervisorError};
use crate::kernel::fd;
use crate::report::record::ResultRecord;
use nix::errno::Errno;
use std::io::Read;
use std::os::unix::io::RawFd;

/// Write-only descriptor the supervisor reports through, exactly once.
///
/// The descriptor is borrowed: it was opened by whoever invoked the
/// supervisor and is never closed here.
#[derive(Debug)]
pub struct ReportChannel {
    fd: RawFd,
    format: RecordFormat,
}

impl ReportChannel {
    /// Validate `fd` and mark it close-on-exec so a launched child never
    /// inherits it. Must run before any fork.
    pub fn open(fd: RawFd, format: RecordFormat) -> Result<Self> {
        if (0..=2).contains(&fd) {
            return Err(SupervisorError::Setup(format!(
                "report channel {} is a standard stream",
                fd
            )));
        }

        let writable = fd::is_writable(fd).map_err(|errno| {
            SupervisorError::Setup(format!("report channel {} is not usable: {}", fd, errno))
        })?;
        if !writable {
            return Err(SupervisorError::Setup(format!(
                "report channel {} is not open for writing",
                fd
            )));
        }

        fd::set_cloexec(fd, true).map_err(|errno| {
            SupervisorError::Setup(format!(
                "failed to mark report channel {} close-on-exec: {}",
                fd, errno
            ))
        })?;

        Ok(Self { fd, format })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Deliver `record` with a single `write(2)`. Anything short of the full
    /// encoded length is an error; there is no retry.
    pub fn send(self, record: &ResultRecord) -> Result<()> {
        let bytes = record.encode(self.format);

        // SAFETY: `bytes` is a valid buffer for the duration of the call.
        let written = unsafe {
            libc::write(
                self.fd,
                bytes.as_ptr() as *const libc::c_void,
                bytes.len(),
            )
        };
        if written < 0 {
            return Err(ReportError::Write(Errno::last()).into());
        }
        if written as usize != bytes.len() {
            return Err(ReportError::ShortWrite {
                written: written as usize,
                expected: bytes.len(),
            }
            .into());
        }

        log::debug!("reported {} bytes on fd {}", bytes.len(), self.fd);
        Ok(())
    }
}

/// Read exactly one record from the read end of a report channel.
///
/// End of stream before a full record means the supervisor produced no
/// result; it is never treated as a zeroed record.
pub fn read_record<R: Read>(
    reader: &mut R,
    format: RecordFormat,
) -> std::result::Result<ResultRecord, ReportError> {
    let expected = format.encoded_len();
    let mut buf = vec![0u8; expected];
    let mut read = 0;

    while read < expected {
        match reader.read(&mut buf[read..]) {
            Ok(0) => return Err(ReportError::Incomplete { read, expected }),
            Ok(n) => read += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ReportError::Io(e)),
        }
    }

    ResultRecord::decode(format, &buf)
}
