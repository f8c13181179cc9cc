//! Result record and its two wire encodings
//!
//! Native: the `repr(C)` layout of `ResultRecord` in native byte order,
//! padding zeroed, no header. Readers must be built against the same layout.
//!
//! Versioned: `b"LRR"`, version byte, little-endian `u16` payload length,
//! then status (`i32`) and the three `u64` counters, all little-endian.

use crate::config::types::{RecordFormat, ReportError};
use crate::kernel::wait::Termination;
use crate::report::outcome::Outcome;
use serde::{Deserialize, Serialize};
use std::mem::{offset_of, size_of};

/// What the supervisor hands back for one terminated child.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Raw wait status; decode with `outcome()`
    pub status: libc::c_int,
    pub user_time_us: u64,
    pub system_time_us: u64,
    /// Peak resident set size in kilobytes
    pub memory_kb: u64,
}

/// Size of a natively encoded record.
pub const RECORD_SIZE: usize = size_of::<ResultRecord>();

pub const VERSIONED_MAGIC: [u8; 3] = *b"LRR";
pub const VERSIONED_VERSION: u8 = 1;
const VERSIONED_HEADER: usize = 6;
const VERSIONED_PAYLOAD: usize = 4 + 3 * 8;
/// Size of a record in the versioned encoding.
pub const VERSIONED_SIZE: usize = VERSIONED_HEADER + VERSIONED_PAYLOAD;

const STATUS_AT: usize = offset_of!(ResultRecord, status);
const USER_AT: usize = offset_of!(ResultRecord, user_time_us);
const SYSTEM_AT: usize = offset_of!(ResultRecord, system_time_us);
const MEMORY_AT: usize = offset_of!(ResultRecord, memory_kb);

impl RecordFormat {
    pub fn encoded_len(self) -> usize {
        match self {
            Self::Native => RECORD_SIZE,
            Self::Versioned => VERSIONED_SIZE,
        }
    }
}

fn take<const N: usize>(buf: &[u8], at: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[at..at + N]);
    out
}

impl ResultRecord {
    pub fn from_termination(termination: &Termination) -> Self {
        Self {
            status: termination.raw_status,
            user_time_us: termination.user_time_us,
            system_time_us: termination.system_time_us,
            memory_kb: termination.max_rss_kb,
        }
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from_raw(self.status)
    }

    pub fn to_native_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[STATUS_AT..STATUS_AT + 4].copy_from_slice(&self.status.to_ne_bytes());
        buf[USER_AT..USER_AT + 8].copy_from_slice(&self.user_time_us.to_ne_bytes());
        buf[SYSTEM_AT..SYSTEM_AT + 8].copy_from_slice(&self.system_time_us.to_ne_bytes());
        buf[MEMORY_AT..MEMORY_AT + 8].copy_from_slice(&self.memory_kb.to_ne_bytes());
        buf
    }

    pub fn from_native_bytes(buf: &[u8]) -> Result<Self, ReportError> {
        if buf.len() != RECORD_SIZE {
            return Err(ReportError::Incomplete {
                read: buf.len(),
                expected: RECORD_SIZE,
            });
        }
        Ok(Self {
            status: i32::from_ne_bytes(take(buf, STATUS_AT)),
            user_time_us: u64::from_ne_bytes(take(buf, USER_AT)),
            system_time_us: u64::from_ne_bytes(take(buf, SYSTEM_AT)),
            memory_kb: u64::from_ne_bytes(take(buf, MEMORY_AT)),
        })
    }

    pub fn to_versioned_bytes(&self) -> [u8; VERSIONED_SIZE] {
        let mut buf = [0u8; VERSIONED_SIZE];
        buf[..3].copy_from_slice(&VERSIONED_MAGIC);
        buf[3] = VERSIONED_VERSION;
        buf[4..6].copy_from_slice(&(VERSIONED_PAYLOAD as u16).to_le_bytes());
        buf[6..10].copy_from_slice(&self.status.to_le_bytes());
        buf[10..18].copy_from_slice(&self.user_time_us.to_le_bytes());
        buf[18..26].copy_from_slice(&self.system_time_us.to_le_bytes());
        buf[26..34].copy_from_slice(&self.memory_kb.to_le_bytes());
        buf
    }

    pub fn from_versioned_bytes(buf: &[u8]) -> Result<Self, ReportError> {
        if buf.len() < VERSIONED_HEADER {
            return Err(ReportError::Incomplete {
                read: buf.len(),
                expected: VERSIONED_SIZE,
            });
        }

        let magic: [u8; 3] = take(buf, 0);
        if magic != VERSIONED_MAGIC {
            return Err(ReportError::BadMagic(magic));
        }
        if buf[3] != VERSIONED_VERSION {
            return Err(ReportError::UnsupportedVersion(buf[3]));
        }
        let payload = u16::from_le_bytes(take(buf, 4)) as usize;
        if payload != VERSIONED_PAYLOAD {
            return Err(ReportError::LengthMismatch {
                found: payload,
                expected: VERSIONED_PAYLOAD,
            });
        }
        if buf.len() != VERSIONED_SIZE {
            return Err(ReportError::Incomplete {
                read: buf.len(),
                expected: VERSIONED_SIZE,
            });
        }

        Ok(Self {
            status: i32::from_le_bytes(take(buf, 6)),
            user_time_us: u64::from_le_bytes(take(buf, 10)),
            system_time_us: u64::from_le_bytes(take(buf, 18)),
            memory_kb: u64::from_le_bytes(take(buf, 26)),
        })
    }

    pub fn encode(&self, format: RecordFormat) -> Vec<u8> {
        match format {
            RecordFormat::Native => self.to_native_bytes().to_vec(),
            RecordFormat::Versioned => self.to_versioned_bytes().to_vec(),
        }
    }

    pub fn decode(format: RecordFormat, buf: &[u8]) -> Result<Self, ReportError> {
        match format {
            RecordFormat::Native => Self::from_native_bytes(buf),
            RecordFormat::Versioned => Self::from_versioned_bytes(buf),
        }
    }
}

impl std::fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (user {}us, system {}us, peak {}KiB)",
            self.outcome(),
            self.user_time_us,
            self.system_time_us,
            self.memory_kb
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultRecord {
        ResultRecord {
            status: 3 << 8,
            user_time_us: 1_234_567,
            system_time_us: 89_012,
            memory_kb: 4_096,
        }
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn native_layout_matches_c_struct() {
        // int followed by three uint64_t: 4 bytes of padding after status.
        assert_eq!(RECORD_SIZE, 32);
        assert_eq!((STATUS_AT, USER_AT, SYSTEM_AT, MEMORY_AT), (0, 8, 16, 24));
    }

    #[test]
    fn native_bytes_place_fields_at_their_offsets() {
        let bytes = sample().to_native_bytes();
        assert_eq!(&bytes[STATUS_AT..STATUS_AT + 4], &(3i32 << 8).to_ne_bytes());
        assert_eq!(&bytes[USER_AT..USER_AT + 8], &1_234_567u64.to_ne_bytes());
        assert_eq!(&bytes[MEMORY_AT..MEMORY_AT + 8], &4_096u64.to_ne_bytes());
        assert!(bytes[STATUS_AT + 4..USER_AT].iter().all(|b| *b == 0));
        assert_eq!(ResultRecord::from_native_bytes(&bytes).unwrap(), sample());
    }

    #[test]
    fn native_decode_rejects_truncated_buffer() {
        let bytes = sample().to_native_bytes();
        let err = ResultRecord::from_native_bytes(&bytes[..RECORD_SIZE - 1]).unwrap_err();
        assert!(matches!(
            err,
            ReportError::Incomplete { read, expected } if read == RECORD_SIZE - 1 && expected == RECORD_SIZE
        ));
    }

    #[test]
    fn versioned_header_is_self_describing() {
        let bytes = sample().to_versioned_bytes();
        assert_eq!(&bytes[..3], b"LRR");
        assert_eq!(bytes[3], 1);
        assert_eq!(u16::from_le_bytes([bytes[4], bytes[5]]), 28);
        assert_eq!(bytes.len(), 34);
        assert_eq!(ResultRecord::from_versioned_bytes(&bytes).unwrap(), sample());
    }

    #[test]
    fn versioned_decode_rejects_foreign_data() {
        let mut bytes = sample().to_versioned_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            ResultRecord::from_versioned_bytes(&bytes),
            Err(ReportError::BadMagic(_))
        ));

        let mut bytes = sample().to_versioned_bytes();
        bytes[3] = 2;
        assert!(matches!(
            ResultRecord::from_versioned_bytes(&bytes),
            Err(ReportError::UnsupportedVersion(2))
        ));

        let mut bytes = sample().to_versioned_bytes();
        bytes[4] = 30;
        assert!(matches!(
            ResultRecord::from_versioned_bytes(&bytes),
            Err(ReportError::LengthMismatch { found: 30, .. })
        ));
    }

    #[test]
    fn encoded_len_matches_encoding() {
        for format in [RecordFormat::Native, RecordFormat::Versioned] {
            assert_eq!(sample().encode(format).len(), format.encoded_len());
        }
    }

    #[test]
    fn display_includes_outcome_and_usage() {
        let text = sample().to_string();
        assert!(text.contains("exited with code 3"), "{}", text);
        assert!(text.contains("user 1234567us"), "{}", text);
    }
}
