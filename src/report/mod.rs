//! Usage reporting
//!
//! The fixed-layout result record, the channel it is written to, and the
//! reader-side decoding of the raw status it carries.

pub mod channel;
pub mod outcome;
pub mod record;

pub use channel::{read_record, ReportChannel};
pub use outcome::{Outcome, Verdict};
pub use record::{ResultRecord, RECORD_SIZE, VERSIONED_SIZE};
