//! EMG-Core: Foundation types for the EMG posture hub
//!
//! Frame and record types, the device line parser, and the shared error type.

pub mod emg_types;
pub mod error;
pub mod parser;
pub mod records;

pub use emg_types::*;
pub use error::{EmgError, EmgResult};
pub use parser::{parse_line, split_lines, STATS_TOKEN};
pub use records::*;
