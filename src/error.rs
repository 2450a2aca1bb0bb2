//! # Error Types
//!
//! Central error type for the muxing engine, covering the taxonomy in
//! the design: input probing, parsing, output I/O, and the PSI-table
//! error case where an unrecognized `table_id` is rejected.
//!
//! ## Example Usage
//!
//! ```rust
//! use m2ts_mux::error::{MuxError, Result};
//!
//! fn check_table_id(id: u8) -> Result<()> {
//!     if id > 0x7f {
//!         return Err(MuxError::UnknownTableId(id));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// Primary error type for the muxing engine.
#[derive(Error, Debug)]
pub enum MuxError {
    /// I/O errors writing to the output sink.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The CLI input file could not be identified as ISO-BMFF or SDP.
    #[error("unsupported input: {0}")]
    InputUnsupported(String),

    /// Malformed SDP or ISO-BMFF input.
    #[error("parse error: {0}")]
    Parse(String),

    /// A PES or section payload failed a structural invariant.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Section Builder was asked to build an unrecognized `table_id`.
    #[error("unknown table_id: 0x{0:02x}")]
    UnknownTableId(u8),

    /// No PES stream had data available and PCR is not yet initialized.
    /// Non-fatal: the scheduler absorbs this into "no data this cycle".
    #[error("stream underrun")]
    StreamUnderrun,

    /// Every stream reported end-of-stream; the muxer loop should exit.
    #[error("end of stream")]
    EndOfStream,
}

/// A specialized `Result` type for muxer operations.
pub type Result<T> = std::result::Result<T, MuxError>;
