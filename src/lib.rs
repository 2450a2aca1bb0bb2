#![doc(html_root_url = "https://docs.rs/m2ts-mux/0.1.0")]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # m2ts-mux
//!
//! A constant-bit-rate MPEG-2 Transport Stream multiplexer: PAT/PMT
//! section building, PES packetization, PCR insertion, and a
//! least-virtual-time scheduler across PSI and elementary streams,
//! driven by any source implementing the [`es::EsSource`] contract.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use m2ts_mux::es::EsSource;
//! use m2ts_mux::mux::Muxer;
//! use m2ts_mux::stream::EsMode;
//! use m2ts_mux::ts::{STREAM_ID_VIDEO, STREAM_TYPE_H264};
//! use std::fs::File;
//!
//! # fn make_source() -> Box<dyn EsSource> { unimplemented!() }
//! # fn main() -> m2ts_mux::error::Result<()> {
//! let output = File::create("out.ts")?;
//! let mut muxer = Muxer::new(output, 1, Some(1_500_000));
//! let program = muxer.add_program(1, 100)?;
//! muxer.add_stream(
//!     program,
//!     110,
//!     STREAM_TYPE_H264,
//!     STREAM_ID_VIDEO,
//!     EsMode::Pull(make_source()),
//!     1.0,
//!     0,
//!     true,
//! )?;
//! muxer.run()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module overview
//!
//! - [`clock`]: the 64-bit virtual time value shared by the muxer and
//!   every stream.
//! - [`config`]: process-wide tunables (refresh intervals, default
//!   PID assignments), overridable by environment variables.
//! - [`error`]: the crate-wide error taxonomy and `Result` alias.
//! - [`utils`]: the MSB-first bitstream writer and CRC-32/MPEG-2 table.
//! - [`ts`]: transport-packet constants and the shared TS
//!   header/adaptation-field writer.
//! - [`section`]: the Section Builder — PAT/PMT/OD/BIFS serialization
//!   with CRC and length-bounded fragmentation.
//! - [`pes`]: the PES Packetizer — access units to 188-byte packets.
//! - [`es`]: the Elementary Stream Interface contract (pull and push).
//! - [`stream`]: a single PID's PSI or PES carrier state.
//! - [`program`]: one PAT entry: a PMT plus its elementary streams.
//! - [`mux`]: the top-level [`mux::Muxer`], Scheduler, and Rate
//!   Controller.

/// 64-bit virtual time value shared by the muxer and every stream.
pub mod clock;

/// Process-wide tunables, overridable by environment variables.
pub mod config;

/// Error types and the crate-wide `Result` alias.
pub mod error;

/// Elementary Stream Interface contract (pull and push sources).
pub mod es;

/// The top-level Muxer, Scheduler, and Rate Controller.
pub mod mux;

/// PES access-unit packetization.
pub mod pes;

/// One PAT entry: a PMT plus its elementary streams.
pub mod program;

/// PSI section building: PAT/PMT/OD/BIFS with CRC and fragmentation.
pub mod section;

/// A single PID's PSI or PES carrier state.
pub mod stream;

/// Transport-packet constants and the shared TS header writer.
pub mod ts;

/// Bitstream writer and CRC-32/MPEG-2 checksum.
pub mod utils;

pub use error::{MuxError, Result};
pub use mux::Muxer;
