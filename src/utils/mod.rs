//! Bit-level and checksum helpers shared by the section builder, PES
//! packetizer, and transport-packet writer.

/// MSB-first bitstream writer.
pub mod bitwriter;

/// CRC32/MPEG-2 table and checksum function.
pub mod crc;

pub use bitwriter::BitWriter;
pub use crc::{crc32_mpeg2, CRC32_MPEG2_TABLE};
