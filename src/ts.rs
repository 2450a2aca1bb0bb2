//! Transport-packet-level constants and the shared TS header/adaptation
//! field writer used by both the PSI section emitter and the PES
//! packetizer.

use crate::utils::BitWriter;

/// Size of every transport packet, in bytes.
pub const TS_PACKET_SIZE: usize = 188;
/// Size of the fixed 4-byte TS header.
pub const TS_HEADER_SIZE: usize = 4;
/// Sync byte at offset 0 of every transport packet.
pub const SYNC_BYTE: u8 = 0x47;
/// PID reserved for the PAT.
pub const PID_PAT: u16 = 0x0000;
/// PID reserved for NULL (stuffing) packets.
pub const PID_NULL: u16 = 0x1FFF;

/// `stream_type` for H.264/AVC video.
pub const STREAM_TYPE_H264: u8 = 0x1B;
/// `stream_type` for MPEG-2 video.
pub const STREAM_TYPE_MPEG2_VIDEO: u8 = 0x02;
/// `stream_type` for MPEG-1 video.
pub const STREAM_TYPE_MPEG1_VIDEO: u8 = 0x01;
/// `stream_type` for ADTS AAC audio.
pub const STREAM_TYPE_AAC: u8 = 0x0F;
/// `stream_type` for MPEG-1 audio.
pub const STREAM_TYPE_MPEG1_AUDIO: u8 = 0x03;
/// `stream_type` for MPEG-2 audio.
pub const STREAM_TYPE_MPEG2_AUDIO: u8 = 0x04;

/// PES `stream_id` for a video elementary stream.
pub const STREAM_ID_VIDEO: u8 = 0xE0;
/// PES `stream_id` for an audio elementary stream.
pub const STREAM_ID_AUDIO: u8 = 0xC0;

/// Default PMT PID assigned to the first synthetic program.
pub const DEFAULT_PMT_PID: u16 = 100;
/// Default base PID for the first elementary stream of a program.
pub const DEFAULT_ES_PID_BASE: u16 = 110;

/// Adaptation field content for one packet: presence of PCR, a
/// discontinuity/random-access marker, and the number of stuffing
/// bytes (`0xFF`) required to pad the packet out to 188 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptationField {
    /// 33-bit PCR base + 9-bit extension, already combined into 27 MHz ticks.
    pub pcr_27mhz: Option<u64>,
    /// `random_access_indicator`, set on the packet that starts a RAP AU.
    pub random_access: bool,
    /// Stuffing byte count after any fixed fields (discontinuity etc.).
    pub stuffing_len: usize,
}

impl AdaptationField {
    /// Total encoded size in bytes, including the length byte itself.
    pub fn encoded_len(&self) -> usize {
        1 + self.flags_and_body_len()
    }

    fn flags_and_body_len(&self) -> usize {
        1 + if self.pcr_27mhz.is_some() { 6 } else { 0 } + self.stuffing_len
    }

    fn write(&self, w: &mut BitWriter) {
        let body_len = self.flags_and_body_len();
        w.write_u8(body_len as u8);
        w.write_flag(false); // discontinuity_indicator
        w.write_flag(self.random_access); // random_access_indicator
        w.write_flag(false); // elementary_stream_priority_indicator
        w.write_flag(self.pcr_27mhz.is_some()); // PCR_flag
        w.write_flag(false); // OPCR_flag
        w.write_flag(false); // splicing_point_flag
        w.write_flag(false); // transport_private_data_flag
        w.write_flag(false); // adaptation_field_extension_flag
        if let Some(pcr) = self.pcr_27mhz {
            let base = (pcr / 300) & 0x1_FFFF_FFFF;
            let extension = (pcr % 300) as u16;
            w.write_long(base);
            w.write_bits(0x3F, 6); // reserved
            w.write_bits(extension as u32, 9);
        }
        for _ in 0..self.stuffing_len {
            w.write_u8(0xFF);
        }
    }
}

/// Writes the fixed 4-byte TS header plus an optional adaptation field
/// into a fresh 188-byte buffer, returning it with the cursor
/// positioned at the first payload byte (the caller fills the
/// remaining `188 - header_len` bytes).
pub fn begin_packet(
    pid: u16,
    pusi: bool,
    continuity_counter: u8,
    adaptation_field: Option<&AdaptationField>,
) -> Vec<u8> {
    let mut w = BitWriter::with_capacity(TS_PACKET_SIZE);
    w.write_u8(SYNC_BYTE);
    w.write_flag(false); // transport_error_indicator
    w.write_flag(pusi);
    w.write_flag(false); // transport_priority
    w.write_bits(pid as u32, 13);
    w.write_bits(0, 2); // transport_scrambling_control
    let afc = match adaptation_field {
        Some(_) => 0b11u32,
        None => 0b01u32,
    };
    w.write_bits(afc, 2);
    w.write_bits(continuity_counter as u32 & 0x0F, 4);
    if let Some(af) = adaptation_field {
        af.write(&mut w);
    }
    w.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn packet_starts_with_sync_byte_p2() {
        let packet = begin_packet(100, true, 0, None);
        assert_eq!(packet[0], SYNC_BYTE);
    }

    #[test]
    fn adaptation_field_with_pcr_is_eight_bytes() {
        let af = AdaptationField {
            pcr_27mhz: Some(27_000_000),
            random_access: false,
            stuffing_len: 0,
        };
        assert_eq!(af.encoded_len(), 8);
    }

    #[test]
    fn header_without_adaptation_field_is_four_bytes() {
        let packet = begin_packet(0, true, 3, None);
        assert_eq!(packet.len(), 4);
        assert_eq!(packet[3] & 0x0F, 3);
    }
}
