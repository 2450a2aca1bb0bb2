//! # PES Packetizer
//!
//! Wraps [`AccessUnit`]s with PES headers and slices them into exactly
//! 188-byte transport packets, following the adaptation-field sizing
//! algorithm for both the AU-starting packet and its continuations.
//!
//! Timestamps on an [`AccessUnit`] are expected to already be expressed
//! in 90 kHz ticks — the `ts_scale` conversion from a source timescale
//! happens one layer up, in [`crate::stream`], before an access unit is
//! handed to this module.

use bytes::Bytes;

use crate::ts::{self, AdaptationField, TS_PACKET_SIZE};
use crate::utils::BitWriter;

/// A single elementary-stream access unit queued for packetization.
#[derive(Debug, Clone)]
pub struct AccessUnit {
    /// Compressed frame payload.
    pub data: Bytes,
    /// Composition/presentation timestamp, 90 kHz ticks.
    pub cts: u64,
    /// Decoding timestamp, 90 kHz ticks.
    pub dts: u64,
    /// Source-defined flags, passed through uninterpreted.
    pub flags: u8,
    /// True if this AU is a random access point (IDR/keyframe).
    pub is_rap: bool,
    /// True if this is the first byte range of a logical AU (always
    /// true for AUs handed over whole; kept for sources that split AUs
    /// before dispatch).
    pub au_start: bool,
    /// True if this is the last byte range of a logical AU.
    pub au_end: bool,
}

impl AccessUnit {
    /// Length of the access unit payload in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the access unit carries no payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

const PES_HEADER_LEN: usize = 19;

fn write_timestamp(w: &mut BitWriter, prefix: u8, value: u64) {
    debug_assert!(value >> 33 == 0, "timestamp does not fit in 33 bits");
    w.write_bits(prefix as u32, 4);
    w.write_bits(((value >> 30) & 0x7) as u32, 3);
    w.write_flag(true); // marker_bit
    w.write_bits(((value >> 15) & 0x7FFF) as u32, 15);
    w.write_flag(true); // marker_bit
    w.write_bits((value & 0x7FFF) as u32, 15);
    w.write_flag(true); // marker_bit
}

/// Writes the 19-byte PES header (both PTS and DTS present) for an
/// access unit of `au_len` bytes carried under `stream_id`.
fn write_pes_header(stream_id: u8, au_len: usize, pts: u64, dts: u64) -> Vec<u8> {
    let mut w = BitWriter::with_capacity(PES_HEADER_LEN);
    w.write_u8(0x00);
    w.write_u8(0x00);
    w.write_u8(0x01);
    w.write_u8(stream_id);
    let packet_length = (au_len + 13) as u16;
    w.write_u16(packet_length);
    w.write_bits(0b10, 2);
    w.write_bits(0, 2); // PES_scrambling_control
    w.write_flag(false); // PES_priority
    w.write_flag(true); // data_alignment_indicator
    w.write_flag(false); // copyright
    w.write_flag(false); // original_or_copy
    w.write_flag(true); // PTS_flag
    w.write_flag(true); // DTS_flag
    w.write_flag(false); // ESCR_flag
    w.write_flag(false); // ES_rate_flag
    w.write_flag(false); // DSM_trick_mode_flag
    w.write_flag(false); // additional_copy_info_flag
    w.write_flag(false); // PES_CRC_flag
    w.write_flag(false); // PES_extension_flag
    w.write_u8(10); // PES_header_data_length
    write_timestamp(&mut w, 0b0011, pts);
    write_timestamp(&mut w, 0b0001, dts);
    w.into_inner()
}

/// Outcome of building one PES transport packet.
pub struct PesPacket {
    /// The complete 188-byte transport packet.
    pub packet: [u8; TS_PACKET_SIZE],
    /// Number of access-unit payload bytes this packet consumed.
    pub payload_length: usize,
    /// True if this packet started the access unit (carries the PES header).
    pub au_start: bool,
    /// True if a PCR was written into this packet's adaptation field.
    pub carried_pcr: bool,
}

/// Builds one 188-byte TS packet covering the access-unit bytes
/// starting at `pck_offset`, implementing the adaptation-field sizing
/// algorithm (steps 1-8 of the packetizer design).
///
/// `pcr_27mhz`, when `Some`, is written into this packet's adaptation
/// field; the caller is responsible for only supplying it on the
/// packet that starts the AU on the program's designated PCR stream.
pub fn build_pes_packet(
    pid: u16,
    continuity_counter: u8,
    stream_id: u8,
    au: &AccessUnit,
    pck_offset: usize,
    pcr_27mhz: Option<u64>,
) -> PesPacket {
    let remain = au.len() - pck_offset;
    let au_start = pck_offset == 0 && au.au_start;
    let needs_pcr = au_start && pcr_27mhz.is_some();

    let mut payload_length: isize = 184 - if au_start { PES_HEADER_LEN as isize } else { 0 };
    let mut minimal_af_reserved = false;
    if needs_pcr {
        payload_length -= 8;
    } else if remain < 184 {
        payload_length -= 2;
        minimal_af_reserved = true;
    }

    let mut padding_length = 0usize;
    if (remain as isize) < payload_length {
        padding_length = (payload_length as usize).saturating_sub(remain);
        payload_length = remain as isize;
    }
    let payload_length = payload_length.max(0) as usize;

    // Once the -2 (or -8) has been reserved from the payload budget,
    // the adaptation field must be written even with zero stuffing
    // bytes, or the packet falls short of 188 bytes.
    let adaptation_field = if needs_pcr || minimal_af_reserved {
        Some(AdaptationField {
            pcr_27mhz: if needs_pcr { pcr_27mhz } else { None },
            random_access: au_start && au.is_rap,
            stuffing_len: padding_length,
        })
    } else {
        None
    };

    let mut buf = ts::begin_packet(pid, au_start, continuity_counter, adaptation_field.as_ref());
    if au_start {
        buf.extend_from_slice(&write_pes_header(stream_id, au.len(), au.cts, au.dts));
    }
    buf.extend_from_slice(&au.data[pck_offset..pck_offset + payload_length]);
    debug_assert_eq!(buf.len(), TS_PACKET_SIZE, "packet did not land on 188 bytes");

    let mut packet = [0u8; TS_PACKET_SIZE];
    packet.copy_from_slice(&buf);

    PesPacket {
        packet,
        payload_length,
        au_start,
        carried_pcr: needs_pcr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn au_of(len: usize) -> AccessUnit {
        AccessUnit {
            data: Bytes::from(vec![0x11u8; len]),
            cts: 90_000,
            dts: 90_000,
            flags: 0,
            is_rap: true,
            au_start: true,
            au_end: true,
        }
    }

    #[test]
    fn first_packet_carries_pes_header_and_165_bytes_scenario_6() {
        let au = au_of(5000);
        let result = build_pes_packet(110, 0, ts::STREAM_ID_VIDEO, &au, 0, None);
        assert!(result.au_start);
        assert_eq!(result.payload_length, 165);
        assert_eq!(result.packet.len(), 188);
    }

    #[test]
    fn continuation_packets_fill_184_bytes_until_the_tail() {
        let au = au_of(5000);
        let first = build_pes_packet(110, 0, ts::STREAM_ID_VIDEO, &au, 0, None);
        let mut offset = first.payload_length;
        let mut count = 0;
        while offset < au.len() {
            let pkt = build_pes_packet(110, 0, ts::STREAM_ID_VIDEO, &au, offset, None);
            offset += pkt.payload_length;
            count += 1;
        }
        let expected = ((5000 - 165) as f64 / 184.0).ceil() as usize;
        assert_eq!(count, expected);
    }

    #[test]
    fn last_continuation_packet_pads_with_stuffing() {
        let au = au_of(5000);
        let mut offset = 165;
        let mut last_padding = 0;
        while offset < au.len() {
            let pkt = build_pes_packet(110, 0, ts::STREAM_ID_VIDEO, &au, offset, None);
            let remaining_after = au.len() - offset - pkt.payload_length;
            if remaining_after == 0 && pkt.payload_length < 184 {
                last_padding = 184 - pkt.payload_length;
            }
            offset += pkt.payload_length;
        }
        assert!(last_padding > 0);
    }

    #[test]
    fn pcr_stream_first_packet_reserves_eight_bytes() {
        let au = au_of(5000);
        let result = build_pes_packet(110, 0, ts::STREAM_ID_VIDEO, &au, 0, Some(27_000_000));
        assert!(result.carried_pcr);
        assert_eq!(result.payload_length, 157);
    }

    /// Decodes a 5-byte PES timestamp field (PTS or DTS) written by
    /// [`write_timestamp`] back into its 33-bit tick value.
    fn decode_timestamp(bytes: &[u8]) -> u64 {
        let b0 = bytes[0] as u64;
        let b1 = bytes[1] as u64;
        let b2 = bytes[2] as u64;
        let b3 = bytes[3] as u64;
        let b4 = bytes[4] as u64;
        let high = (b0 >> 1) & 0x7;
        let mid = (b1 << 7) | (b2 >> 1);
        let low = (b3 << 7) | (b4 >> 1);
        (high << 30) | (mid << 15) | low
    }

    #[test]
    fn pts_decodes_greater_than_dts_when_cts_exceeds_dts_p4() {
        let pts = 180_000u64;
        let dts = 90_000u64;
        let header = write_pes_header(ts::STREAM_ID_AUDIO, 1000, pts, dts);
        let decoded_pts = decode_timestamp(&header[9..14]);
        let decoded_dts = decode_timestamp(&header[14..19]);
        assert_eq!(decoded_pts, pts);
        assert_eq!(decoded_dts, dts);
        assert!(
            decoded_pts >= decoded_dts,
            "P4: PTS must be >= DTS in every PES header"
        );
    }

    #[test]
    fn small_au_pads_within_the_first_packet() {
        let au = au_of(50);
        let result = build_pes_packet(110, 0, ts::STREAM_ID_VIDEO, &au, 0, None);
        assert_eq!(result.payload_length, 50);
        assert_eq!(result.packet.len(), 188);
    }
}
