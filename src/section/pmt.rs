//! Program Map Table payload.

/// One elementary stream entry in a PMT body.
#[derive(Debug, Clone, Copy)]
pub struct PmtStreamEntry {
    /// MPEG-2 `stream_type` byte (e.g. `0x1B` for H.264).
    pub stream_type: u8,
    /// PID carrying this elementary stream.
    pub elementary_pid: u16,
}

/// Serializes the PMT body: PCR PID, an empty program-info loop, and
/// one 5-byte entry per elementary stream (no per-stream descriptors).
pub fn build_pmt_payload(pcr_pid: u16, streams: &[PmtStreamEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + streams.len() * 5);
    let pcr_field = 0xE000u16 | (pcr_pid & 0x1FFF);
    out.extend_from_slice(&pcr_field.to_be_bytes());
    // program_info_length = 0: reserved(4)=0xF, length(12)=0.
    out.extend_from_slice(&[0xF0, 0x00]);
    for stream in streams {
        out.push(stream.stream_type);
        let pid_field = 0xE000u16 | (stream.elementary_pid & 0x1FFF);
        out.extend_from_slice(&pid_field.to_be_bytes());
        // ES_info_length = 0: reserved(4)=0xF, length(12)=0.
        out.extend_from_slice(&[0xF0, 0x00]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encodes_pcr_pid_and_empty_program_info() {
        let payload = build_pmt_payload(110, &[]);
        assert_eq!(payload[0..2], [0xE0, 0x6E]);
        assert_eq!(payload[2..4], [0xF0, 0x00]);
    }

    #[test]
    fn encodes_one_h264_stream_entry() {
        let payload = build_pmt_payload(
            110,
            &[PmtStreamEntry {
                stream_type: 0x1B,
                elementary_pid: 110,
            }],
        );
        assert_eq!(payload.len(), 9);
        assert_eq!(payload[4], 0x1B);
        assert_eq!(&payload[5..7], &[0xE0, 0x6E]);
        assert_eq!(&payload[7..9], &[0xF0, 0x00]);
    }

    #[test]
    fn five_elementary_streams_fit_well_under_the_pmt_section_cap() {
        // Scenario 4: PMT with 5 ES entries must serialize in one
        // section with section_length < 1021.
        let streams: Vec<PmtStreamEntry> = (0..5)
            .map(|i| PmtStreamEntry {
                stream_type: 0x1B,
                elementary_pid: 110 + i,
            })
            .collect();
        let payload = build_pmt_payload(110, &streams);
        assert_eq!(payload.len(), 4 + 5 * 5);
        assert!(payload.len() + 5 + 4 < 1021);
    }
}
