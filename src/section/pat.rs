//! Program Association Table payload.

/// One `program_number -> pmt_pid` mapping carried in the PAT body.
#[derive(Debug, Clone, Copy)]
pub struct PatEntry {
    /// Program number, 0 reserved for the network PID convention (unused here).
    pub program_number: u16,
    /// PID of that program's PMT.
    pub pmt_pid: u16,
}

/// Serializes the PAT body (everything between the fixed section header
/// and the CRC): one 4-byte entry per program.
pub fn build_pat_payload(entries: &[PatEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(entries.len() * 4);
    for entry in entries {
        out.extend_from_slice(&entry.program_number.to_be_bytes());
        let pid_field = 0xE000u16 | (entry.pmt_pid & 0x1FFF);
        out.extend_from_slice(&pid_field.to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encodes_one_entry_in_four_bytes() {
        let payload = build_pat_payload(&[PatEntry {
            program_number: 1,
            pmt_pid: 100,
        }]);
        assert_eq!(payload, vec![0x00, 0x01, 0xE0 | 0x00, 0x64]);
    }

    #[test]
    fn encodes_multiple_programs_in_order() {
        let payload = build_pat_payload(&[
            PatEntry {
                program_number: 1,
                pmt_pid: 100,
            },
            PatEntry {
                program_number: 2,
                pmt_pid: 101,
            },
        ]);
        assert_eq!(payload.len(), 8);
        assert_eq!(&payload[0..2], &[0x00, 0x01]);
        assert_eq!(&payload[4..6], &[0x00, 0x02]);
    }
}
