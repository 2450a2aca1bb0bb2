//! # Section Builder
//!
//! Serializes PSI payloads (PAT, PMT, and the MPEG-4 BIFS/OD sections
//! recognized as constructible by this engine) into one or more
//! length-bounded, CRC-terminated sections, and tracks the table
//! version/section-cursor state a PSI-carrying [`Stream`](crate::stream::Stream)
//! needs to emit them.

use crate::error::{MuxError, Result};
use crate::utils::crc32_mpeg2;

/// Program Association Table.
pub const TABLE_ID_PAT: u8 = 0x00;
/// Conditional Access Table — recognized, not constructible by this engine.
pub const TABLE_ID_CAT: u8 = 0x01;
/// Program Map Table.
pub const TABLE_ID_PMT: u8 = 0x02;
/// MPEG-4 BIFS scene description section.
pub const TABLE_ID_BIFS: u8 = 0x04;
/// MPEG-4 Object Descriptor section.
pub const TABLE_ID_OD: u8 = 0x05;
/// Service Description Table.
pub const TABLE_ID_SDT: u8 = 0x42;
/// Bouquet Association Table.
pub const TABLE_ID_BAT: u8 = 0x4A;
/// Network Information Table (actual network) — recognized, not constructible.
pub const TABLE_ID_NIT_ACTUAL: u8 = 0x40;
/// Network Information Table (other network) — recognized, not constructible.
pub const TABLE_ID_NIT_OTHER: u8 = 0x41;
/// Service Description Table, other TS — recognized, not constructible.
pub const TABLE_ID_SDT_OTHER: u8 = 0x46;
/// Time and Date Table — recognized, not constructible.
pub const TABLE_ID_TDT: u8 = 0x70;
/// Running Status Table — recognized, not constructible.
pub const TABLE_ID_RST: u8 = 0x71;
/// Stuffing Table — recognized, not constructible.
pub const TABLE_ID_ST: u8 = 0x72;
/// Time Offset Table — recognized, not constructible.
pub const TABLE_ID_TOT: u8 = 0x73;

const MAX_SECTION_LEN_PSI: usize = 1024;
const MAX_SECTION_LEN_OD_BIFS: usize = 4096;

fn max_section_len(table_id: u8) -> Result<usize> {
    match table_id {
        TABLE_ID_PAT | TABLE_ID_PMT | TABLE_ID_SDT | TABLE_ID_BAT => Ok(MAX_SECTION_LEN_PSI),
        TABLE_ID_BIFS | TABLE_ID_OD => Ok(MAX_SECTION_LEN_OD_BIFS),
        other => Err(MuxError::UnknownTableId(other)),
    }
}

/// One serialized PSI section: header, payload, and (if present) the
/// trailing CRC-32/MPEG-2, already laid out as wire bytes.
#[derive(Debug, Clone)]
pub struct Section {
    data: Vec<u8>,
}

impl Section {
    /// Wire bytes of this section, header through CRC inclusive.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Total length in bytes.
    pub fn length(&self) -> u16 {
        self.data.len() as u16
    }
}

/// Builds the sections for one table update.
///
/// `payload` is the opaque table body (everything after the fixed
/// header fields and before the CRC). Sections are split so that each
/// respects `max_section_len(table_id)`; a payload that does not fit in
/// one section is spread across as many as required, each carrying its
/// own `section_number`/`last_section_number` and its own CRC.
///
/// Returns an empty vector if `payload` is empty, per the
/// `update_table` contract: an empty payload leaves an empty table
/// rather than producing a zero-length section.
#[allow(clippy::too_many_arguments)]
pub fn build_sections(
    table_id: u8,
    table_id_extension: u16,
    version_number: u8,
    payload: &[u8],
    use_syntax_indicator: bool,
    private_indicator: bool,
) -> Result<Vec<Section>> {
    let max_len = max_section_len(table_id)?;
    if payload.is_empty() {
        return Ok(Vec::new());
    }

    let use_crc = use_syntax_indicator;
    let fixed_header_len = if use_syntax_indicator { 5 } else { 0 };
    let trailer_len = if use_crc { 4 } else { 0 };
    // Bytes of `payload` that fit per section, after the per-section
    // fixed fields (table_id_extension/version/section numbers) and
    // before the CRC trailer.
    let payload_budget = max_len
        .saturating_sub(3) // table_id + section_length field
        .saturating_sub(fixed_header_len)
        .saturating_sub(trailer_len);
    assert!(payload_budget > 0, "max_section_len too small for fixed fields");

    let chunks: Vec<&[u8]> = payload.chunks(payload_budget).collect();
    let last_section_number = (chunks.len() - 1) as u8;

    let mut sections = Vec::with_capacity(chunks.len());
    for (section_number, chunk) in chunks.into_iter().enumerate() {
        sections.push(build_one_section(
            table_id,
            table_id_extension,
            version_number,
            section_number as u8,
            last_section_number,
            chunk,
            use_syntax_indicator,
            private_indicator,
            use_crc,
        ));
    }
    Ok(sections)
}

#[allow(clippy::too_many_arguments)]
fn build_one_section(
    table_id: u8,
    table_id_extension: u16,
    version_number: u8,
    section_number: u8,
    last_section_number: u8,
    payload: &[u8],
    use_syntax_indicator: bool,
    private_indicator: bool,
    use_crc: bool,
) -> Section {
    let mut body = Vec::new();
    if use_syntax_indicator {
        body.extend_from_slice(&table_id_extension.to_be_bytes());
        body.push(0b1100_0000 | ((version_number & 0x1F) << 1) | 0x01);
        body.push(section_number);
        body.push(last_section_number);
    }
    body.extend_from_slice(payload);

    let section_length = body.len() + if use_crc { 4 } else { 0 };
    let mut data = Vec::with_capacity(3 + body.len() + 4);
    data.push(table_id);
    let syntax_bit = (use_syntax_indicator as u16) << 15;
    let private_bit = (private_indicator as u16) << 14;
    let reserved = 0b11u16 << 12;
    let length_field = syntax_bit | private_bit | reserved | (section_length as u16 & 0x0FFF);
    data.extend_from_slice(&length_field.to_be_bytes());
    data.extend_from_slice(&body);

    if use_crc {
        let crc = crc32_mpeg2(&data);
        data.extend_from_slice(&crc.to_be_bytes());
    }

    Section { data }
}

/// A PSI table: the sequence of sections produced by its most recent
/// update, plus the version number that increments (mod 32) each time
/// the payload changes.
#[derive(Debug, Clone)]
pub struct Table {
    table_id: u8,
    version_number: u8,
    sections: Vec<Section>,
}

impl Table {
    /// Creates an empty table for `table_id` with version 0.
    pub fn new(table_id: u8) -> Self {
        Self {
            table_id,
            version_number: 0,
            sections: Vec::new(),
        }
    }

    /// The table_id this table carries.
    pub fn table_id(&self) -> u8 {
        self.table_id
    }

    /// Current version number, `0..32`.
    pub fn version_number(&self) -> u8 {
        self.version_number
    }

    /// Sections currently held by this table.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Sum of all section lengths, used by the rate controller.
    pub fn total_section_bytes(&self) -> usize {
        self.sections.iter().map(|s| s.data.len()).sum()
    }

    /// Rebuilds this table's sections from `payload`, discarding the
    /// previous section list and incrementing `version_number` modulo
    /// 32. Returns `Ok(true)` if a PMT update produced more than one
    /// section (a caller-visible warning condition per the contract;
    /// not itself an error).
    pub fn update(
        &mut self,
        table_id_extension: u16,
        payload: &[u8],
        use_syntax_indicator: bool,
        private_indicator: bool,
    ) -> Result<bool> {
        self.version_number = (self.version_number + 1) % 32;
        self.sections = build_sections(
            self.table_id,
            table_id_extension,
            self.version_number,
            payload,
            use_syntax_indicator,
            private_indicator,
        )?;
        let pmt_multi_section = self.table_id == TABLE_ID_PMT && self.sections.len() > 1;
        if pmt_multi_section {
            log::warn!(
                "PMT update produced {} sections; a PMT is expected to fit in one section",
                self.sections.len()
            );
        }
        Ok(pmt_multi_section)
    }
}

/// PAT/PMT payload builders, grounded on the fixed PSI body layouts.
pub mod pat;
/// PMT payload builder.
pub mod pmt;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rejects_unknown_table_id() {
        let err = build_sections(0x40, 0, 0, b"x", true, false).unwrap_err();
        assert!(matches!(err, MuxError::UnknownTableId(0x40)));
    }

    #[test]
    fn empty_payload_produces_no_sections() {
        let sections = build_sections(TABLE_ID_PAT, 1, 0, b"", true, false).unwrap();
        assert!(sections.is_empty());
    }

    #[test]
    fn crc_covers_bytes_up_to_trailer_p6() {
        let sections = build_sections(TABLE_ID_PAT, 1, 0, &[0xE1, 0x00, 0, 1], true, false).unwrap();
        assert_eq!(sections.len(), 1);
        let data = sections[0].data();
        let len = data.len();
        let crc_bytes = &data[len - 4..];
        let expected = crc32_mpeg2(&data[..len - 4]);
        assert_eq!(u32::from_be_bytes(crc_bytes.try_into().unwrap()), expected);
    }

    #[test]
    fn section_length_field_matches_serialized_bytes_p7() {
        let payload = [0xE1u8, 0x00, 0, 1];
        let sections = build_sections(TABLE_ID_PAT, 1, 0, &payload, true, false).unwrap();
        let data = sections[0].data();
        let length_field = u16::from_be_bytes([data[1] & 0x0F, data[2]]) as usize;
        assert_eq!(length_field + 3, data.len());
    }

    #[test]
    fn fragments_payload_larger_than_one_section() {
        let payload = vec![0xAAu8; 2000];
        let sections = build_sections(TABLE_ID_BIFS, 1, 0, &payload, true, false).unwrap();
        assert_eq!(sections.len(), 1); // 2000 fits under the 4096 BIFS/OD cap
        let payload2 = vec![0xBBu8; 2000];
        let sections2 = build_sections(TABLE_ID_PAT, 1, 0, &payload2, true, false).unwrap();
        assert!(sections2.len() > 1);
    }

    #[test]
    fn table_update_warns_on_multi_section_pmt() {
        let mut table = Table::new(TABLE_ID_PMT);
        let payload = vec![0xCCu8; 2000];
        let warned = table.update(1, &payload, true, false).unwrap();
        assert!(warned);
        assert_eq!(table.version_number(), 1);
    }

    #[test]
    fn table_update_increments_version_modulo_32() {
        let mut table = Table::new(TABLE_ID_PAT);
        for expected in 1..=33u8 {
            table.update(1, &[0xE1, 0x00, 0, 1], true, false).unwrap();
            assert_eq!(table.version_number(), expected % 32);
        }
    }
}
