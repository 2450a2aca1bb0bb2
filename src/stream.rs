//! # Stream
//!
//! A single transport-stream elementary or PSI carrier: one PID, one
//! continuity counter, one virtual clock. PSI and PES streams share
//! the [`Stream`] shell but carry disjoint state in [`StreamData`].

use std::sync::Arc;

use crate::clock::TimeValue;
use crate::error::{MuxError, Result};
use crate::es::{EsSource, PushQueue};
use crate::pes::{self, AccessUnit};
use crate::section::Table;
use crate::ts::TS_PACKET_SIZE;

/// Where a PES stream's access units come from.
pub enum EsMode {
    /// Synchronous source, polled with `DATA_PULL`.
    Pull(Box<dyn EsSource>),
    /// Asynchronous source; access units arrive via [`PushQueue::dispatch`]
    /// from a producer thread and are drained here.
    Push(Arc<PushQueue>),
}

/// Accumulates byte counts against elapsed DTS until one second (90,000
/// ticks) has passed, at which point a stream's `bit_rate` is measured.
#[derive(Debug, Default, Clone, Copy)]
pub struct RateMeasurement {
    start_dts: Option<u64>,
    bytes_accum: u64,
}

impl RateMeasurement {
    /// Folds one access unit into the running measurement. Returns the
    /// measured bit rate once a full second of DTS has elapsed.
    pub fn record(&mut self, dts: u64, len: usize) -> Option<u32> {
        let start = *self.start_dts.get_or_insert(dts);
        self.bytes_accum += len as u64;
        let delta = dts.saturating_sub(start);
        if delta >= 90_000 {
            let bit_rate = (8 * self.bytes_accum * 90_000 / delta) as u32;
            self.start_dts = Some(dts);
            self.bytes_accum = 0;
            Some(bit_rate)
        } else {
            None
        }
    }
}

/// State specific to a PSI-carrying stream (PAT, PMT, ...).
pub struct PsiData {
    /// Tables multiplexed on this PID, in insertion order.
    pub tables: Vec<Table>,
    current_table: usize,
    current_section: usize,
    current_section_offset: usize,
}

impl PsiData {
    fn new() -> Self {
        Self {
            tables: Vec::new(),
            current_table: 0,
            current_section: 0,
            current_section_offset: 0,
        }
    }

    fn reset_cursor(&mut self) {
        self.current_table = 0;
        self.current_section = 0;
        self.current_section_offset = 0;
    }

    /// Sum of every table's section bytes, for the rate controller.
    pub fn total_section_bytes(&self) -> usize {
        self.tables.iter().map(|t| t.total_section_bytes()).sum()
    }

    fn has_data(&self) -> bool {
        self.tables.iter().any(|t| !t.sections().is_empty())
    }
}

/// State specific to a PES-carrying elementary stream.
pub struct PesData {
    /// MPEG-2 `stream_type` carried in the PMT for this stream.
    pub mpeg2_stream_type: u8,
    /// PES `stream_id` (e.g. `0xE0` video, `0xC0` audio).
    pub mpeg2_stream_id: u8,
    /// Access-unit source.
    pub source: EsMode,
    /// Conversion factor from the source timescale to 90 kHz.
    pub ts_scale: f64,
    pck: Option<AccessUnit>,
    pck_offset: usize,
    measure: RateMeasurement,
    stream_is_over: bool,
    sample_number: u64,
    nb_bytes_written: u64,
}

impl PesData {
    fn new(mpeg2_stream_type: u8, mpeg2_stream_id: u8, source: EsMode, ts_scale: f64) -> Self {
        Self {
            mpeg2_stream_type,
            mpeg2_stream_id,
            source,
            ts_scale,
            pck: None,
            pck_offset: 0,
            measure: RateMeasurement::default(),
            stream_is_over: false,
            sample_number: 0,
            nb_bytes_written: 0,
        }
    }

    /// True once the source has signaled end-of-stream and no access
    /// unit remains buffered.
    pub fn is_terminal(&self) -> bool {
        self.stream_is_over && self.pck.is_none()
    }

    fn scale_au(&self, mut au: AccessUnit) -> AccessUnit {
        if (self.ts_scale - 1.0).abs() > f64::EPSILON {
            au.cts = (au.cts as f64 * self.ts_scale) as u64;
            au.dts = (au.dts as f64 * self.ts_scale) as u64;
        }
        au
    }
}

/// Tagged union of PSI-specific and PES-specific stream state.
pub enum StreamData {
    /// PSI carrier (PAT or a program's PMT).
    Psi(PsiData),
    /// Elementary stream carrier.
    Pes(PesData),
}

/// One transport-stream elementary or PSI carrier.
pub struct Stream {
    /// 13-bit PID, unique within the muxer.
    pub pid: u16,
    continuity_counter: u8,
    /// This stream's own virtual clock.
    pub time: TimeValue,
    /// Measured or derived bits-per-second.
    pub bit_rate: u32,
    /// How often a PSI table repeats, or informational for PES streams.
    pub refresh_rate_ms: u32,
    /// PSI or PES specific state.
    pub data: StreamData,
}

impl Stream {
    /// Creates a PSI-carrying stream (PAT or PMT) on `pid`.
    pub fn new_psi(pid: u16, refresh_rate_ms: u32) -> Self {
        Self {
            pid,
            continuity_counter: 0,
            time: TimeValue::ZERO,
            bit_rate: 0,
            refresh_rate_ms,
            data: StreamData::Psi(PsiData::new()),
        }
    }

    /// Creates a PES-carrying elementary stream on `pid`.
    pub fn new_pes(
        pid: u16,
        mpeg2_stream_type: u8,
        mpeg2_stream_id: u8,
        source: EsMode,
        ts_scale: f64,
        initial_bit_rate: u32,
    ) -> Self {
        Self {
            pid,
            continuity_counter: 0,
            time: TimeValue::ZERO,
            bit_rate: initial_bit_rate,
            refresh_rate_ms: 0,
            data: StreamData::Pes(PesData::new(mpeg2_stream_type, mpeg2_stream_id, source, ts_scale)),
        }
    }

    fn psi_mut(&mut self) -> Result<&mut PsiData> {
        match &mut self.data {
            StreamData::Psi(p) => Ok(p),
            StreamData::Pes(_) => Err(MuxError::InvalidData("stream is not a PSI carrier".into())),
        }
    }

    fn pes_mut(&mut self) -> Result<&mut PesData> {
        match &mut self.data {
            StreamData::Pes(p) => Ok(p),
            StreamData::Psi(_) => Err(MuxError::InvalidData("stream is not a PES carrier".into())),
        }
    }

    /// `update_table`: rebuilds (or creates) the table identified by
    /// `table_id`, resets the section cursor to the first section of
    /// the first table, and recomputes this PSI stream's bit rate.
    /// Returns `true` if the update produced a multi-section PMT.
    pub fn update_table(
        &mut self,
        table_id: u8,
        table_id_extension: u16,
        payload: &[u8],
        use_syntax_indicator: bool,
        private_indicator: bool,
    ) -> Result<bool> {
        let refresh_rate_ms = self.refresh_rate_ms;
        let psi = self.psi_mut()?;
        let warned = if let Some(table) = psi.tables.iter_mut().find(|t| t.table_id() == table_id) {
            table.update(table_id_extension, payload, use_syntax_indicator, private_indicator)?
        } else {
            let mut table = Table::new(table_id);
            let warned = table.update(table_id_extension, payload, use_syntax_indicator, private_indicator)?;
            psi.tables.push(table);
            warned
        };
        psi.reset_cursor();
        let total_bytes = psi.total_section_bytes();
        self.bit_rate = (total_bytes as u64 * 8 * 1000 / refresh_rate_ms.max(1) as u64) as u32;
        Ok(warned)
    }

    /// True if this PSI stream has at least one non-empty table and so
    /// is eligible for scheduling.
    pub fn psi_has_data(&self) -> bool {
        matches!(&self.data, StreamData::Psi(p) if p.has_data())
    }

    /// Builds the next 188-byte packet from this PSI stream's section
    /// cursor, advancing the cursor and, on wraparound to the first
    /// table, this stream's virtual clock by `refresh_rate_ms`.
    pub fn emit_psi_packet(&mut self) -> Result<[u8; TS_PACKET_SIZE]> {
        let refresh_rate_ms = self.refresh_rate_ms;
        let cc = self.continuity_counter;
        let pid = self.pid;

        // Borrows only `self.data` (a direct field match, not a method
        // call through `&mut self`), so `self.continuity_counter` and
        // `self.time` remain mutable below once this borrow ends.
        let psi = match &mut self.data {
            StreamData::Psi(p) => p,
            StreamData::Pes(_) => {
                return Err(MuxError::InvalidData("stream is not a PSI carrier".into()))
            }
        };
        if psi.tables.is_empty() {
            return Err(MuxError::InvalidData("PSI stream has no tables to emit".into()));
        }

        let (packet, wrapped_to_start) = {
            let table = &psi.tables[psi.current_table];
            let section = &table.sections()[psi.current_section];
            let pusi = psi.current_section_offset == 0;
            let budget = if pusi { 183 } else { 184 };
            let remain = section.data().len() - psi.current_section_offset;
            let to_copy = remain.min(budget);

            let mut buf = crate::ts::begin_packet(pid, pusi, cc, None);
            if pusi {
                buf.push(0x00); // pointer_field
            }
            buf.extend_from_slice(
                &section.data()[psi.current_section_offset..psi.current_section_offset + to_copy],
            );
            buf.resize(TS_PACKET_SIZE, 0xFF);

            psi.current_section_offset += to_copy;
            if psi.current_section_offset >= section.data().len() {
                psi.current_section_offset = 0;
                psi.current_section += 1;
                let section_count = table.sections().len();
                if psi.current_section >= section_count {
                    psi.current_section = 0;
                    let table_count = psi.tables.len();
                    psi.current_table = (psi.current_table + 1) % table_count;
                }
            }
            let wrapped_to_start =
                psi.current_table == 0 && psi.current_section == 0 && psi.current_section_offset == 0;
            (buf, wrapped_to_start)
        };

        self.continuity_counter = (self.continuity_counter + 1) % 16;
        if wrapped_to_start {
            self.time.advance(refresh_rate_ms as u64, 1000);
        }

        let mut out = [0u8; TS_PACKET_SIZE];
        out.copy_from_slice(&packet);
        Ok(out)
    }

    /// Ensures an access unit is buffered, pulling or popping one if
    /// none is held. Returns `Ok(true)` once an AU is ready, `Ok(false)`
    /// if none is available this cycle (non-fatal underrun), or
    /// `Err(MuxError::EndOfStream)` once the source is exhausted.
    pub fn fetch_next_au(&mut self) -> Result<bool> {
        let pes = self.pes_mut()?;
        if pes.pck.is_some() {
            return Ok(true);
        }
        let au = match &mut pes.source {
            EsMode::Pull(source) => match source.pull() {
                Ok(au) => Some(au),
                Err(MuxError::EndOfStream) => {
                    pes.stream_is_over = true;
                    None
                }
                Err(other) => return Err(other),
            },
            EsMode::Push(queue) => match queue.pop() {
                Some(au) => Some(au),
                None => {
                    if queue.is_over() {
                        pes.stream_is_over = true;
                    }
                    None
                }
            },
        };
        match au {
            Some(au) => {
                let scaled = pes.scale_au(au);
                pes.pck = Some(scaled);
                pes.pck_offset = 0;
                Ok(true)
            }
            None => {
                if pes.is_terminal() {
                    Err(MuxError::EndOfStream)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// True once this PES stream's source is exhausted and no access
    /// unit remains buffered.
    pub fn is_terminal(&self) -> bool {
        matches!(&self.data, StreamData::Pes(p) if p.is_terminal())
    }

    /// DTS (already 90 kHz-scaled) of the currently buffered access
    /// unit, used by the caller to seed `stream.time` relative to the
    /// program's PCR origin.
    pub fn pending_dts(&self) -> Option<u64> {
        match &self.data {
            StreamData::Pes(p) => p.pck.as_ref().map(|au| au.dts),
            StreamData::Psi(_) => None,
        }
    }

    /// True if the buffered access unit is a random access point and
    /// this is its first byte range.
    pub fn pending_is_rap_start(&self) -> bool {
        match &self.data {
            StreamData::Pes(p) => p
                .pck
                .as_ref()
                .map(|au| au.au_start && au.is_rap)
                .unwrap_or(false),
            StreamData::Psi(_) => false,
        }
    }

    /// Builds the next 188-byte packet from the buffered access unit,
    /// advancing the packetizer offset, continuity counter, rate
    /// measurement, and this stream's virtual clock. `pcr_27mhz` is
    /// `Some` only when the caller has determined this packet both
    /// starts the AU and belongs to the program's PCR-designated stream.
    pub fn emit_pes_packet(&mut self, pcr_27mhz: Option<u64>) -> Result<[u8; TS_PACKET_SIZE]> {
        let pid = self.pid;
        let cc = self.continuity_counter;
        let bit_rate = self.bit_rate;

        // As in `emit_psi_packet`: every `self.*` mutation below is
        // deferred until after this borrow's last use, so it doesn't
        // matter that `pes` is derived from a borrow of the whole `self`.
        let pes = match &mut self.data {
            StreamData::Pes(p) => p,
            StreamData::Psi(_) => {
                return Err(MuxError::InvalidData("stream is not a PES carrier".into()))
            }
        };
        let au = pes
            .pck
            .as_ref()
            .ok_or_else(|| MuxError::InvalidData("emit_pes_packet called with no buffered AU".into()))?
            .clone();

        let result = pes::build_pes_packet(pid, cc, pes.mpeg2_stream_id, &au, pes.pck_offset, pcr_27mhz);

        let mut measured_bit_rate = None;
        if result.au_start {
            pes.sample_number += 1;
            if pes.sample_number == 1 || bit_rate == 0 {
                measured_bit_rate = pes.measure.record(au.dts, au.len());
            }
        }
        pes.nb_bytes_written += result.payload_length as u64;
        pes.pck_offset += result.payload_length;
        if pes.pck_offset >= au.len() {
            pes.pck = None;
            pes.pck_offset = 0;
        }

        self.continuity_counter = (self.continuity_counter + 1) % 16;
        if let Some(measured) = measured_bit_rate {
            self.bit_rate = measured;
        }
        if bit_rate > 0 {
            self.time.advance(result.payload_length as u64 * 8, bit_rate as u64);
        }
        Ok(result.packet)
    }

    /// `(sample_number, nb_bytes_written)` diagnostic counters, carried
    /// over from the original implementation's logging state.
    pub fn stats(&self) -> Option<(u64, u64)> {
        match &self.data {
            StreamData::Pes(p) => Some((p.sample_number, p.nb_bytes_written)),
            StreamData::Psi(_) => None,
        }
    }

    /// The MPEG-2 `stream_type` this PES stream carries in the PMT, if
    /// this is a PES stream.
    pub fn mpeg2_stream_type(&self) -> Option<u8> {
        match &self.data {
            StreamData::Pes(p) => Some(p.mpeg2_stream_type),
            StreamData::Psi(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::pat::{build_pat_payload, PatEntry};
    use pretty_assertions::assert_eq;

    #[test]
    fn update_table_resets_cursor_and_computes_bit_rate() {
        let mut stream = Stream::new_psi(0, 200);
        let payload = build_pat_payload(&[PatEntry {
            program_number: 1,
            pmt_pid: 100,
        }]);
        stream.update_table(crate::section::TABLE_ID_PAT, 1, &payload, true, false).unwrap();
        assert!(stream.bit_rate > 0);
        assert!(stream.psi_has_data());
    }

    #[test]
    fn psi_packet_sets_pusi_on_section_start() {
        let mut stream = Stream::new_psi(0, 200);
        let payload = build_pat_payload(&[PatEntry {
            program_number: 1,
            pmt_pid: 100,
        }]);
        stream.update_table(crate::section::TABLE_ID_PAT, 1, &payload, true, false).unwrap();
        let packet = stream.emit_psi_packet().unwrap();
        assert_eq!(packet[0], 0x47);
        assert_ne!(packet[1] & 0x40, 0); // PUSI bit set
        assert_eq!(packet[4], 0x00); // pointer_field
    }

    #[test]
    fn psi_clock_advances_after_full_cycle() {
        let mut stream = Stream::new_psi(0, 200);
        let payload = build_pat_payload(&[PatEntry {
            program_number: 1,
            pmt_pid: 100,
        }]);
        stream.update_table(crate::section::TABLE_ID_PAT, 1, &payload, true, false).unwrap();
        let before = stream.time;
        stream.emit_psi_packet().unwrap();
        assert!(stream.time > before);
    }

    struct TwoFrameAacSource {
        dts_44100: std::vec::IntoIter<u64>,
    }

    impl EsSource for TwoFrameAacSource {
        fn info(&self) -> crate::es::EsStreamInfo {
            crate::es::EsStreamInfo {
                kind: crate::es::StreamKind::Audio,
                object_type_indication: 0x40,
                timescale: 44_100,
                bit_rate: 0,
            }
        }

        fn capabilities(&self) -> u32 {
            crate::es::AU_PULL_CAP
        }

        fn pull(&mut self) -> Result<crate::pes::AccessUnit> {
            let dts = self.dts_44100.next().ok_or(MuxError::EndOfStream)?;
            Ok(crate::pes::AccessUnit {
                data: bytes::Bytes::from_static(&[0u8; 8]),
                cts: dts,
                dts,
                flags: 0,
                is_rap: dts == 0,
                au_start: true,
                au_end: true,
            })
        }
    }

    /// Scenario 2 (AAC): a 1024-sample frame at 44.1 kHz lands at
    /// ~2089 ticks at 90 kHz, the same increment the clock-only test
    /// for `TimeValue::from_90khz_ticks` checks in isolation — here
    /// exercised through `EsStreamInfo::ts_scale`/`PesData::scale_au`
    /// end to end so the packetizer sees the scaled PTS, not just the
    /// raw conversion factor.
    #[test]
    fn fetch_next_au_scales_aac_pts_increment_to_90khz_scenario_2() {
        let source = TwoFrameAacSource {
            dts_44100: vec![0u64, 1024u64].into_iter(),
        };
        let info = source.info();
        let ts_scale = info.ts_scale();
        let mut stream = Stream::new_pes(
            120,
            crate::ts::STREAM_TYPE_AAC,
            crate::ts::STREAM_ID_AUDIO,
            EsMode::Pull(Box::new(source)),
            ts_scale,
            0,
        );

        assert!(stream.fetch_next_au().unwrap());
        let first_dts = stream.pending_dts().unwrap();
        assert_eq!(first_dts, 0);
        stream.emit_pes_packet(None).unwrap();

        assert!(stream.fetch_next_au().unwrap());
        let second_dts = stream.pending_dts().unwrap();

        assert_eq!(
            second_dts - first_dts,
            2089,
            "a 1024-sample AAC frame at 44.1kHz should scale to a 2089-tick PTS increment at 90kHz"
        );
    }
}
