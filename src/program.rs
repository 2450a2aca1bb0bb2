//! # Program
//!
//! One entry in the PAT: a PMT-carrying PSI stream plus the elementary
//! streams it describes, one of which is designated to carry the
//! program's PCR.

use crate::clock::TimeValue;
use crate::error::Result;
use crate::section::pmt::{build_pmt_payload, PmtStreamEntry};
use crate::section::TABLE_ID_PMT;
use crate::stream::Stream;

/// Per-program PCR overhead reserved by the rate controller: the
/// `8*8*10` constant from the design, preserved verbatim.
pub const PCR_OVERHEAD_BITS: u32 = 8 * 8 * 10;

/// One program: its PMT stream, its elementary streams, and the PCR
/// initialization state shared by every stream in the program.
pub struct Program {
    /// Program number as carried in the PAT.
    pub number: u16,
    /// PSI stream carrying this program's PMT.
    pub pmt: Stream,
    /// Index into `streams` of the elementary stream designated to
    /// carry the program clock reference. An arena-style back-reference
    /// rather than a duplicated `Stream`, per the index-based ownership
    /// model (no shared pointers between `Program` and its streams).
    pub pcr_stream_index: usize,
    /// Set once the PCR stream's first access unit has been observed.
    pub pcr_init: bool,
    /// Muxer time at the moment PCR was initialized.
    pub pcr_init_ts_time: TimeValue,
    /// Source DTS (90 kHz) of the PCR-initializing access unit.
    pub pcr_init_time: u64,
    /// Elementary streams belonging to this program, insertion order.
    pub streams: Vec<Stream>,
}

impl Program {
    /// Creates a program with an empty PMT on `pmt_pid`.
    pub fn new(number: u16, pmt_pid: u16, pmt_refresh_rate_ms: u32) -> Self {
        Self {
            number,
            pmt: Stream::new_psi(pmt_pid, pmt_refresh_rate_ms),
            pcr_stream_index: 0,
            pcr_init: false,
            pcr_init_ts_time: TimeValue::ZERO,
            pcr_init_time: 0,
            streams: Vec::new(),
        }
    }

    /// Appends `stream` to this program. The first stream added becomes
    /// the PCR stream unless `designate_pcr` is later called.
    pub fn add_stream(&mut self, stream: Stream) -> usize {
        self.streams.push(stream);
        self.streams.len() - 1
    }

    /// Marks the stream at `index` as this program's PCR source.
    pub fn designate_pcr(&mut self, index: usize) {
        self.pcr_stream_index = index;
    }

    /// The stream designated to carry this program's PCR, if any
    /// streams have been added.
    pub fn pcr_stream(&self) -> Option<&Stream> {
        self.streams.get(self.pcr_stream_index)
    }

    /// Rebuilds this program's PMT section from its current stream list.
    pub fn rebuild_pmt(&mut self) -> Result<()> {
        let pcr_pid = self.pcr_stream().map(|s| s.pid).unwrap_or(0x1FFF);
        let entries: Vec<PmtStreamEntry> = self
            .streams
            .iter()
            .filter_map(|s| {
                s.stats().map(|_| PmtStreamEntry {
                    stream_type: pes_stream_type(s),
                    elementary_pid: s.pid,
                })
            })
            .collect();
        let payload = build_pmt_payload(pcr_pid, &entries);
        self.pmt.update_table(TABLE_ID_PMT, self.number, &payload, true, false)?;
        Ok(())
    }

    /// Initializes the PCR origin from the PCR stream's first access unit.
    pub fn init_pcr(&mut self, muxer_time: TimeValue, source_dts: u64) {
        self.pcr_init = true;
        self.pcr_init_ts_time = muxer_time;
        self.pcr_init_time = source_dts;
    }

    /// Aggregate bit rate this program contributes: its PMT plus every
    /// elementary stream plus the fixed PCR overhead, the latter only
    /// when the program actually has a designated PCR stream.
    pub fn aggregate_bit_rate(&self) -> u32 {
        let streams_total: u32 = self.streams.iter().map(|s| s.bit_rate).sum();
        let pcr_overhead = if self.pcr_stream().is_some() { PCR_OVERHEAD_BITS } else { 0 };
        self.pmt.bit_rate + streams_total + pcr_overhead
    }
}

fn pes_stream_type(stream: &Stream) -> u8 {
    stream.mpeg2_stream_type().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::es::{EsSource, EsStreamInfo};
    use crate::pes::AccessUnit;
    use crate::stream::EsMode;
    use crate::ts::{STREAM_ID_VIDEO, STREAM_TYPE_H264};
    use pretty_assertions::assert_eq;

    struct NullSource;
    impl EsSource for NullSource {
        fn info(&self) -> EsStreamInfo {
            EsStreamInfo {
                kind: crate::es::StreamKind::Visual,
                object_type_indication: 0x21,
                timescale: 90_000,
                bit_rate: 0,
            }
        }
        fn capabilities(&self) -> u32 {
            crate::es::AU_PULL_CAP
        }
        fn pull(&mut self) -> Result<AccessUnit> {
            unreachable!()
        }
    }

    #[test]
    fn aggregate_bit_rate_includes_pcr_overhead() {
        let mut program = Program::new(1, 100, 200);
        let stream = crate::stream::Stream::new_pes(
            110,
            STREAM_TYPE_H264,
            STREAM_ID_VIDEO,
            EsMode::Pull(Box::new(NullSource)),
            1.0,
            1_000_000,
        );
        program.add_stream(stream);
        let total = program.aggregate_bit_rate();
        assert_eq!(total, 1_000_000 + PCR_OVERHEAD_BITS);
    }
}
