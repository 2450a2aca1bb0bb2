//! # Muxer
//!
//! Owns the PAT, every [`Program`], and the output sink. Combines the
//! Scheduler (§4.4) and Rate Controller (§4.5): each call to
//! [`Muxer::process`] performs one emission cycle and writes exactly
//! one 188-byte packet.

use std::io::Write;

use crate::clock::TimeValue;
use crate::config;
use crate::error::{MuxError, Result};
use crate::program::Program;
use crate::section::pat::{build_pat_payload, PatEntry};
use crate::section::TABLE_ID_PAT;
use crate::stream::{EsMode, Stream};
use crate::ts::{self, PID_NULL, PID_PAT, TS_PACKET_SIZE};

enum Candidate {
    Pat,
    Pmt(usize),
    Pes(usize, usize),
}

/// The top-level muxer: PAT, programs, and the rate/scheduling state
/// driving one output transport stream.
pub struct Muxer<W: Write> {
    /// Configured or derived aggregate bits per second.
    pub bit_rate: u32,
    /// If true, `bit_rate` is authoritative and never recomputed.
    pub fixed_rate: bool,
    /// If true, wall-clock pacing is applied between emissions (not
    /// implemented by this synchronous core; left for a real-time
    /// driver built on top of [`Muxer::process`]).
    pub real_time: bool,
    /// The muxer's own virtual emission clock.
    pub time: TimeValue,
    /// Transport stream identifier carried in the PAT.
    pub ts_id: u16,
    /// The PSI stream carrying the PAT on PID 0.
    pub pat: Stream,
    /// Programs in insertion order.
    pub programs: Vec<Program>,
    /// True once a stream has measured its bit rate and the aggregate
    /// rate needs recomputation before the next emission.
    pub needs_reconfig: bool,
    null_packet: [u8; TS_PACKET_SIZE],
    output: W,
}

impl<W: Write> Muxer<W> {
    /// Creates a muxer writing to `output`. `fixed_bit_rate`, if given,
    /// locks the aggregate rate and enables NULL-packet stuffing to
    /// fill unused bandwidth.
    pub fn new(output: W, ts_id: u16, fixed_bit_rate: Option<u32>) -> Self {
        let mut null_packet = [0xFFu8; TS_PACKET_SIZE];
        let header = ts::begin_packet(PID_NULL, false, 0, None);
        null_packet[..header.len()].copy_from_slice(&header);

        let refresh = config::defaults().pat_pmt_refresh_rate_ms;
        Self {
            bit_rate: fixed_bit_rate.unwrap_or(0),
            fixed_rate: fixed_bit_rate.is_some(),
            real_time: false,
            time: TimeValue::ZERO,
            ts_id,
            pat: Stream::new_psi(PID_PAT, refresh),
            programs: Vec::new(),
            needs_reconfig: false,
            null_packet,
            output,
        }
    }

    /// Adds an empty program with a PMT on `pmt_pid` and rebuilds the PAT.
    pub fn add_program(&mut self, number: u16, pmt_pid: u16) -> Result<usize> {
        let refresh = config::defaults().pat_pmt_refresh_rate_ms;
        self.programs.push(Program::new(number, pmt_pid, refresh));
        self.rebuild_pat()?;
        Ok(self.programs.len() - 1)
    }

    fn rebuild_pat(&mut self) -> Result<()> {
        let entries: Vec<PatEntry> = self
            .programs
            .iter()
            .map(|p| PatEntry {
                program_number: p.number,
                pmt_pid: p.pmt.pid,
            })
            .collect();
        let payload = build_pat_payload(&entries);
        self.pat.update_table(TABLE_ID_PAT, self.ts_id, &payload, true, false)?;
        Ok(())
    }

    /// Adds an elementary stream to `program_index`. The first stream
    /// added to a program becomes its PCR source unless `designate_pcr`
    /// is set on a later call.
    #[allow(clippy::too_many_arguments)]
    pub fn add_stream(
        &mut self,
        program_index: usize,
        pid: u16,
        mpeg2_stream_type: u8,
        mpeg2_stream_id: u8,
        source: EsMode,
        ts_scale: f64,
        initial_bit_rate: u32,
        designate_pcr: bool,
    ) -> Result<usize> {
        let stream = Stream::new_pes(pid, mpeg2_stream_type, mpeg2_stream_id, source, ts_scale, initial_bit_rate);
        let program = self
            .programs
            .get_mut(program_index)
            .ok_or_else(|| MuxError::InvalidData("no such program".into()))?;
        let idx = program.add_stream(stream);
        if designate_pcr || idx == 0 {
            program.designate_pcr(idx);
        }
        program.rebuild_pmt()?;
        self.needs_reconfig = true;
        Ok(idx)
    }

    /// `update_config(reset_time)`: recomputes the aggregate bit rate
    /// from the PAT and every program's PMT/streams/PCR overhead unless
    /// `fixed_rate` is set, and optionally zeros every clock.
    pub fn update_config(&mut self, reset_time: bool) -> Result<()> {
        if !self.fixed_rate {
            let mut total = self.pat.bit_rate;
            for program in &self.programs {
                total += program.aggregate_bit_rate();
            }
            self.bit_rate = total;
        }
        if reset_time {
            self.time = TimeValue::ZERO;
            self.pat.time = TimeValue::ZERO;
            for program in &mut self.programs {
                program.pmt.time = TimeValue::ZERO;
                for stream in &mut program.streams {
                    stream.time = TimeValue::ZERO;
                }
            }
        }
        Ok(())
    }

    fn sync_pcr_and_fetch(&mut self) -> Result<()> {
        for program in &mut self.programs {
            if !program.pcr_init {
                let pcr_idx = program.pcr_stream_index;
                if let Some(stream) = program.streams.get_mut(pcr_idx) {
                    match stream.fetch_next_au() {
                        Ok(true) => {
                            let dts = stream.pending_dts().unwrap_or(0);
                            let muxer_time = self.time;
                            program.init_pcr(muxer_time, dts);
                        }
                        Ok(false) => {}
                        Err(MuxError::EndOfStream) => {}
                        Err(other) => return Err(other),
                    }
                }
            }
            if program.pcr_init {
                let pcr_init_ts_time = program.pcr_init_ts_time;
                let pcr_init_time = program.pcr_init_time;
                for stream in &mut program.streams {
                    let _ = stream.fetch_next_au();
                    sync_stream_time(stream, pcr_init_ts_time, pcr_init_time);
                }
            }
        }
        Ok(())
    }

    /// Picks the eligible candidate (PSI or PES) with the smallest
    /// `stream.time`, ties broken by insertion order (PAT < PMT <
    /// streams(program 0) < PMT(program 1) < ...). A candidate is
    /// eligible only when its own clock has not outrun the muxer's —
    /// `stream.time <= self.time` — which is what paces an always-ready
    /// PES stream down to the muxer's configured rate instead of
    /// draining it as fast as access units can be pulled.
    fn choose_candidate(&self) -> Option<Candidate> {
        let mut chosen: Option<(Candidate, TimeValue)> = None;

        if self.pat.psi_has_data() && self.pat.time <= self.time {
            chosen = Some((Candidate::Pat, self.pat.time));
        }

        for (pi, program) in self.programs.iter().enumerate() {
            if program.pmt.psi_has_data() && program.pmt.time <= self.time {
                let t = program.pmt.time;
                if chosen.as_ref().map(|(_, ct)| t < *ct).unwrap_or(true) {
                    chosen = Some((Candidate::Pmt(pi), t));
                }
            }
            if !program.pcr_init {
                continue;
            }
            for (si, stream) in program.streams.iter().enumerate() {
                if stream.is_terminal() || stream.pending_dts().is_none() {
                    continue;
                }
                let t = stream.time;
                if t > self.time {
                    continue;
                }
                if chosen.as_ref().map(|(_, ct)| t < *ct).unwrap_or(true) {
                    chosen = Some((Candidate::Pes(pi, si), t));
                }
            }
        }

        chosen.map(|(c, _)| c)
    }

    fn advance_clock(&mut self) {
        if self.bit_rate > 0 {
            self.time.advance(1504, self.bit_rate as u64);
        }
    }

    /// Runs one emission cycle, writing exactly one 188-byte packet.
    /// Returns `true` if no PES stream reported progress this cycle
    /// (a NULL packet or a PSI packet was emitted instead).
    pub fn process(&mut self) -> Result<bool> {
        if self.needs_reconfig {
            self.update_config(false)?;
            self.needs_reconfig = false;
        }

        self.sync_pcr_and_fetch()?;

        let candidate = self.choose_candidate();
        let progressed = match candidate {
            None => {
                self.output.write_all(&self.null_packet)?;
                false
            }
            Some(Candidate::Pat) => {
                let packet = self.pat.emit_psi_packet()?;
                self.output.write_all(&packet)?;
                false
            }
            Some(Candidate::Pmt(pi)) => {
                let packet = self.programs[pi].pmt.emit_psi_packet()?;
                self.output.write_all(&packet)?;
                false
            }
            Some(Candidate::Pes(pi, si)) => {
                let is_pcr = self.programs[pi].pcr_stream_index == si;
                let pcr_27mhz = if is_pcr {
                    self.programs[pi].streams[si].pending_dts().map(|dts| dts * 300)
                } else {
                    None
                };
                let packet = self.programs[pi].streams[si].emit_pes_packet(pcr_27mhz)?;
                self.output.write_all(&packet)?;
                true
            }
        };

        self.advance_clock();
        Ok(!progressed)
    }

    /// True once every program has at least one elementary stream and
    /// every elementary stream has reported `STREAM_IS_OVER` with no
    /// access units left buffered. An empty muxer (no streams attached)
    /// never reports done, matching the "empty ES" scenario where the
    /// loop runs until an external cancellation.
    pub fn all_streams_terminal(&self) -> bool {
        let mut saw_any = false;
        for program in &self.programs {
            for stream in &program.streams {
                saw_any = true;
                if !stream.is_terminal() {
                    return false;
                }
            }
        }
        saw_any
    }

    /// Drives [`Muxer::process`] in a tight loop until every elementary
    /// stream is exhausted. Callers that need external cancellation
    /// (e.g. the empty-ES scenario, or real-time "quit" signals) should
    /// call [`Muxer::process`] directly instead.
    pub fn run(&mut self) -> Result<()> {
        loop {
            self.process()?;
            if self.all_streams_terminal() {
                break;
            }
        }
        Ok(())
    }

    /// Consumes the muxer and returns the output sink.
    pub fn into_inner(self) -> W {
        self.output
    }
}

fn sync_stream_time(stream: &mut Stream, pcr_init_ts_time: TimeValue, pcr_init_time: u64) {
    if let Some(dts) = stream.pending_dts() {
        let delta = dts as i64 - pcr_init_time as i64;
        stream.time = pcr_init_ts_time.plus_90khz_ticks(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::es::{EsSource, EsStreamInfo, StreamKind};
    use crate::pes::AccessUnit;
    use crate::ts::{STREAM_ID_VIDEO, STREAM_TYPE_H264};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    struct CountingSource {
        remaining: u32,
        dts: u64,
    }

    impl EsSource for CountingSource {
        fn info(&self) -> EsStreamInfo {
            EsStreamInfo {
                kind: StreamKind::Visual,
                object_type_indication: 0x21,
                timescale: 90_000,
                bit_rate: 1_000_000,
            }
        }

        fn capabilities(&self) -> u32 {
            crate::es::AU_PULL_CAP
        }

        fn pull(&mut self) -> Result<AccessUnit> {
            if self.remaining == 0 {
                return Err(MuxError::EndOfStream);
            }
            self.remaining -= 1;
            let dts = self.dts;
            self.dts += 3000;
            Ok(AccessUnit {
                data: Bytes::from(vec![0x11u8; 500]),
                cts: dts,
                dts,
                flags: 0,
                is_rap: true,
                au_start: true,
                au_end: true,
            })
        }
    }

    #[test]
    fn empty_program_emits_pat_and_null_packets() {
        let mut out = Vec::new();
        let mut muxer = Muxer::new(&mut out, 1, Some(1_500_000));
        muxer.add_program(1, 100).unwrap();
        for _ in 0..20 {
            muxer.process().unwrap();
        }
        assert_eq!(out.len() % TS_PACKET_SIZE, 0);
        assert!(out.chunks(TS_PACKET_SIZE).all(|p| p[0] == 0x47));
    }

    #[test]
    fn single_video_stream_runs_to_completion() {
        let mut out = Vec::new();
        let mut muxer = Muxer::new(&mut out, 1, Some(1_500_000));
        let program = muxer.add_program(1, 100).unwrap();
        muxer
            .add_stream(
                program,
                110,
                STREAM_TYPE_H264,
                STREAM_ID_VIDEO,
                EsMode::Pull(Box::new(CountingSource { remaining: 10, dts: 0 })),
                1.0,
                1_000_000,
                true,
            )
            .unwrap();
        muxer.run().unwrap();
        assert_eq!(out.len() % TS_PACKET_SIZE, 0);
        assert!(out.len() > 0);
    }

    #[test]
    fn continuity_counter_increments_strictly_per_pid_p3() {
        let mut out = Vec::new();
        let mut muxer = Muxer::new(&mut out, 1, Some(1_500_000));
        muxer.add_program(1, 100).unwrap();
        for _ in 0..50 {
            muxer.process().unwrap();
        }
        let mut last_cc: Option<u8> = None;
        for packet in out.chunks(TS_PACKET_SIZE) {
            let pid = (((packet[1] as u16) << 8) | packet[2] as u16) & 0x1FFF;
            if pid != PID_PAT {
                continue;
            }
            let afc = (packet[3] >> 4) & 0x3;
            if afc & 0x1 == 0 {
                continue; // no payload, CC does not advance
            }
            let cc = packet[3] & 0x0F;
            if let Some(prev) = last_cc {
                assert_eq!(cc, (prev + 1) % 16);
            }
            last_cc = Some(cc);
        }
    }
}
