//! `mp42ts` — drives [`m2ts_mux::mux::Muxer`] end to end from the
//! command line.
//!
//! Real MP4/SDP parsing is out of this crate's scope (§1); this binary
//! only demonstrates the muxer core against a raw H.264 Annex-B
//! elementary stream, split into access units on NAL start codes.

use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use bytes::Bytes;
use clap::Parser;
use log::{error, info};

use m2ts_mux::config;
use m2ts_mux::es::{EsSource, EsStreamInfo, StreamKind};
use m2ts_mux::error::{MuxError, Result};
use m2ts_mux::mux::Muxer;
use m2ts_mux::pes::AccessUnit;
use m2ts_mux::stream::EsMode;
use m2ts_mux::ts::{STREAM_ID_VIDEO, STREAM_TYPE_H264};

/// Fixed aggregate output bit rate for the demo driver, bits per second.
const DEMO_BIT_RATE: u32 = 1_500_000;

/// Multiplexes one elementary stream into an MPEG-2 Transport Stream.
#[derive(Parser, Debug)]
#[command(name = "mp42ts", about = "Mux a raw H.264 elementary stream into MPEG-2 TS")]
struct Args {
    /// Input elementary stream (`.h264`/`.264` Annex-B).
    input: PathBuf,
    /// Output transport stream filename.
    output: PathBuf,
}

/// A synthetic pull-mode source reading an Annex-B H.264 stream split
/// on start codes, one access unit per NAL unit, paced at 30 fps.
struct DemoSource {
    nals: std::vec::IntoIter<Bytes>,
    dts: u64,
    first: bool,
}

impl DemoSource {
    fn open(path: &Path) -> Result<Self> {
        let mut data = Vec::new();
        File::open(path)
            .map_err(MuxError::Io)?
            .read_to_end(&mut data)
            .map_err(MuxError::Io)?;
        let nals = split_annex_b(&data);
        if nals.is_empty() {
            return Err(MuxError::Parse(format!(
                "no NAL start codes found in {}",
                path.display()
            )));
        }
        Ok(Self {
            nals: nals.into_iter(),
            dts: 0,
            first: true,
        })
    }
}

fn split_annex_b(data: &[u8]) -> Vec<Bytes> {
    let mut starts = Vec::new();
    let mut i = 0;
    while i + 3 < data.len() {
        if data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1 {
            starts.push(i);
            i += 3;
        } else {
            i += 1;
        }
    }
    let mut out = Vec::with_capacity(starts.len());
    for (idx, &start) in starts.iter().enumerate() {
        let end = starts.get(idx + 1).copied().unwrap_or(data.len());
        out.push(Bytes::copy_from_slice(&data[start..end]));
    }
    out
}

impl EsSource for DemoSource {
    fn info(&self) -> EsStreamInfo {
        EsStreamInfo {
            kind: StreamKind::Visual,
            object_type_indication: 0x21, // H.264
            timescale: 90_000,
            bit_rate: 0,
        }
    }

    fn capabilities(&self) -> u32 {
        m2ts_mux::es::AU_PULL_CAP
    }

    fn pull(&mut self) -> Result<AccessUnit> {
        let data = self.nals.next().ok_or(MuxError::EndOfStream)?;
        let dts = self.dts;
        self.dts += 3_000; // 90000 / 30fps
        let is_rap = self.first;
        self.first = false;
        Ok(AccessUnit {
            data,
            cts: dts,
            dts,
            flags: 0,
            is_rap,
            au_start: true,
            au_end: true,
        })
    }
}

fn probe_input(path: &Path) -> Result<()> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("h264") | Some("264") => Ok(()),
        _ => Err(MuxError::InputUnsupported(format!(
            "{}: expected a .h264/.264 Annex-B elementary stream",
            path.display()
        ))),
    }
}

fn run(args: &Args) -> Result<()> {
    probe_input(&args.input)?;
    let source = DemoSource::open(&args.input)?;

    let output = File::create(&args.output).map_err(MuxError::Io)?;
    let defaults = config::defaults();
    let mut muxer = Muxer::new(BufWriter::new(output), 1, Some(DEMO_BIT_RATE));
    let program = muxer.add_program(1, defaults.default_pmt_pid)?;
    muxer.add_stream(
        program,
        defaults.default_es_pid_base,
        STREAM_TYPE_H264,
        STREAM_ID_VIDEO,
        EsMode::Pull(Box::new(source)),
        1.0,
        0,
        true,
    )?;
    muxer.run()?;
    info!("wrote {}", args.output.display());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::from(0),
        Err(err @ MuxError::InputUnsupported(_)) => {
            error!("{}: {}", args.input.display(), err);
            ExitCode::from(1)
        }
        Err(err @ MuxError::Parse(_)) => {
            error!("{}: {}", args.input.display(), err);
            ExitCode::from(2)
        }
        Err(err) => {
            error!("{}: {}", args.output.display(), err);
            ExitCode::from(3)
        }
    }
}
