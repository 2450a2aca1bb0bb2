//! # Elementary Stream Interface
//!
//! The contract between the muxer and any access-unit producer, pull
//! (synchronous, e.g. an ISO-BMFF track reader) or push (asynchronous,
//! e.g. an RTP receiver running on its own thread). Out-of-scope
//! sources (MP4 box parsing, RTP depacketization, SDP) are external
//! collaborators reachable only through [`EsSource`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{MuxError, Result};
use crate::pes::AccessUnit;
use crate::ts;

/// Source supports synchronous `DATA_PULL`.
pub const AU_PULL_CAP: u32 = 1 << 0;
/// Source has signaled end-of-stream.
pub const STREAM_IS_OVER: u32 = 1 << 1;

/// Broad media kind carried by a stream, independent of its specific codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Video elementary stream.
    Visual,
    /// Audio elementary stream.
    Audio,
    /// MPEG-4 scene description (BIFS).
    Scene,
    /// Timed text / subtitles.
    Text,
}

/// Maps an MPEG-4 Object Type Indication byte to the MPEG-2
/// `stream_type` carried in the PMT, per the table the original
/// multiplexer's stream-type dispatch uses.
pub fn oti_to_stream_type(oti: u8) -> Option<u8> {
    match oti {
        0x21 => Some(ts::STREAM_TYPE_H264),
        0x40 => Some(ts::STREAM_TYPE_AAC),
        0x6A => Some(ts::STREAM_TYPE_MPEG1_VIDEO),
        0x60..=0x65 => Some(ts::STREAM_TYPE_MPEG2_VIDEO),
        _ => None,
    }
}

/// Stream metadata an [`EsSource`] exposes when it is attached to a
/// program, used to seed the owning [`crate::stream::Stream`].
#[derive(Debug, Clone, Copy)]
pub struct EsStreamInfo {
    /// Broad media kind.
    pub kind: StreamKind,
    /// MPEG-4 Object Type Indication byte.
    pub object_type_indication: u8,
    /// Source timebase (e.g. 44100 for audio, 90000 already-TS-rate).
    pub timescale: u32,
    /// Initial bit-rate estimate; zero triggers rate measurement.
    pub bit_rate: u32,
}

impl EsStreamInfo {
    /// MPEG-2 PMT `stream_type` this source maps to, if recognized.
    pub fn stream_type(&self) -> Option<u8> {
        oti_to_stream_type(self.object_type_indication)
    }

    /// Conversion factor from `timescale` ticks to 90 kHz ticks.
    pub fn ts_scale(&self) -> f64 {
        if self.timescale == 90_000 {
            1.0
        } else {
            90_000.0 / self.timescale as f64
        }
    }
}

/// A synchronous (pull-mode) or asynchronous (push-mode) access-unit
/// producer. Implementors report their capabilities via
/// [`EsSource::capabilities`]; the muxer calls only the operations a
/// source advertises support for.
pub trait EsSource: Send {
    /// Stream metadata fixed at attach time.
    fn info(&self) -> EsStreamInfo;

    /// Capability bitmask, combining [`AU_PULL_CAP`] and [`STREAM_IS_OVER`].
    fn capabilities(&self) -> u32;

    /// `DATA_PULL`: synchronously fetch the next access unit. Only
    /// called when [`AU_PULL_CAP`] is set. Returns
    /// [`MuxError::EndOfStream`] when the source is exhausted.
    fn pull(&mut self) -> Result<AccessUnit> {
        let _ = self;
        Err(MuxError::InvalidData(
            "pull() called on a source without AU_PULL_CAP".into(),
        ))
    }

    /// `DATA_RELEASE`: the previously pulled access unit is no longer
    /// needed. Pull sources may free or advance an internal cursor.
    fn release(&mut self) {}

    /// `DATA_FLUSH`: drain whatever the source has buffered
    /// asynchronously into its own queue. No-op for pure pull sources.
    fn flush(&mut self) {}
}

/// A FIFO of deep-copied access units fed by an asynchronous producer
/// (e.g. an RTP receiver thread), drained by the muxer thread.
///
/// Producers call [`PushQueue::dispatch`] (`output_ctrl(DATA_DISPATCH,
/// pck)`); the muxer calls [`PushQueue::pop`]. The mutex is held only
/// long enough to append or detach one element.
pub struct PushQueue {
    queue: Mutex<VecDeque<AccessUnit>>,
    over: AtomicBool,
}

impl PushQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            over: AtomicBool::new(false),
        }
    }

    /// Appends a deep copy of `au` to the tail of the queue.
    pub fn dispatch(&self, au: AccessUnit) {
        self.queue.lock().push_back(au);
    }

    /// Detaches and returns the head of the queue, if any.
    pub fn pop(&self) -> Option<AccessUnit> {
        self.queue.lock().pop_front()
    }

    /// True if no access units are currently queued.
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Signals that the producer will dispatch no further access units.
    pub fn mark_over(&self) {
        self.over.store(true, Ordering::SeqCst);
    }

    /// True once the producer has signaled end-of-stream.
    pub fn is_over(&self) -> bool {
        self.over.load(Ordering::SeqCst)
    }
}

impl Default for PushQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn sample_au() -> AccessUnit {
        AccessUnit {
            data: Bytes::from_static(b"abc"),
            cts: 0,
            dts: 0,
            flags: 0,
            is_rap: false,
            au_start: true,
            au_end: true,
        }
    }

    #[test]
    fn oti_mapping_matches_the_recognized_codecs() {
        assert_eq!(oti_to_stream_type(0x21), Some(ts::STREAM_TYPE_H264));
        assert_eq!(oti_to_stream_type(0x40), Some(ts::STREAM_TYPE_AAC));
        assert_eq!(oti_to_stream_type(0x6A), Some(ts::STREAM_TYPE_MPEG1_VIDEO));
        assert_eq!(oti_to_stream_type(0x62), Some(ts::STREAM_TYPE_MPEG2_VIDEO));
        assert_eq!(oti_to_stream_type(0xFF), None);
    }

    #[test]
    fn ts_scale_is_identity_at_90khz() {
        let info = EsStreamInfo {
            kind: StreamKind::Visual,
            object_type_indication: 0x21,
            timescale: 90_000,
            bit_rate: 0,
        };
        assert_eq!(info.ts_scale(), 1.0);
    }

    #[test]
    fn push_queue_is_fifo() {
        let q = PushQueue::new();
        q.dispatch(sample_au());
        assert!(!q.is_empty());
        let popped = q.pop();
        assert!(popped.is_some());
        assert!(q.is_empty());
    }
}
