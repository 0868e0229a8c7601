//! Records a session to one or more sinks as a sequence of framed events:
//! `messageType (u16 LE) · timestampMs (u64 LE) · payloadLength (u32 LE) ·
//! payload`. The recorder itself never decides *when* to flush to disk —
//! that's [`FileSink`]'s job, and it intentionally delays opening the
//! output file until enough has accumulated that the session is clearly
//! not a throwaway connection probe.

mod sink;

pub use sink::{ChannelSink, FileSink, Sink, FLUSH_THRESHOLD};

use pyrdp_core::{Clock, ReadCursor, SystemClock};
use pyrdp_pdu::{Encode, WriteCursor};

/// The kinds of event a recording can carry. `Other` covers extension
/// values a particular deployment registers beyond the built-in set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    FastPathInput,
    FastPathOutput,
    ClientInfo,
    SlowPathPdu,
    ClipboardData,
    ClientData,
    Other(u16),
}

impl MessageType {
    fn to_u16(self) -> u16 {
        match self {
            Self::FastPathInput => 1,
            Self::FastPathOutput => 2,
            Self::ClientInfo => 3,
            Self::SlowPathPdu => 4,
            Self::ClipboardData => 5,
            Self::ClientData => 6,
            Self::Other(value) => value,
        }
    }

    pub fn from_u16(value: u16) -> Self {
        match value {
            1 => Self::FastPathInput,
            2 => Self::FastPathOutput,
            3 => Self::ClientInfo,
            4 => Self::SlowPathPdu,
            5 => Self::ClipboardData,
            6 => Self::ClientData,
            other => Self::Other(other),
        }
    }
}

/// One decoded recorder frame: a message type, the timestamp it was
/// recorded at, and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFrame {
    pub message_type: MessageType,
    pub timestamp_ms: u64,
    pub payload: Vec<u8>,
}

const FRAME_HEADER_SIZE: usize = 2 + 8 + 4;

/// Decodes as many complete frames as `bytes` contains. A truncated or
/// inconsistent trailing frame (length field pointing past the end of
/// `bytes`) is dropped silently rather than erroring: a recording file is
/// append-only and a session that was killed mid-write simply ends at the
/// last complete frame, matching this format's "parse errors are
/// end-of-stream" policy.
pub fn read_frames(bytes: &[u8]) -> Vec<RecordedFrame> {
    let mut frames = Vec::new();
    let mut cursor = ReadCursor::new(bytes);

    loop {
        if cursor.len() < FRAME_HEADER_SIZE {
            break;
        }
        let message_type = MessageType::from_u16(cursor.read_u16());
        let timestamp_ms = cursor.read_u64();
        let payload_length = cursor.read_u32() as usize;

        if cursor.len() < payload_length {
            break;
        }
        let payload = cursor.read_slice(payload_length).to_vec();
        frames.push(RecordedFrame {
            message_type,
            timestamp_ms,
            payload,
        });
    }

    frames
}

fn encode_frame(message_type: MessageType, timestamp_ms: u64, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![0u8; 2 + 8 + 4 + payload.len()];
    let mut cursor = WriteCursor::new(&mut frame);
    cursor.write_u16(message_type.to_u16());
    cursor.write_u64(timestamp_ms);
    cursor.write_u32(payload.len() as u32);
    cursor.write_slice(payload);
    frame
}

/// Multiplexes typed PDUs onto every registered [`Sink`]. A message type
/// with a registered encoder goes through it; anything else is assumed to
/// already be encoded and is forwarded as-is, so a caller that only has
/// raw bytes (e.g. relayed-but-not-decoded traffic) can still be recorded.
pub struct Recorder {
    sinks: Vec<Box<dyn Sink>>,
    clock: Box<dyn Clock>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            sinks: Vec::new(),
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(clock: Box<dyn Clock>) -> Self {
        Self {
            sinks: Vec::new(),
            clock,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn Sink>) {
        self.sinks.push(sink);
    }

    /// Encodes `pdu` and records it under `message_type`.
    pub fn record_pdu<T: Encode>(&mut self, message_type: MessageType, pdu: &T) {
        let mut buffer = vec![0u8; pdu.size()];
        let mut cursor = WriteCursor::new(&mut buffer);
        if let Err(err) = pdu.encode(&mut cursor) {
            tracing::warn!(%err, ?message_type, "failed to encode PDU for recording, dropping event");
            return;
        }
        self.record_bytes(message_type, &buffer);
    }

    /// Records an already-encoded payload directly: the "no parser
    /// registered, forward the raw PDU" path.
    pub fn record_bytes(&mut self, message_type: MessageType, payload: &[u8]) {
        let timestamp_ms = self.clock.now_ms();
        let frame = encode_frame(message_type, timestamp_ms, payload);
        for sink in &mut self.sinks {
            sink.write(&frame);
        }
    }

    /// Closes every sink. Subsequent `record_*` calls are still accepted
    /// but have nowhere to go once every sink has finalized.
    pub fn finalize(&mut self) {
        for sink in &mut self.sinks {
            sink.finalize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct ManualClock(u64);

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0
        }
    }

    #[derive(Default, Clone)]
    struct RecordingSink {
        frames: Arc<Mutex<Vec<u8>>>,
        finalized: Arc<Mutex<bool>>,
    }

    impl Sink for RecordingSink {
        fn write(&mut self, bytes: &[u8]) {
            self.frames.lock().unwrap().extend_from_slice(bytes);
        }

        fn finalize(&mut self) {
            *self.finalized.lock().unwrap() = true;
        }
    }

    #[test]
    fn message_type_round_trips_through_u16() {
        for ty in [
            MessageType::FastPathInput,
            MessageType::FastPathOutput,
            MessageType::ClientInfo,
            MessageType::SlowPathPdu,
            MessageType::ClipboardData,
            MessageType::ClientData,
            MessageType::Other(9001),
        ] {
            assert_eq!(MessageType::from_u16(ty.to_u16()), ty);
        }
    }

    #[test]
    fn record_bytes_writes_a_complete_frame() {
        let mut recorder = Recorder::with_clock(Box::new(ManualClock(42)));
        let sink = RecordingSink::default();
        recorder.add_sink(Box::new(sink.clone()));

        recorder.record_bytes(MessageType::ClientInfo, b"hello");

        let frame = sink.frames.lock().unwrap().clone();
        assert_eq!(frame.len(), 2 + 8 + 4 + 5);
        assert_eq!(&frame[0..2], &3u16.to_le_bytes()[..]);
        assert_eq!(&frame[2..10], &42u64.to_le_bytes()[..]);
        assert_eq!(&frame[10..14], &5u32.to_le_bytes()[..]);
        assert_eq!(&frame[14..], b"hello");
    }

    #[test]
    fn read_frames_round_trips_a_recorded_sequence() {
        let mut recorder = Recorder::with_clock(Box::new(ManualClock(7)));
        let sink = RecordingSink::default();
        recorder.add_sink(Box::new(sink.clone()));

        recorder.record_bytes(MessageType::ClientInfo, b"first");
        recorder.record_bytes(MessageType::SlowPathPdu, b"second");

        let bytes = sink.frames.lock().unwrap().clone();
        let frames = read_frames(&bytes);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].message_type, MessageType::ClientInfo);
        assert_eq!(frames[0].payload, b"first");
        assert_eq!(frames[1].message_type, MessageType::SlowPathPdu);
        assert_eq!(frames[1].payload, b"second");
    }

    #[test]
    fn read_frames_truncates_at_incomplete_trailing_frame() {
        let mut recorder = Recorder::with_clock(Box::new(ManualClock(1)));
        let sink = RecordingSink::default();
        recorder.add_sink(Box::new(sink.clone()));
        recorder.record_bytes(MessageType::ClientInfo, b"complete");

        let mut bytes = sink.frames.lock().unwrap().clone();
        bytes.extend_from_slice(&[9, 0]); // a dangling, incomplete second frame header

        let frames = read_frames(&bytes);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, b"complete");
    }

    #[test]
    fn finalize_closes_every_sink() {
        let mut recorder = Recorder::new();
        let sink = RecordingSink::default();
        recorder.add_sink(Box::new(sink.clone()));

        recorder.finalize();
        assert!(*sink.finalized.lock().unwrap());
    }
}
