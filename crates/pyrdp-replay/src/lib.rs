//! The reverse half of recording: replays a sequence of `(timestamp,
//! messageType, payload)` frames (`pyrdp-recording`'s format) back through
//! a decoder and onto an offscreen [`Surface`], the way the original
//! player re-parses a capture instead of re-running a live connection.
//!
//! A drawing-order engine is only created once the replayed capability
//! exchange tells it to — a session that never advertised `CAPSTYPE_ORDER`
//! never had anything for it to decode, so there would be nothing to feed
//! it anyway.

pub mod frontend;
pub mod surface;

pub use frontend::SurfaceFrontend;
pub use surface::Surface;

use pyrdp_core::ReadCursor;
use pyrdp_graphics::OrdersEngine;
use pyrdp_pdu::capability_sets::CapabilitySet;
use pyrdp_pdu::fastpath::{FastPathUpdatePdu, UpdateCode};
use pyrdp_pdu::slowpath::{ShareControlHeader, ShareControlPdu, ShareDataPdu};
use pyrdp_pdu::Decode;
use pyrdp_recording::{read_frames, MessageType, RecordedFrame};

/// Notified once per replayed frame, bracketing whatever rendering work
/// that frame triggers. A UI hangs a repaint off `on_finish_render`; tests
/// can just count calls.
pub trait ReplaySink {
    fn on_begin_render(&mut self, _frame: &RecordedFrame) {}
    fn on_finish_render(&mut self, _frame: &RecordedFrame) {}
}

/// Drives a decoded frame stream through the drawing-order engine and onto
/// a [`SurfaceFrontend`]. Frames this player can't yet interpret
/// (`CLIENT_INFO`, `CLIPBOARD_DATA`, `CLIENT_DATA`) are simply skipped —
/// only `FAST_PATH_OUTPUT` (and, for capability negotiation,
/// `SLOW_PATH_PDU`) carry anything this player renders.
pub struct Player {
    orders_enabled: bool,
    engine: OrdersEngine,
    pub frontend: SurfaceFrontend,
}

impl Player {
    pub fn new(surface_width: usize, surface_height: usize) -> Self {
        Self {
            orders_enabled: false,
            engine: OrdersEngine::new(),
            frontend: SurfaceFrontend::new(surface_width, surface_height),
        }
    }

    /// Parses `bytes` as a sequence of recorder frames and replays every
    /// one in order, notifying `sink` around each. Returns the number of
    /// frames actually replayed, which may be fewer than what a fully
    /// intact recording would contain if the file was truncated mid-write
    /// — per this format's "parse errors are end-of-stream" policy, that's
    /// not an error, just a shorter session.
    pub fn replay(&mut self, bytes: &[u8], sink: &mut dyn ReplaySink) -> usize {
        let frames = read_frames(bytes);
        for frame in &frames {
            sink.on_begin_render(frame);
            self.replay_frame(frame);
            sink.on_finish_render(frame);
        }
        frames.len()
    }

    fn replay_frame(&mut self, frame: &RecordedFrame) {
        match frame.message_type {
            MessageType::SlowPathPdu => self.replay_slow_path(&frame.payload),
            MessageType::FastPathOutput => self.replay_fast_path_output(&frame.payload),
            MessageType::FastPathInput | MessageType::ClientInfo | MessageType::ClipboardData | MessageType::ClientData => {
                // Not rendered: these carry input, connection, or clipboard
                // data, none of which this offscreen player draws.
            }
            MessageType::Other(code) => {
                tracing::debug!(code, "skipping replay frame of unregistered message type");
            }
        }
    }

    fn replay_slow_path(&mut self, payload: &[u8]) {
        let mut cursor = ReadCursor::new(payload);
        let Ok(control_header) = ShareControlHeader::decode(&mut cursor) else {
            tracing::warn!("failed to decode slow-path PDU during replay, skipping frame");
            return;
        };

        match control_header.pdu {
            ShareControlPdu::DemandActive(demand) => self.on_capabilities(&demand.pdu.capability_sets),
            ShareControlPdu::ConfirmActive(confirm) => self.on_capabilities(&confirm.pdu.capability_sets),
            ShareControlPdu::Data(header) => {
                // The slow-path Graphics Update PDU (`pduType2 == PDUTYPE2_UPDATE`)
                // isn't one of ShareDataPdu's named variants, so it surfaces as
                // `Other`; its own leading `updateType` field (0 == ORDERS)
                // still needs to be peeled off before the order stream starts.
                const PDU_TYPE2_UPDATE: u8 = 0x02;
                const UPDATE_TYPE_ORDERS: u16 = 0;
                if let ShareDataPdu::Other(PDU_TYPE2_UPDATE, update_payload) = &header.pdu {
                    if self.orders_enabled && update_payload.len() >= 2 {
                        let update_type = u16::from_le_bytes([update_payload[0], update_payload[1]]);
                        if update_type == UPDATE_TYPE_ORDERS {
                            self.engine.parse_update(&update_payload[2..], &mut self.frontend);
                        }
                    }
                }
            }
            ShareControlPdu::DeactivateAll | ShareControlPdu::Other(..) => {}
        }
    }

    fn on_capabilities(&mut self, capability_sets: &[CapabilitySet]) {
        self.orders_enabled = capability_sets.iter().any(|cap| matches!(cap, CapabilitySet::Order(_)));
        self.engine.on_capabilities(capability_sets);
    }

    fn replay_fast_path_output(&mut self, payload: &[u8]) {
        if !self.orders_enabled {
            return;
        }

        let mut cursor = ReadCursor::new(payload);
        let Ok(update) = FastPathUpdatePdu::decode(&mut cursor) else {
            tracing::warn!("failed to decode fast-path output during replay, skipping frame");
            return;
        };

        if update.update_code == UpdateCode::Orders {
            self.engine.parse_update(update.data, &mut self.frontend);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrdp_core::WriteCursor;
    use pyrdp_recording::Recorder;

    #[derive(Default)]
    struct CountingSink {
        begins: u32,
        finishes: u32,
    }

    impl ReplaySink for CountingSink {
        fn on_begin_render(&mut self, _frame: &RecordedFrame) {
            self.begins += 1;
        }

        fn on_finish_render(&mut self, _frame: &RecordedFrame) {
            self.finishes += 1;
        }
    }

    fn encode_fast_path_orders_update(number_orders: u16, order_bytes: &[u8]) -> Vec<u8> {
        let mut payload = vec![0u8; 2];
        WriteCursor::new(&mut payload).write_u16(number_orders);
        payload.extend_from_slice(order_bytes);

        let update = FastPathUpdatePdu {
            fragmentation: pyrdp_pdu::fastpath::Fragmentation::Single,
            update_code: UpdateCode::Orders,
            compression_flags: None,
            compression_type: None,
            data: &payload,
        };

        let mut buf = vec![0u8; pyrdp_pdu::Encode::size(&update)];
        let mut cursor = WriteCursor::new(&mut buf);
        pyrdp_pdu::Encode::encode(&update, &mut cursor).unwrap();
        buf
    }

    #[test]
    fn replay_notifies_sink_once_per_frame() {
        let mut recorder = Recorder::new();
        let sink_frames = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

        struct CapturingSink(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
        impl pyrdp_recording::Sink for CapturingSink {
            fn write(&mut self, bytes: &[u8]) {
                self.0.lock().unwrap().extend_from_slice(bytes);
            }
            fn finalize(&mut self) {}
        }
        recorder.add_sink(Box::new(CapturingSink(sink_frames.clone())));
        recorder.record_bytes(MessageType::ClientInfo, b"ignored-but-recorded");
        recorder.record_bytes(MessageType::ClipboardData, b"also-ignored");

        let bytes = sink_frames.lock().unwrap().clone();
        let mut player = Player::new(16, 16);
        let mut sink = CountingSink::default();
        let replayed = player.replay(&bytes, &mut sink);

        assert_eq!(replayed, 2);
        assert_eq!(sink.begins, 2);
        assert_eq!(sink.finishes, 2);
    }

    #[test]
    fn orders_are_only_rendered_once_order_capability_is_seen() {
        let mut player = Player::new(16, 16);
        assert!(!player.orders_enabled);

        player.on_capabilities(&[]);
        assert!(!player.orders_enabled);
    }

    #[test]
    fn fast_path_orders_update_paints_the_frontend() {
        let mut order_bytes = Vec::new();
        order_bytes.push((pyrdp_graphics::ControlFlags::STANDARD | pyrdp_graphics::ControlFlags::TYPE_CHANGE).bits());
        order_bytes.push(0x0A); // orderType: OPAQUE_RECT
        order_bytes.push(0x7F); // fieldFlags: all 7 fields
        order_bytes.extend_from_slice(&0i16.to_le_bytes()); // left
        order_bytes.extend_from_slice(&0i16.to_le_bytes()); // top
        order_bytes.extend_from_slice(&4i16.to_le_bytes()); // width
        order_bytes.extend_from_slice(&4i16.to_le_bytes()); // height
        order_bytes.push(10);
        order_bytes.push(20);
        order_bytes.push(30);

        let update_bytes = encode_fast_path_orders_update(1, &order_bytes);

        let mut player = Player::new(8, 8);
        player.orders_enabled = true;
        player.replay_fast_path_output(&update_bytes);

        assert_eq!(&player.frontend.surface.pixels()[0..3], &[10, 20, 30]);
    }
}
