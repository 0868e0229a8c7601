//! The layer-chain abstraction every protocol stage of the MITM proxy plugs
//! into: a bidirectional pipeline of named nodes (TPKT, X.224, MCS, security,
//! slow-path/fast-path, ...) that notify registered observers as bytes flow
//! in either direction, plus the negotiated session state
//! ([`RDPMITMState`]) those observers read and mutate.
//!
//! Layers are held in an arena ([`LayerChain`]) and referenced by
//! [`LayerHandle`], a plain index. A node's `next` (toward the application)
//! and `previous` (toward the wire) links are therefore copyable indices
//! rather than `Rc`/`RefCell` pointers, so a layer chain can never form a
//! Rust ownership cycle no matter which direction observers walk it.

use std::collections::BTreeMap;

use pyrdp_svc::StaticChannelId;

/// Why a layer chain stopped relaying traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed its half of the connection cleanly.
    Eof,
    /// A PDU failed to parse; fatal for layers where recovery isn't
    /// possible (MCS, security), tolerated elsewhere (see `spec` §7).
    ParseError,
    /// The underlying transport failed.
    Io,
    /// A cryptographic operation (RC4 keystream, MAC check) failed.
    Crypto,
    /// Torn down deliberately (e.g. the other side of the MITM disconnected).
    Closed,
}

/// Registered against a [`LayerHandle`] to observe traffic flowing through
/// that node. Every method has a no-op default so an observer only
/// overrides the events it cares about.
pub trait LayerObserver: Send {
    fn on_received(&mut self, _bytes: &[u8]) {}
    fn on_sent(&mut self, _bytes: &[u8]) {}
    fn on_disconnect(&mut self, _reason: DisconnectReason) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerHandle(usize);

struct LayerNode {
    name: &'static str,
    previous: Option<LayerHandle>,
    next: Option<LayerHandle>,
    observers: Vec<Box<dyn LayerObserver>>,
}

/// An arena of layer-chain nodes. `send` walks toward `previous` (outward,
/// toward the wire); `recv` walks toward `next` (inward, toward the PDU
/// consumer). Each direction notifies every node's observers along the way,
/// mirroring how a real stack hands a PDU up through TPKT -> X.224 -> MCS
/// -> security -> slow/fast-path, or a send call unwinds the same chain in
/// reverse.
#[derive(Default)]
pub struct LayerChain {
    nodes: Vec<LayerNode>,
}

impl LayerChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &'static str) -> LayerHandle {
        let handle = LayerHandle(self.nodes.len());
        self.nodes.push(LayerNode {
            name,
            previous: None,
            next: None,
            observers: Vec::new(),
        });
        handle
    }

    /// Links `outer` (closer to the wire) to `inner` (closer to the
    /// application) as adjacent stages of the same pipeline.
    pub fn link(&mut self, outer: LayerHandle, inner: LayerHandle) {
        self.nodes[outer.0].next = Some(inner);
        self.nodes[inner.0].previous = Some(outer);
    }

    pub fn observe(&mut self, handle: LayerHandle, observer: Box<dyn LayerObserver>) {
        self.nodes[handle.0].observers.push(observer);
    }

    pub fn name(&self, handle: LayerHandle) -> &'static str {
        self.nodes[handle.0].name
    }

    /// A PDU is being sent out from `handle`: notify this node's observers,
    /// then hand the same bytes to the previous (outward) layer so every
    /// stage between the caller and the transport sees it.
    pub fn send(&mut self, handle: LayerHandle, bytes: &[u8]) {
        for observer in &mut self.nodes[handle.0].observers {
            observer.on_sent(bytes);
        }
        if let Some(previous) = self.nodes[handle.0].previous {
            self.send(previous, bytes);
        }
    }

    /// Bytes arrived at `handle` from the wire: notify this node's
    /// observers, then forward to the next (inward) layer.
    pub fn recv(&mut self, handle: LayerHandle, bytes: &[u8]) {
        for observer in &mut self.nodes[handle.0].observers {
            observer.on_received(bytes);
        }
        if let Some(next) = self.nodes[handle.0].next {
            self.recv(next, bytes);
        }
    }

    /// Notifies every node in the chain that the session tore down,
    /// starting from `handle` and walking outward then inward so both
    /// halves of the pipeline hear about it exactly once.
    pub fn disconnect(&mut self, handle: LayerHandle, reason: DisconnectReason) {
        let mut seen = vec![false; self.nodes.len()];
        self.disconnect_toward(handle, reason, &mut seen, |node| node.previous);
        self.disconnect_toward(handle, reason, &mut seen, |node| node.next);
    }

    fn disconnect_toward(
        &mut self,
        handle: LayerHandle,
        reason: DisconnectReason,
        seen: &mut [bool],
        step: fn(&LayerNode) -> Option<LayerHandle>,
    ) {
        let mut current = Some(handle);
        while let Some(handle) = current {
            if seen[handle.0] {
                break;
            }
            seen[handle.0] = true;
            for observer in &mut self.nodes[handle.0].observers {
                observer.on_disconnect(reason);
            }
            current = step(&self.nodes[handle.0]);
        }
    }
}

/// Keystroke/mouse modifier and credential-capture state tracked by the
/// input observer, plus the bits of negotiated session state every other
/// component (channel relaying, recording) needs to read.
#[derive(Debug, Clone)]
pub struct RDPMITMState {
    pub logged_in: bool,
    pub shift_pressed: bool,
    pub ctrl_pressed: bool,
    pub caps_lock_on: bool,
    pub input_buffer: String,
    pub credentials_candidate: Option<String>,
    pub window_size: (u32, u32),
    pub channels: BTreeMap<String, StaticChannelId>,
}

impl Default for RDPMITMState {
    fn default() -> Self {
        Self {
            logged_in: false,
            shift_pressed: false,
            ctrl_pressed: false,
            caps_lock_on: false,
            input_buffer: String::new(),
            credentials_candidate: None,
            window_size: (1024, 768),
            channels: BTreeMap::new(),
        }
    }
}

impl RDPMITMState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingObserver {
        received: Arc<Mutex<Vec<Vec<u8>>>>,
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        disconnects: Arc<Mutex<Vec<DisconnectReason>>>,
    }

    impl LayerObserver for RecordingObserver {
        fn on_received(&mut self, bytes: &[u8]) {
            self.received.lock().unwrap().push(bytes.to_vec());
        }

        fn on_sent(&mut self, bytes: &[u8]) {
            self.sent.lock().unwrap().push(bytes.to_vec());
        }

        fn on_disconnect(&mut self, reason: DisconnectReason) {
            self.disconnects.lock().unwrap().push(reason);
        }
    }

    #[test]
    fn recv_propagates_inward_through_every_layer() {
        let mut chain = LayerChain::new();
        let tpkt = chain.push("tpkt");
        let x224 = chain.push("x224");
        let mcs = chain.push("mcs");
        chain.link(tpkt, x224);
        chain.link(x224, mcs);

        let received = Arc::new(Mutex::new(Vec::new()));
        chain.observe(
            mcs,
            Box::new(RecordingObserver {
                received: received.clone(),
                ..Default::default()
            }),
        );

        chain.recv(tpkt, b"hello");
        assert_eq!(received.lock().unwrap().as_slice(), [b"hello".to_vec()]);
    }

    #[test]
    fn send_propagates_outward_through_every_layer() {
        let mut chain = LayerChain::new();
        let tpkt = chain.push("tpkt");
        let x224 = chain.push("x224");
        chain.link(tpkt, x224);

        let sent = Arc::new(Mutex::new(Vec::new()));
        chain.observe(
            tpkt,
            Box::new(RecordingObserver {
                sent: sent.clone(),
                ..Default::default()
            }),
        );

        chain.send(x224, b"bye");
        assert_eq!(sent.lock().unwrap().as_slice(), [b"bye".to_vec()]);
    }

    #[test]
    fn disconnect_notifies_every_node_exactly_once() {
        let mut chain = LayerChain::new();
        let tpkt = chain.push("tpkt");
        let x224 = chain.push("x224");
        let mcs = chain.push("mcs");
        chain.link(tpkt, x224);
        chain.link(x224, mcs);

        let disconnects = Arc::new(Mutex::new(Vec::new()));
        for handle in [tpkt, x224, mcs] {
            chain.observe(
                handle,
                Box::new(RecordingObserver {
                    disconnects: disconnects.clone(),
                    ..Default::default()
                }),
            );
        }

        chain.disconnect(x224, DisconnectReason::Eof);
        assert_eq!(disconnects.lock().unwrap().len(), 3);
    }

    #[test]
    fn mitm_state_defaults_to_logged_out_with_empty_buffer() {
        let state = RDPMITMState::new();
        assert!(!state.logged_in);
        assert_eq!(state.input_buffer, "");
        assert_eq!(state.credentials_candidate, None);
    }
}
