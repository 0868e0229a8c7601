//! The MITM half of the proxy: RC4 session-key derivation for Standard RDP
//! Security, the keystroke/mouse observer that reconstructs login
//! candidates, and the per-connection state glue ([`MitmSession`]) tying
//! both into the negotiated capability exchange and the drawing-order
//! engine. The actual TCP accept loop and client/server layer-chain
//! wiring lives in the top-level binary crate; this crate is the part of
//! it a recording or replay tool has no use for.

pub mod input;
pub mod rc4;
pub mod session;

pub use input::InputObserver;
pub use rc4::{derive_session_keys, Rc4, SessionKeys};
pub use session::MitmSession;
