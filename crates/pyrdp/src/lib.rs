//! Wires the session state machine, MITM input/capability observer,
//! recorder, and the protocol channel handlers into one accept loop: the
//! top-level orchestration crate every other `pyrdp-*` crate plugs into.

pub mod config;
mod framing;
mod relay;

pub use config::{InjectedCredentials, ProxyConfig};
pub use relay::run;
