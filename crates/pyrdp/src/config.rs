//! The proxy's external configuration surface: bind/target addresses,
//! credentials to inject during the connection sequence, where recordings
//! land, optional TLS material, and the plugin list.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Username/password/domain the proxy presents to the target server,
/// overriding whatever the connecting client supplied, the way PyRDP's MITM
/// can pin every session to one known-good set of credentials regardless of
/// what was typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectedCredentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

/// Full proxy configuration: where to listen, where to relay to, and every
/// knob the accept loop needs that isn't negotiated on the wire.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub bind_address: SocketAddr,
    pub target_address: SocketAddr,
    pub credentials: Option<InjectedCredentials>,
    pub recording_directory: PathBuf,
    pub tls_key_path: Option<PathBuf>,
    pub tls_cert_path: Option<PathBuf>,
    pub plugins: Vec<String>,
}

impl ProxyConfig {
    /// A bare-bones configuration with no injected credentials, no TLS
    /// material, and no plugins: just enough to relay and record.
    pub fn new(bind_address: SocketAddr, target_address: SocketAddr, recording_directory: PathBuf) -> Self {
        Self {
            bind_address,
            target_address,
            credentials: None,
            recording_directory,
            tls_key_path: None,
            tls_cert_path: None,
            plugins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_config_has_no_credentials_or_tls_by_default() {
        let config = ProxyConfig::new(
            "127.0.0.1:3389".parse().unwrap(),
            "127.0.0.1:3390".parse().unwrap(),
            PathBuf::from("/tmp/recordings"),
        );
        assert!(config.credentials.is_none());
        assert!(config.tls_key_path.is_none());
        assert!(config.tls_cert_path.is_none());
        assert!(config.plugins.is_empty());
    }
}
