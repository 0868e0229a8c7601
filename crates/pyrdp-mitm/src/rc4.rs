//! RC4 stream cipher and Standard RDP Security session-key derivation
//! (`[MS-RDPBCGR] 5.3.5`). The cipher itself is the classic key-scheduling
//! plus pseudo-random generation algorithm every RC4 implementation shares;
//! key derivation follows the SSLv3-style key-block expansion Standard RDP
//! Security reuses, keyed off the client/server random values exchanged
//! during the security commencement sequence and the negotiated master
//! secret.
//!
//! Only the random values are ever logged, never derived key material:
//! matches the original proxy's RC4 diagnostics, which record
//! `clientRandom`/`serverRandom` hex fingerprints at debug level so a
//! capture can be correlated with a session without exposing its keys.

#[derive(Debug, Clone)]
pub struct Rc4 {
    i: usize,
    j: usize,
    state: [u8; 256],
}

impl Rc4 {
    pub fn new(key: &[u8]) -> Self {
        let mut state = [0u8; 256];
        for (index, slot) in state.iter_mut().enumerate() {
            *slot = index as u8;
        }

        let mut j = 0usize;
        for i in 0..256 {
            j = (j + state[i] as usize + key[i % key.len()] as usize) % 256;
            state.swap(i, j);
        }

        Self { i: 0, j: 0, state }
    }

    pub fn process(&mut self, message: &[u8]) -> Vec<u8> {
        let mut output = Vec::with_capacity(message.len());
        for &byte in message {
            self.i = (self.i + 1) % 256;
            self.j = (self.j + self.state[self.i] as usize) % 256;
            self.state.swap(self.i, self.j);
            let idx = (self.state[self.i] as usize + self.state[self.j] as usize) % 256;
            output.push(self.state[idx] ^ byte);
        }
        output
    }
}

fn salted_sha1(label: &[u8], master_secret: &[u8], client_random: &[u8], server_random: &[u8]) -> [u8; 20] {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(label);
    hasher.update(master_secret);
    hasher.update(client_random);
    hasher.update(server_random);
    hasher.finalize().into()
}

fn salted_md5(master_secret: &[u8], sha: &[u8]) -> [u8; 16] {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(master_secret);
    hasher.update(sha);
    hasher.finalize().into()
}

/// Expands `master_secret` into a 48-byte key block the way SSLv3 (and, in
/// turn, Standard RDP Security) does: three rounds of `MD5(secret ||
/// SHA1(label || secret || clientRandom || serverRandom))`, with labels
/// `"A"`, `"BB"`, `"CCC"`.
fn key_block(master_secret: &[u8], client_random: &[u8], server_random: &[u8]) -> [u8; 48] {
    let mut block = [0u8; 48];
    for (round, label) in [&b"A"[..], b"BB", b"CCC"].into_iter().enumerate() {
        let sha = salted_sha1(label, master_secret, client_random, server_random);
        let md5 = salted_md5(master_secret, &sha);
        block[round * 16..round * 16 + 16].copy_from_slice(&md5);
    }
    block
}

/// `[MS-RDPBCGR] 5.3.5.1`'s final per-direction key derivation: the
/// key-block slice is further mixed with both random values so the
/// client-to-server and server-to-client keys, though drawn from the same
/// block, end up independent.
fn final_hash(key: &[u8], client_random: &[u8], server_random: &[u8]) -> [u8; 16] {
    use md5::{Digest, Md5};
    let mut hasher = Md5::new();
    hasher.update(key);
    hasher.update(client_random);
    hasher.update(server_random);
    hasher.finalize().into()
}

/// The two RC4 keys a Standard RDP Security session uses: one per
/// direction, since RC4 keystreams must never be reused across directions.
#[derive(Clone)]
pub struct SessionKeys {
    pub client_to_server: [u8; 16],
    pub server_to_client: [u8; 16],
}

impl std::fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

pub fn derive_session_keys(master_secret: &[u8], client_random: &[u8], server_random: &[u8]) -> SessionKeys {
    tracing::debug!(
        client_random = %hex::encode(client_random),
        server_random = %hex::encode(server_random),
        "deriving RC4 session keys"
    );

    let block = key_block(master_secret, client_random, server_random);
    let client_to_server = final_hash(&block[16..32], client_random, server_random);
    let server_to_client = final_hash(&block[32..48], client_random, server_random);

    SessionKeys {
        client_to_server,
        server_to_client,
    }
}

mod hex {
    pub(crate) fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|byte| format!("{byte:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rc4_matches_known_test_vector() {
        let mut cipher = Rc4::new(b"Key");
        let output = cipher.process(b"Plaintext");
        assert_eq!(output, [0xBB, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3]);
    }

    #[test]
    fn rc4_decrypt_is_inverse_of_encrypt() {
        let message = b"the quick brown fox";
        let mut encryptor = Rc4::new(b"session-key");
        let ciphertext = encryptor.process(message);

        let mut decryptor = Rc4::new(b"session-key");
        let plaintext = decryptor.process(&ciphertext);
        assert_eq!(plaintext, message);
    }

    #[test]
    fn session_keys_differ_by_direction() {
        let master_secret = [0x11u8; 48];
        let client_random = [0x22u8; 32];
        let server_random = [0x33u8; 32];

        let keys = derive_session_keys(&master_secret, &client_random, &server_random);
        assert_ne!(keys.client_to_server, keys.server_to_client);
    }

    #[test]
    fn session_keys_are_deterministic() {
        let master_secret = [0xAAu8; 48];
        let client_random = [0xBBu8; 32];
        let server_random = [0xCCu8; 32];

        let first = derive_session_keys(&master_secret, &client_random, &server_random);
        let second = derive_session_keys(&master_secret, &client_random, &server_random);
        assert_eq!(first.client_to_server, second.client_to_server);
        assert_eq!(first.server_to_client, second.server_to_client);
    }
}
