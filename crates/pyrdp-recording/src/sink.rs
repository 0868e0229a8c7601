//! Recording transports. A [`Sink`] only ever sees already-framed bytes —
//! it has no idea what a `messageType` or a PDU is, which is what lets
//! [`ChannelSink`] reuse exactly the same interface a file does.

use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Bytes accumulated before [`FileSink`] will create its output file.
/// Below this, a short-lived probe connection that never sends anything
/// interesting leaves no trace on disk.
pub const FLUSH_THRESHOLD: usize = 18;

pub trait Sink: Send {
    /// Accepts one already-encoded frame (or any other byte blob the
    /// caller wants recorded verbatim).
    fn write(&mut self, bytes: &[u8]);

    /// Flushes and closes this sink. Called once, at the end of a session.
    fn finalize(&mut self);
}

/// Buffers output until [`FLUSH_THRESHOLD`] bytes have accumulated, then
/// opens `path` (sanitizing `:` to `_`, since recording paths are often
/// built from a timestamp) and streams directly from then on.
pub struct FileSink {
    path: PathBuf,
    pending: Vec<u8>,
    file: Option<File>,
}

fn sanitize_path(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().replace(':', "_"))
}

impl FileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: sanitize_path(path.as_ref()),
            pending: Vec::new(),
            file: None,
        }
    }

    fn open_and_flush(&mut self) {
        match File::create(&self.path) {
            Ok(mut file) => {
                if let Err(err) = file.write_all(&self.pending) {
                    tracing::warn!(%err, path = %self.path.display(), "failed to flush buffered recording to disk");
                }
                self.pending.clear();
                self.file = Some(file);
            }
            Err(err) => {
                tracing::warn!(%err, path = %self.path.display(), "failed to create recording file");
            }
        }
    }
}

impl Sink for FileSink {
    fn write(&mut self, bytes: &[u8]) {
        if let Some(file) = &mut self.file {
            if let Err(err) = file.write_all(bytes) {
                tracing::warn!(%err, path = %self.path.display(), "failed to write recording frame");
            }
            return;
        }

        self.pending.extend_from_slice(bytes);
        if self.pending.len() >= FLUSH_THRESHOLD {
            self.open_and_flush();
        }
    }

    fn finalize(&mut self) {
        if let Some(file) = &mut self.file {
            let _ = file.flush();
        }
    }
}

/// Streams recorded frames to an in-process consumer (e.g. a live
/// attacker console) instead of disk. Send failures (receiver dropped)
/// are logged, never propagated — recording must never take down a
/// session.
pub struct ChannelSink {
    sender: tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
}

impl ChannelSink {
    pub fn new(sender: tokio::sync::mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self { sender }
    }
}

impl Sink for ChannelSink {
    fn write(&mut self, bytes: &[u8]) {
        if self.sender.send(bytes.to_vec()).is_err() {
            tracing::debug!("recording channel sink has no live receiver, dropping frame");
        }
    }

    fn finalize(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pyrdp-recording-test-{name}-{}", std::process::id()))
    }

    #[test]
    fn file_is_not_created_below_flush_threshold() {
        let path = temp_path("below");
        let _ = std::fs::remove_file(&path);
        let mut sink = FileSink::new(&path);

        sink.write(&[0u8; 6]);
        sink.write(&[0u8; 6]);

        assert!(!path.exists());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn file_is_created_once_threshold_reached() {
        let path = temp_path("reached");
        let _ = std::fs::remove_file(&path);
        let mut sink = FileSink::new(&path);

        sink.write(&[0u8; 6]);
        sink.write(&[0u8; 6]);
        sink.write(&[0u8; 6]);

        assert!(path.exists());
        let mut contents = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents.len(), 18);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn bytes_written_after_threshold_stream_directly() {
        let path = temp_path("stream");
        let _ = std::fs::remove_file(&path);
        let mut sink = FileSink::new(&path);

        sink.write(&[0u8; 20]);
        sink.write(&[1u8; 4]);
        sink.finalize();

        let mut contents = Vec::new();
        File::open(&path).unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(contents.len(), 24);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn colon_in_path_is_sanitized() {
        let sink = FileSink::new("/tmp/2026-07-30T12:00:00.pyrdp");
        assert!(!sink.path.to_string_lossy().contains(':'));
    }
}
