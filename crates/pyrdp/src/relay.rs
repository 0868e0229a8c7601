//! The accept loop tying the session state machine, MITM observer, protocol
//! channel handlers, and recorder together: terminates each client's TCP
//! connection, opens a matching one to the configured target server, and
//! relays frames between them while tapping every frame this proxy can
//! decode along the way. Decoding is always best-effort: a frame this relay
//! can't parse is still forwarded unchanged, since transparent relaying is
//! the one behavior a MITM proxy can never drop.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use pyrdp_cliprdr::ClipboardPdu;
use pyrdp_core::ReadCursor;
use pyrdp_mitm::MitmSession;
use pyrdp_pdu::fastpath::{FastPathInputEvent, FastPathInputHeader, FastPathUpdateHeader, FastPathUpdatePdu};
use pyrdp_pdu::mcs::{ConnectInitial, ConnectResponse, DomainParameters, SendDataIndication, SendDataRequest};
use pyrdp_pdu::slowpath::ShareControlHeader;
use pyrdp_pdu::tpkt::TpktHeader;
use pyrdp_pdu::x224::{TpduCode, TpduHeader};
use pyrdp_pdu::{Decode, PduResult};
use pyrdp_rdpdr::RdpdrPdu;
use pyrdp_recording::{FileSink, MessageType, Recorder};
use pyrdp_svc::ChunkAssembler;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::framing::{self, Frame, FrameKind};

/// `MessageType::Other` code this proxy registers for rdpdr traffic; rdpdr
/// has no built-in variant since only clipboard and slow/fast-path
/// input/output are common enough to warrant one.
const MESSAGE_TYPE_RDPDR: u16 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ClientToServer,
    ServerToClient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelKind {
    Clipboard,
    DeviceRedirection,
    Unknown,
}

/// State shared by both relay directions of one connection: the MITM
/// observer (fed from both client input and server capability exchanges)
/// and the virtual-channel identities this proxy has sniffed out so far.
struct SharedObservation {
    mitm: MitmSession,
    channel_kinds: BTreeMap<u16, ChannelKind>,
}

impl SharedObservation {
    fn new() -> Self {
        Self {
            mitm: MitmSession::new(),
            channel_kinds: BTreeMap::new(),
        }
    }
}

/// Binds `config.bind_address` and accepts connections forever, spawning one
/// relay task per client. A single connection's failure never brings the
/// listener down, the way a server accept loop tolerates a bad peer.
pub async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_address).await?;
    tracing::info!(bind = %config.bind_address, target = %config.target_address, "pyrdp proxy listening");
    let config = Arc::new(config);

    loop {
        let (client, peer) = listener.accept().await?;
        let config = config.clone();
        let span = tracing::info_span!("mitm_session", %peer);
        tokio::spawn(
            async move {
                if let Err(err) = handle_connection(client, peer, config).await {
                    tracing::warn!(%err, "session ended with an error");
                }
            }
            .instrument(span),
        );
    }
}

async fn handle_connection(client: TcpStream, peer: SocketAddr, config: Arc<ProxyConfig>) -> anyhow::Result<()> {
    tracing::info!("client connected");

    let server = TcpStream::connect(config.target_address).await?;
    tracing::info!(target = %config.target_address, "connected to target server");

    let (client_read, client_write) = client.into_split();
    let (server_read, server_write) = server.into_split();

    let shared = Arc::new(Mutex::new(SharedObservation::new()));
    let recorder = Arc::new(Mutex::new(build_recorder(&config, peer)));

    let client_to_server = relay_direction(
        BufReader::new(client_read),
        server_write,
        Direction::ClientToServer,
        shared.clone(),
        recorder.clone(),
    );
    let server_to_client = relay_direction(BufReader::new(server_read), client_write, Direction::ServerToClient, shared, recorder.clone());

    tokio::select! {
        result = client_to_server => log_direction_end("client to server", result),
        result = server_to_client => log_direction_end("server to client", result),
    }

    recorder.lock().await.finalize();
    tracing::info!("session ended");
    Ok(())
}

fn log_direction_end(direction: &str, result: std::io::Result<()>) {
    if let Err(err) = result {
        tracing::debug!(direction, %err, "relay direction ended");
    }
}

fn build_recorder(config: &ProxyConfig, peer: SocketAddr) -> Recorder {
    let mut recorder = Recorder::new();
    let path = config.recording_directory.join(format!("{peer}.pyrdp"));
    recorder.add_sink(Box::new(FileSink::new(path)));
    recorder
}

async fn relay_direction(
    mut reader: impl AsyncBufRead + Unpin,
    mut writer: impl AsyncWrite + Unpin,
    direction: Direction,
    shared: Arc<Mutex<SharedObservation>>,
    recorder: Arc<Mutex<Recorder>>,
) -> std::io::Result<()> {
    let mut assemblers: BTreeMap<u16, ChunkAssembler> = BTreeMap::new();

    while let Some(frame) = framing::read_frame(&mut reader).await? {
        inspect_frame(&frame, direction, &shared, &recorder, &mut assemblers).await;
        writer.write_all(&frame.bytes).await?;
    }

    writer.flush().await?;
    Ok(())
}

async fn inspect_frame(
    frame: &Frame,
    direction: Direction,
    shared: &Arc<Mutex<SharedObservation>>,
    recorder: &Arc<Mutex<Recorder>>,
    assemblers: &mut BTreeMap<u16, ChunkAssembler>,
) {
    let result = match frame.kind {
        FrameKind::FastPath => inspect_fast_path(&frame.bytes, direction, shared, recorder).await,
        FrameKind::SlowPath => inspect_slow_path(&frame.bytes, direction, shared, recorder, assemblers).await,
    };

    if let Err(err) = result {
        tracing::trace!(%err, ?direction, "could not decode frame for observation, relaying unchanged");
    }
}

async fn inspect_fast_path(bytes: &[u8], direction: Direction, shared: &Arc<Mutex<SharedObservation>>, recorder: &Arc<Mutex<Recorder>>) -> PduResult<()> {
    let mut cursor = ReadCursor::new(bytes);

    match direction {
        Direction::ClientToServer => {
            let header = FastPathInputHeader::decode(&mut cursor)?;
            let body = cursor.remaining();
            recorder.lock().await.record_bytes(MessageType::FastPathInput, body);

            let mut event_cursor = ReadCursor::new(body);
            let mut session = shared.lock().await;
            for _ in 0..header.num_events {
                let event = FastPathInputEvent::decode(&mut event_cursor)?;
                session.mitm.on_fast_path_input(&event);
            }
        }
        Direction::ServerToClient => {
            // The outer length-only framing header is stripped here; only
            // the inner update PDU bytes are recorded.
            let _header = FastPathUpdateHeader::decode(&mut cursor)?;
            let body = cursor.remaining();
            recorder.lock().await.record_bytes(MessageType::FastPathOutput, body);

            if let Ok(update) = FastPathUpdatePdu::decode(&mut ReadCursor::new(body)) {
                tracing::trace!(update_code = ?update.update_code, "fast-path output update");
            }
        }
    }

    Ok(())
}

async fn inspect_slow_path(
    bytes: &[u8],
    direction: Direction,
    shared: &Arc<Mutex<SharedObservation>>,
    recorder: &Arc<Mutex<Recorder>>,
    assemblers: &mut BTreeMap<u16, ChunkAssembler>,
) -> PduResult<()> {
    let mut cursor = ReadCursor::new(bytes);
    let _tpkt = TpktHeader::decode(&mut cursor)?;
    let tpdu = TpduHeader::read(&mut cursor)?;
    if tpdu.code != TpduCode::DATA {
        return Ok(());
    }

    // Before any MCS domain is up, the first X.224 data TPDU each way
    // carries the GCC Connect-Initial/Connect-Response exchange instead of
    // a domain MCS PDU; try that first since both are self-tagged and safe
    // to probe without consuming `cursor` on failure.
    let mut probe = ReadCursor::new(cursor.remaining());
    match direction {
        Direction::ClientToServer => {
            if let Ok(connect_initial) = ConnectInitial::decode(&mut probe) {
                log_connect_initial(&connect_initial);
                return Ok(());
            }
        }
        Direction::ServerToClient => {
            if let Ok(connect_response) = ConnectResponse::decode(&mut probe) {
                tracing::debug!(max_channel_ids = connect_response.domain_parameters.max_channel_ids, "connect-response");
                return Ok(());
            }
        }
    }

    let (initiator_id, channel_id, user_data) = match direction {
        Direction::ClientToServer => {
            let pdu = SendDataRequest::decode(&mut cursor)?;
            (pdu.initiator_id, pdu.channel_id, pdu.user_data)
        }
        Direction::ServerToClient => {
            let pdu = SendDataIndication::decode(&mut cursor)?;
            (pdu.initiator_id, pdu.channel_id, pdu.user_data)
        }
    };

    inspect_send_data(initiator_id, channel_id, &user_data, direction, shared, recorder, assemblers).await
}

fn log_connect_initial(connect_initial: &ConnectInitial) {
    let negotiated = DomainParameters::downgrade(
        &connect_initial.target_parameters,
        &connect_initial.min_parameters,
        &connect_initial.max_parameters,
    );
    tracing::debug!(
        max_channel_ids = negotiated.max_channel_ids,
        max_user_ids = negotiated.max_user_ids,
        "connect-initial"
    );
}

/// The MCS I/O channel always shares its wire id with the sending user's own
/// channel (`[MS-RDPBCGR] 2.2.1.8`), so `channel_id == initiator_id`
/// identifies share-control (slow-path) traffic without needing to parse the
/// opaque GCC channel list; any other id is a static virtual channel.
#[allow(clippy::too_many_arguments)]
async fn inspect_send_data(
    initiator_id: u16,
    channel_id: u16,
    user_data: &[u8],
    direction: Direction,
    shared: &Arc<Mutex<SharedObservation>>,
    recorder: &Arc<Mutex<Recorder>>,
    assemblers: &mut BTreeMap<u16, ChunkAssembler>,
) -> PduResult<()> {
    if channel_id == initiator_id {
        let header = ShareControlHeader::decode(&mut ReadCursor::new(user_data))?;
        recorder.lock().await.record_bytes(MessageType::SlowPathPdu, user_data);
        shared.lock().await.mitm.on_share_control(&header.pdu);
        return Ok(());
    }

    let assembler = assemblers.entry(channel_id).or_default();
    let Some(payload) = assembler.push(user_data)? else {
        return Ok(());
    };

    let already_known = shared.lock().await.channel_kinds.get(&channel_id).copied();
    let kind = match already_known {
        Some(kind) => kind,
        None => {
            let sniffed = sniff_channel_kind(&payload);
            shared.lock().await.channel_kinds.insert(channel_id, sniffed);
            sniffed
        }
    };

    match kind {
        ChannelKind::Clipboard => recorder.lock().await.record_bytes(MessageType::ClipboardData, &payload),
        ChannelKind::DeviceRedirection => recorder.lock().await.record_bytes(MessageType::Other(MESSAGE_TYPE_RDPDR), &payload),
        ChannelKind::Unknown => {
            tracing::trace!(channel_id, ?direction, "unrecognized virtual channel payload, relaying without recording");
        }
    }

    Ok(())
}

fn sniff_channel_kind(payload: &[u8]) -> ChannelKind {
    if ClipboardPdu::decode(&mut ReadCursor::new(payload)).is_ok() {
        ChannelKind::Clipboard
    } else if RdpdrPdu::decode(&mut ReadCursor::new(payload)).is_ok() {
        ChannelKind::DeviceRedirection
    } else {
        ChannelKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_channel_kind_recognizes_clipboard_monitor_ready() {
        // MonitorReady: msgType 0x0001, msgFlags 0x0000, dataLen 0x0000_0000.
        let payload = [0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        assert_eq!(sniff_channel_kind(&payload), ChannelKind::Clipboard);
    }

    #[test]
    fn sniff_channel_kind_falls_back_to_unknown_for_garbage() {
        let payload = [0xFF; 3];
        assert_eq!(sniff_channel_kind(&payload), ChannelKind::Unknown);
    }
}
