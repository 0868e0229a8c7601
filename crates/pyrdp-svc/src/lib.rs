//! Static virtual channel plumbing shared by the protocol-specific channel
//! crates (`pyrdp-cliprdr`, `pyrdp-rdpdr`): the `CHANNEL_PDU_HEADER` chunk
//! framing every static channel uses, a trait abstracting over a channel's
//! per-PDU behavior, and a `TypeId`-keyed set the MITM session uses to look
//! channels up by the id MCS negotiated for them.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;

use pyrdp_core::{ReadCursor, WriteCursor};
use pyrdp_pdu::{ensure_fixed_part_size, Decode, Encode, Pdu, PduResult};

/// The wire id MCS assigns a joined static virtual channel.
pub type StaticChannelId = u16;

/// MCS user channels start at this id; static virtual channels are the ones
/// requested in `Client Network Data` and are assigned the ids immediately
/// following the I/O channel, starting here.
pub const USERCHANNEL_BASE: StaticChannelId = 1001;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ChannelPduFlags: u32 {
        const FIRST = 0x0000_0001;
        const LAST = 0x0000_0002;
        const SHOW_PROTOCOL = 0x0000_0010;
        const SUSPEND = 0x0000_0020;
        const RESUME = 0x0000_0040;
        const SHADOW_PERSISTENT = 0x0000_0080;
        const COMPRESSED = 0x0020_0000;
        const AT_FRONT = 0x0040_0000;
        const FLUSHED = 0x0080_0000;
    }
}

/// `CHANNEL_PDU_HEADER`, `[MS-RDPBCGR] 2.2.6.1.1`: precedes every chunk of
/// static virtual channel data sent inside an MCS Send Data Indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelPduHeader {
    pub length: u32,
    pub flags: ChannelPduFlags,
}

impl Pdu for ChannelPduHeader {
    const NAME: &'static str = "ChannelPduHeader";
}

impl ChannelPduHeader {
    const FIXED_PART_SIZE: usize = 8;
}

impl Encode for ChannelPduHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);
        dst.write_u32(self.length);
        dst.write_u32(self.flags.bits());
        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for ChannelPduHeader {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);
        let length = src.read_u32();
        let flags = ChannelPduFlags::from_bits_truncate(src.read_u32());
        Ok(Self { length, flags })
    }
}

/// Reassembles a static channel's chunked `CHANNEL_PDU_HEADER`-prefixed
/// fragments back into one logical PDU. Channel data larger than the
/// negotiated `VirtualChannel` chunk size arrives split across several MCS
/// Send Data Indications, each carrying its own header.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    pending: Vec<u8>,
    total_length: Option<u32>,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk (header + body). Returns the reassembled payload once
    /// the chunk carrying [`ChannelPduFlags::LAST`] arrives.
    pub fn push(&mut self, chunk: &[u8]) -> PduResult<Option<Vec<u8>>> {
        let mut src = ReadCursor::new(chunk);
        let header = ChannelPduHeader::decode(&mut src)?;

        if header.flags.contains(ChannelPduFlags::FIRST) {
            self.pending.clear();
            self.total_length = Some(header.length);
        }

        self.pending.extend_from_slice(src.remaining());

        if header.flags.contains(ChannelPduFlags::LAST) {
            self.total_length = None;
            Ok(Some(std::mem::take(&mut self.pending)))
        } else {
            Ok(None)
        }
    }
}

/// Which compression flag a channel's `CHANNEL_DEF` entry should advertise.
/// Mirrors the three options `[MS-RDPBCGR] 2.2.1.3.4.1` allows; this proxy
/// never compresses channel data itself, so every channel it implements
/// reports [`CompressionCondition::Never`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionCondition {
    Never,
    WhenRdpDataIsCompressed,
    Always,
}

/// A static virtual channel handler: processes one reassembled PDU of
/// channel data at a time and returns whatever should be relayed onward (the
/// input unchanged for a pure pass-through channel, a rewritten payload for
/// one that inspects or mutates traffic).
pub trait StaticVirtualChannel: AsAny + fmt::Debug + Send {
    fn channel_name(&self) -> &'static str;

    fn compression_condition(&self) -> CompressionCondition {
        CompressionCondition::Never
    }

    fn process(&mut self, channel_id: StaticChannelId, payload: &[u8]) -> PduResult<Vec<u8>>;
}

pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: StaticVirtualChannel + 'static> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The set of static virtual channels negotiated for a session, keyed both
/// by concrete type and by the wire channel id MCS assigned once the
/// `Channel Join Confirm` sequence completed.
#[derive(Default)]
pub struct StaticChannelSet {
    channels: BTreeMap<TypeId, Box<dyn StaticVirtualChannel>>,
    to_channel_id: BTreeMap<TypeId, StaticChannelId>,
    to_type_id: BTreeMap<StaticChannelId, TypeId>,
}

impl fmt::Debug for StaticChannelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticChannelSet")
            .field("channels", &self.channels.len())
            .finish()
    }
}

impl StaticChannelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: StaticVirtualChannel + 'static>(&mut self, channel: T) {
        self.channels.insert(TypeId::of::<T>(), Box::new(channel));
    }

    pub fn attach_channel_id<T: StaticVirtualChannel + 'static>(&mut self, channel_id: StaticChannelId) {
        let type_id = TypeId::of::<T>();
        self.to_channel_id.insert(type_id, channel_id);
        self.to_type_id.insert(channel_id, type_id);
    }

    pub fn get_by_type<T: StaticVirtualChannel + 'static>(&self) -> Option<&T> {
        self.channels.get(&TypeId::of::<T>())?.as_any().downcast_ref()
    }

    pub fn get_by_channel_id_mut(&mut self, channel_id: StaticChannelId) -> Option<&mut dyn StaticVirtualChannel> {
        let type_id = *self.to_type_id.get(&channel_id)?;
        self.channels.get_mut(&type_id).map(|boxed| boxed.as_mut())
    }

    pub fn channel_id_by_name(&self, name: &str) -> Option<StaticChannelId> {
        self.channels
            .iter()
            .find(|(_, channel)| channel.channel_name() == name)
            .and_then(|(type_id, _)| self.to_channel_id.get(type_id).copied())
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = StaticChannelId> + '_ {
        self.to_channel_id.values().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct EchoChannel;

    impl StaticVirtualChannel for EchoChannel {
        fn channel_name(&self) -> &'static str {
            "cliprdr"
        }

        fn process(&mut self, _channel_id: StaticChannelId, payload: &[u8]) -> PduResult<Vec<u8>> {
            Ok(payload.to_vec())
        }
    }

    #[test]
    fn channel_pdu_header_round_trips() {
        let header = ChannelPduHeader {
            length: 42,
            flags: ChannelPduFlags::FIRST | ChannelPduFlags::LAST,
        };
        let mut buf = vec![0u8; header.size()];
        header.encode(&mut WriteCursor::new(&mut buf)).unwrap();
        assert_eq!(ChannelPduHeader::decode(&mut ReadCursor::new(&buf)).unwrap(), header);
    }

    #[test]
    fn chunk_assembler_reassembles_split_payload() {
        let mut assembler = ChunkAssembler::new();

        let mut first = vec![0u8; 8 + 3];
        ChannelPduHeader {
            length: 6,
            flags: ChannelPduFlags::FIRST,
        }
        .encode(&mut WriteCursor::new(&mut first))
        .unwrap();
        first[8..].copy_from_slice(b"abc");

        let mut last = vec![0u8; 8 + 3];
        ChannelPduHeader {
            length: 6,
            flags: ChannelPduFlags::LAST,
        }
        .encode(&mut WriteCursor::new(&mut last))
        .unwrap();
        last[8..].copy_from_slice(b"def");

        assert_eq!(assembler.push(&first).unwrap(), None);
        assert_eq!(assembler.push(&last).unwrap(), Some(b"abcdef".to_vec()));
    }

    #[test]
    fn channel_set_resolves_by_id_after_attach() {
        let mut set = StaticChannelSet::new();
        set.insert(EchoChannel);
        set.attach_channel_id::<EchoChannel>(USERCHANNEL_BASE + 3);

        assert_eq!(set.channel_id_by_name("cliprdr"), Some(USERCHANNEL_BASE + 3));
        let channel = set.get_by_channel_id_mut(USERCHANNEL_BASE + 3).unwrap();
        assert_eq!(channel.process(USERCHANNEL_BASE + 3, b"hi").unwrap(), b"hi");
    }
}
