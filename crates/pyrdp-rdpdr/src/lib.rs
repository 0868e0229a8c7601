//! Device redirection virtual channel (`rdpdr`), `[MS-RDPEFS]`. This proxy
//! only needs to recognize the shared header every RDPDR PDU carries (so it
//! can log and relay device I/O traffic) rather than modeling every PDU
//! body; device I/O responses carry an [`pyrdp_pdu::nt_status::NtStatus`]
//! this proxy already has a typed representation for.

use pyrdp_core::{ReadCursor, WriteCursor};
use pyrdp_pdu::{ensure_fixed_part_size, invalid_field_err, Decode, Encode, Pdu, PduResult};
use pyrdp_svc::{CompressionCondition, StaticChannelId, StaticVirtualChannel};

/// `RDPDR_HEADER`, `[MS-RDPEFS] 2.2.1.1`: `Component` / `PacketId` pair that
/// prefixes every RDPDR message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RdpdrHeader {
    pub component: Component,
    pub packet_id: PacketId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Core,
    Printer,
    Other(u16),
}

impl Component {
    const RDPDR_CTYP_CORE: u16 = 0x4472;
    const RDPDR_CTYP_PRT: u16 = 0x5052;

    fn from_u16(value: u16) -> Self {
        match value {
            Self::RDPDR_CTYP_CORE => Self::Core,
            Self::RDPDR_CTYP_PRT => Self::Printer,
            other => Self::Other(other),
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            Self::Core => Self::RDPDR_CTYP_CORE,
            Self::Printer => Self::RDPDR_CTYP_PRT,
            Self::Other(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketId {
    ServerAnnounce,
    ClientAnnounceReply,
    ServerClientIdConfirm,
    ServerUserLoggedOn,
    ClientDeviceListAnnounce,
    ServerDeviceAnnounceResponse,
    DeviceIoRequest,
    DeviceIoResponse,
    ClientDeviceListRemove,
    Other(u16),
}

impl PacketId {
    const PAKID_CORE_SERVER_ANNOUNCE: u16 = 0x496E;
    const PAKID_CORE_CLIENTID_CONFIRM: u16 = 0x4343;
    const PAKID_CORE_CLIENT_NAME: u16 = 0x434E;
    const PAKID_CORE_DEVICELIST_ANNOUNCE: u16 = 0x4441;
    const PAKID_CORE_DEVICE_REPLY: u16 = 0x6472;
    const PAKID_CORE_DEVICE_IOREQUEST: u16 = 0x4952;
    const PAKID_CORE_DEVICE_IOCOMPLETION: u16 = 0x4943;
    const PAKID_CORE_DEVICELIST_REMOVE: u16 = 0x444D;
    const PAKID_CORE_USER_LOGGEDON: u16 = 0x554C;

    fn from_u16(value: u16) -> Self {
        match value {
            Self::PAKID_CORE_SERVER_ANNOUNCE => Self::ServerAnnounce,
            Self::PAKID_CORE_CLIENT_NAME => Self::ClientAnnounceReply,
            Self::PAKID_CORE_CLIENTID_CONFIRM => Self::ServerClientIdConfirm,
            Self::PAKID_CORE_USER_LOGGEDON => Self::ServerUserLoggedOn,
            Self::PAKID_CORE_DEVICELIST_ANNOUNCE => Self::ClientDeviceListAnnounce,
            Self::PAKID_CORE_DEVICE_REPLY => Self::ServerDeviceAnnounceResponse,
            Self::PAKID_CORE_DEVICE_IOREQUEST => Self::DeviceIoRequest,
            Self::PAKID_CORE_DEVICE_IOCOMPLETION => Self::DeviceIoResponse,
            Self::PAKID_CORE_DEVICELIST_REMOVE => Self::ClientDeviceListRemove,
            other => Self::Other(other),
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            Self::ServerAnnounce => Self::PAKID_CORE_SERVER_ANNOUNCE,
            Self::ClientAnnounceReply => Self::PAKID_CORE_CLIENT_NAME,
            Self::ServerClientIdConfirm => Self::PAKID_CORE_CLIENTID_CONFIRM,
            Self::ServerUserLoggedOn => Self::PAKID_CORE_USER_LOGGEDON,
            Self::ClientDeviceListAnnounce => Self::PAKID_CORE_DEVICELIST_ANNOUNCE,
            Self::ServerDeviceAnnounceResponse => Self::PAKID_CORE_DEVICE_REPLY,
            Self::DeviceIoRequest => Self::PAKID_CORE_DEVICE_IOREQUEST,
            Self::DeviceIoResponse => Self::PAKID_CORE_DEVICE_IOCOMPLETION,
            Self::ClientDeviceListRemove => Self::PAKID_CORE_DEVICELIST_REMOVE,
            Self::Other(value) => value,
        }
    }
}

impl Pdu for RdpdrHeader {
    const NAME: &'static str = "RdpdrHeader";
}

impl RdpdrHeader {
    const FIXED_PART_SIZE: usize = 4;
}

impl Encode for RdpdrHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);
        dst.write_u16(self.component.to_u16());
        dst.write_u16(self.packet_id.to_u16());
        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for RdpdrHeader {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);
        Ok(Self {
            component: Component::from_u16(src.read_u16()),
            packet_id: PacketId::from_u16(src.read_u16()),
        })
    }
}

/// One RDPDR message: the shared header plus its body kept opaque. Device
/// I/O request/response bodies vary per device type (file system, smart
/// card, port, printer) and this proxy relays them without needing to
/// decode further than the header that tells it what kind of traffic this
/// is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdpdrPdu {
    pub header: RdpdrHeader,
    pub body: Vec<u8>,
}

impl Pdu for RdpdrPdu {
    const NAME: &'static str = "RdpdrPdu";
}

impl Encode for RdpdrPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        crate::ensure_size!(ctx: Self::NAME, in: dst, size: self.size());
        self.header.encode(dst)?;
        dst.write_slice(&self.body);
        Ok(())
    }

    fn size(&self) -> usize {
        self.header.size() + self.body.len()
    }
}

impl<'de> Decode<'de> for RdpdrPdu {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let header = RdpdrHeader::decode(src)?;
        let body = src.read_remaining().to_vec();
        Ok(Self { header, body })
    }
}

/// The `rdpdr` static virtual channel handler. Logs every PDU by component/
/// packet id for observability and relays the payload untouched: rewriting
/// device redirection traffic is out of scope for this proxy, only visibility
/// into it.
#[derive(Debug, Default)]
pub struct DeviceRedirectionChannel;

impl StaticVirtualChannel for DeviceRedirectionChannel {
    fn channel_name(&self) -> &'static str {
        "rdpdr"
    }

    fn compression_condition(&self) -> CompressionCondition {
        CompressionCondition::Never
    }

    fn process(&mut self, channel_id: StaticChannelId, payload: &[u8]) -> PduResult<Vec<u8>> {
        let pdu = RdpdrPdu::decode(&mut ReadCursor::new(payload))
            .map_err(|err| invalid_field_err!(Self::NAME, "payload", "malformed RDPDR PDU").with_source(err))?;

        tracing::debug!(channel_id, component = ?pdu.header.component, packet_id = ?pdu.header.packet_id, "rdpdr PDU");

        let mut buf = vec![0u8; pdu.size()];
        pdu.encode(&mut WriteCursor::new(&mut buf))?;
        Ok(buf)
    }
}

impl DeviceRedirectionChannel {
    const NAME: &'static str = "DeviceRedirectionChannel";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = RdpdrHeader {
            component: Component::Core,
            packet_id: PacketId::DeviceIoRequest,
        };
        let mut buf = vec![0u8; header.size()];
        header.encode(&mut WriteCursor::new(&mut buf)).unwrap();
        assert_eq!(RdpdrHeader::decode(&mut ReadCursor::new(&buf)).unwrap(), header);
    }

    #[test]
    fn unknown_packet_id_round_trips_as_other() {
        let header = RdpdrHeader {
            component: Component::Other(0x1234),
            packet_id: PacketId::Other(0x5678),
        };
        let mut buf = vec![0u8; header.size()];
        header.encode(&mut WriteCursor::new(&mut buf)).unwrap();
        assert_eq!(RdpdrHeader::decode(&mut ReadCursor::new(&buf)).unwrap(), header);
    }

    #[test]
    fn channel_relays_payload_with_status_preserved() {
        use pyrdp_pdu::nt_status::NtStatus;

        let mut body = vec![0u8; 4];
        NtStatus::AccessDenied.encode(&mut WriteCursor::new(&mut body)).unwrap();

        let pdu = RdpdrPdu {
            header: RdpdrHeader {
                component: Component::Core,
                packet_id: PacketId::DeviceIoResponse,
            },
            body,
        };
        let mut buf = vec![0u8; pdu.size()];
        pdu.encode(&mut WriteCursor::new(&mut buf)).unwrap();

        let mut channel = DeviceRedirectionChannel;
        let relayed = channel.process(1002, &buf).unwrap();
        let relayed_pdu = RdpdrPdu::decode(&mut ReadCursor::new(&relayed)).unwrap();
        assert_eq!(relayed_pdu, pdu);
    }
}
