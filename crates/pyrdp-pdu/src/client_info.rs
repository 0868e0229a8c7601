//! `TS_INFO_PACKET` (`[MS-RDPBCGR] 2.2.1.11.1.1`), sent by the client right
//! after the security layer is established. This is where cleartext
//! credentials travel when the server accepts RDP Standard Security or
//! CredSSP has already authenticated the transport, which makes this PDU a
//! primary tap point for the credential-capture story described in the
//! recorder.
//!
//! A handful of optional trailing fields (session id, performance flags,
//! auto-reconnect cookie, timezone) were added across RDP versions; an
//! older client simply omits them, so decoding stops tolerantly at the
//! first field that runs out of bytes instead of failing the whole PDU.

use core::fmt;

use crate::{invalid_field_err, Decode, Encode, Pdu, PduResult};
use pyrdp_core::{ReadCursor, WriteCursor};

const RECONNECT_COOKIE_LEN: usize = 28;
const TIMEZONE_NAME_LEN: usize = 64;
const COMPRESSION_TYPE_MASK: u32 = 0x0000_1E00;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClientInfoFlags: u32 {
        const MOUSE = 0x0000_0001;
        const DISABLE_CTRL_ALT_DEL = 0x0000_0002;
        const AUTOLOGON = 0x0000_0008;
        const UNICODE = 0x0000_0010;
        const MAXIMIZE_SHELL = 0x0000_0020;
        const LOGON_NOTIFY = 0x0000_0040;
        const COMPRESSION = 0x0000_0080;
        const ENABLE_WINDOWS_KEY = 0x0000_0100;
        const REMOTE_CONSOLE_AUDIO = 0x0000_2000;
        const FORCE_ENCRYPTED_CS_PDU = 0x0000_4000;
        const RAIL = 0x0000_8000;
        const LOGON_ERRORS = 0x0001_0000;
        const MOUSE_HAS_WHEEL = 0x0002_0000;
        const PASSWORD_IS_SC_PIN = 0x0004_0000;
        const NO_AUDIO_PLAYBACK = 0x0008_0000;
        const USING_SAVED_CREDS = 0x0010_0000;
        const AUDIO_CAPTURE = 0x0020_0000;
        const VIDEO_DISABLE = 0x0040_0000;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionType {
    K8,
    K64,
    Rdp6,
    Rdp61,
}

impl CompressionType {
    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::K8),
            1 => Some(Self::K64),
            2 => Some(Self::Rdp6),
            3 => Some(Self::Rdp61),
            _ => None,
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            Self::K8 => 0,
            Self::K64 => 1,
            Self::Rdp6 => 2,
            Self::Rdp61 => 3,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("domain", &self.domain)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub credentials: Credentials,
    pub code_page: u32,
    pub flags: ClientInfoFlags,
    pub compression_type: CompressionType,
    pub alternate_shell: String,
    pub work_dir: String,
    pub extra_info: ExtendedClientInfo,
}

impl Pdu for ClientInfo {
    const NAME: &'static str = "ClientInfo";
}

fn unicode(flags: ClientInfoFlags) -> bool {
    flags.contains(ClientInfoFlags::UNICODE)
}

fn string_byte_len(value: &str, unicode: bool) -> u16 {
    if unicode {
        u16::try_from(value.encode_utf16().count() * 2).unwrap_or(u16::MAX)
    } else {
        u16::try_from(value.len()).unwrap_or(u16::MAX)
    }
}

fn encode_string(value: &str, unicode: bool) -> Vec<u8> {
    if unicode {
        value.encode_utf16().flat_map(u16::to_le_bytes).collect()
    } else {
        value.as_bytes().to_vec()
    }
}

fn decode_string(bytes: &[u8], unicode: bool) -> String {
    if unicode {
        let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

/// Reads a string whose advertised size excludes the mandatory null
/// terminator, then consumes that terminator.
fn read_string_excl_terminator(src: &mut ReadCursor<'_>, byte_len: usize, unicode: bool) -> PduResult<String> {
    let content = src.try_read_slice(ClientInfo::NAME, byte_len)?;
    let term_len = if unicode { 2 } else { 1 };
    src.try_read_slice(ClientInfo::NAME, term_len)?;
    Ok(decode_string(content, unicode))
}

fn write_string_excl_terminator(dst: &mut WriteCursor<'_>, value: &str, unicode: bool) {
    dst.write_slice(&encode_string(value, unicode));
    if unicode {
        dst.write_u16(0);
    } else {
        dst.write_u8(0);
    }
}

/// Reads a string whose advertised size includes the null terminator.
fn read_string_incl_terminator(src: &mut ReadCursor<'_>, byte_len: usize, unicode: bool) -> PduResult<String> {
    if byte_len == 0 {
        return Ok(String::new());
    }
    let term_len = if unicode { 2 } else { 1 };
    let content_len = byte_len.saturating_sub(term_len);
    let content = src.try_read_slice(ClientInfo::NAME, content_len)?;
    src.try_read_slice(ClientInfo::NAME, byte_len - content_len)?;
    Ok(decode_string(content, unicode))
}

fn write_string_incl_terminator(dst: &mut WriteCursor<'_>, value: &str, unicode: bool) {
    write_string_excl_terminator(dst, value, unicode);
}

impl Encode for ClientInfo {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        let unicode = unicode(self.flags);

        dst.write_u32(self.code_page);
        let flags_with_compression = self.flags.bits() | (u32::from(self.compression_type.to_u8()) << 9);
        dst.write_u32(flags_with_compression & !COMPRESSION_TYPE_MASK | flags_with_compression & COMPRESSION_TYPE_MASK);

        let domain = self.credentials.domain.clone().unwrap_or_default();
        dst.write_u16(string_byte_len(&domain, unicode));
        dst.write_u16(string_byte_len(&self.credentials.username, unicode));
        dst.write_u16(string_byte_len(&self.credentials.password, unicode));
        dst.write_u16(string_byte_len(&self.alternate_shell, unicode));
        dst.write_u16(string_byte_len(&self.work_dir, unicode));

        write_string_excl_terminator(dst, &domain, unicode);
        write_string_excl_terminator(dst, &self.credentials.username, unicode);
        write_string_excl_terminator(dst, &self.credentials.password, unicode);
        write_string_excl_terminator(dst, &self.alternate_shell, unicode);
        write_string_excl_terminator(dst, &self.work_dir, unicode);

        self.extra_info.encode(dst, unicode)?;

        Ok(())
    }

    fn size(&self) -> usize {
        let unicode = unicode(self.flags);
        let domain = self.credentials.domain.clone().unwrap_or_default();
        let term = if unicode { 2 } else { 1 };

        4 + 4
            + 2 * 5
            + usize::from(string_byte_len(&domain, unicode)) + term
            + usize::from(string_byte_len(&self.credentials.username, unicode)) + term
            + usize::from(string_byte_len(&self.credentials.password, unicode)) + term
            + usize::from(string_byte_len(&self.alternate_shell, unicode)) + term
            + usize::from(string_byte_len(&self.work_dir, unicode)) + term
            + self.extra_info.size(unicode)
    }
}

impl<'de> Decode<'de> for ClientInfo {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let code_page = src.try_read_u32(Self::NAME)?;
        let flags_with_compression = src.try_read_u32(Self::NAME)?;

        let flags = ClientInfoFlags::from_bits_truncate(flags_with_compression & !COMPRESSION_TYPE_MASK);
        let compression_type = CompressionType::from_u8(((flags_with_compression & COMPRESSION_TYPE_MASK) >> 9) as u8)
            .ok_or_else(|| invalid_field_err!(Self::NAME, "compressionType", "unknown compression type"))?;
        let unicode = unicode(flags);

        let domain_size = usize::from(src.try_read_u16(Self::NAME)?);
        let user_name_size = usize::from(src.try_read_u16(Self::NAME)?);
        let password_size = usize::from(src.try_read_u16(Self::NAME)?);
        let alternate_shell_size = usize::from(src.try_read_u16(Self::NAME)?);
        let work_dir_size = usize::from(src.try_read_u16(Self::NAME)?);

        let domain = read_string_excl_terminator(src, domain_size, unicode)?;
        let username = read_string_excl_terminator(src, user_name_size, unicode)?;
        let password = read_string_excl_terminator(src, password_size, unicode)?;
        let domain = if domain.is_empty() { None } else { Some(domain) };
        let credentials = Credentials { username, password, domain };

        let alternate_shell = read_string_excl_terminator(src, alternate_shell_size, unicode)?;
        let work_dir = read_string_excl_terminator(src, work_dir_size, unicode)?;

        let extra_info = ExtendedClientInfo::decode(src, unicode)?;

        Ok(Self {
            credentials,
            code_page,
            flags,
            compression_type,
            alternate_shell,
            work_dir,
            extra_info,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AddressFamily {
    INet,
    INet6,
}

impl AddressFamily {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0002 => Some(Self::INet),
            0x0017 => Some(Self::INet6),
            _ => None,
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            Self::INet => 0x0002,
            Self::INet6 => 0x0017,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PerformanceFlags: u32 {
        const DISABLE_WALLPAPER = 0x0000_0001;
        const DISABLE_FULLWINDOWDRAG = 0x0000_0002;
        const DISABLE_MENUANIMATIONS = 0x0000_0004;
        const DISABLE_THEMING = 0x0000_0008;
        const DISABLE_CURSOR_SHADOW = 0x0000_0020;
        const DISABLE_CURSORSETTINGS = 0x0000_0040;
        const ENABLE_FONT_SMOOTHING = 0x0000_0080;
        const ENABLE_DESKTOP_COMPOSITION = 0x0000_0100;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExtendedClientOptionalInfo {
    pub timezone_bias: Option<u32>,
    pub session_id: Option<u32>,
    pub performance_flags: Option<PerformanceFlags>,
    pub reconnect_cookie: Option<[u8; RECONNECT_COOKIE_LEN]>,
}

impl ExtendedClientOptionalInfo {
    fn decode(src: &mut ReadCursor<'_>) -> Self {
        let mut info = Self::default();

        // Timezone block: bias(4) + 2 * (64-byte name + 16-byte date) + 2 * bias(4).
        // Only the primary bias is kept; the rest is skipped verbatim.
        let timezone_block_len = 4 + 2 * (TIMEZONE_NAME_LEN + 16) + 4;
        if src.len() < timezone_block_len {
            return info;
        }
        let bias = src.read_u32();
        src.advance(timezone_block_len - 4);
        info.timezone_bias = Some(bias);

        if src.len() < 4 {
            return info;
        }
        info.session_id = Some(src.read_u32());

        if src.len() < 4 {
            return info;
        }
        info.performance_flags = Some(PerformanceFlags::from_bits_truncate(src.read_u32()));

        if src.len() < 2 {
            return info;
        }
        let reconnect_cookie_size = usize::from(src.read_u16());
        if reconnect_cookie_size != RECONNECT_COOKIE_LEN || src.len() < RECONNECT_COOKIE_LEN {
            return info;
        }
        let mut cookie = [0u8; RECONNECT_COOKIE_LEN];
        cookie.copy_from_slice(src.read_slice(RECONNECT_COOKIE_LEN));
        info.reconnect_cookie = Some(cookie);

        if src.len() >= 4 {
            src.advance(4); // reserved1, reserved2
        }

        info
    }

    fn encode(&self, dst: &mut WriteCursor<'_>) {
        if let Some(bias) = self.timezone_bias {
            dst.write_u32(bias);
            dst.write_slice(&[0u8; TIMEZONE_NAME_LEN]);
            dst.write_slice(&[0u8; 16]);
            dst.write_u32(0); // standard_bias
            dst.write_slice(&[0u8; TIMEZONE_NAME_LEN]);
            dst.write_slice(&[0u8; 16]);
            dst.write_u32(0); // daylight_bias
        }
        if let Some(session_id) = self.session_id {
            dst.write_u32(session_id);
        }
        if let Some(flags) = self.performance_flags {
            dst.write_u32(flags.bits());
        }
        if let Some(cookie) = self.reconnect_cookie {
            dst.write_u16(RECONNECT_COOKIE_LEN as u16);
            dst.write_slice(&cookie);
            dst.write_u16(0);
            dst.write_u16(0);
        }
    }

    fn size(&self) -> usize {
        let mut size = 0;
        if self.timezone_bias.is_some() {
            size += 4 + 2 * (TIMEZONE_NAME_LEN + 16) + 4;
        }
        if self.session_id.is_some() {
            size += 4;
        }
        if self.performance_flags.is_some() {
            size += 4;
        }
        if self.reconnect_cookie.is_some() {
            size += 2 + RECONNECT_COOKIE_LEN + 4;
        }
        size
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedClientInfo {
    pub address_family: AddressFamily,
    pub address: String,
    pub dir: String,
    pub optional_data: ExtendedClientOptionalInfo,
}

impl ExtendedClientInfo {
    fn decode(src: &mut ReadCursor<'_>, unicode: bool) -> PduResult<Self> {
        let address_family = AddressFamily::from_u16(src.try_read_u16(ClientInfo::NAME)?)
            .ok_or_else(|| invalid_field_err!(ClientInfo::NAME, "addressFamily", "unknown address family"))?;

        let address_size = usize::from(src.try_read_u16(ClientInfo::NAME)?);
        let address = read_string_incl_terminator(src, address_size, unicode)?;

        let dir_size = usize::from(src.try_read_u16(ClientInfo::NAME)?);
        let dir = read_string_incl_terminator(src, dir_size, unicode)?;

        let optional_data = ExtendedClientOptionalInfo::decode(src);

        Ok(Self {
            address_family,
            address,
            dir,
            optional_data,
        })
    }

    fn encode(&self, dst: &mut WriteCursor<'_>, unicode: bool) -> PduResult<()> {
        dst.write_u16(self.address_family.to_u16());

        let term = if unicode { 2 } else { 1 };
        dst.write_u16(string_byte_len(&self.address, unicode) + term as u16);
        write_string_incl_terminator(dst, &self.address, unicode);

        dst.write_u16(string_byte_len(&self.dir, unicode) + term as u16);
        write_string_incl_terminator(dst, &self.dir, unicode);

        self.optional_data.encode(dst);

        Ok(())
    }

    fn size(&self, unicode: bool) -> usize {
        let term = if unicode { 2 } else { 1 };
        2 + 2
            + usize::from(string_byte_len(&self.address, unicode))
            + term
            + 2
            + usize::from(string_byte_len(&self.dir, unicode))
            + term
            + self.optional_data.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClientInfo {
        ClientInfo {
            credentials: Credentials {
                username: "alice".into(),
                password: "hunter2".into(),
                domain: Some("CORP".into()),
            },
            code_page: 0,
            flags: ClientInfoFlags::UNICODE | ClientInfoFlags::MOUSE,
            compression_type: CompressionType::K8,
            alternate_shell: String::new(),
            work_dir: String::new(),
            extra_info: ExtendedClientInfo {
                address_family: AddressFamily::INet,
                address: "10.0.0.5".into(),
                dir: "C:\\".into(),
                optional_data: ExtendedClientOptionalInfo::default(),
            },
        }
    }

    #[test]
    fn round_trips_unicode_credentials() {
        let info = sample();
        let mut buf = vec![0u8; info.size()];
        {
            let mut dst = WriteCursor::new(&mut buf);
            info.encode(&mut dst).unwrap();
        }
        let mut src = ReadCursor::new(&buf);
        let decoded = ClientInfo::decode(&mut src).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn tolerates_missing_optional_tail() {
        let mut info = sample();
        info.extra_info.optional_data.session_id = Some(42);
        let mut buf = vec![0u8; info.size()];
        {
            let mut dst = WriteCursor::new(&mut buf);
            info.encode(&mut dst).unwrap();
        }
        // Truncate away everything after the address/dir fields.
        let truncated_len = buf.len() - info.extra_info.optional_data.size();
        let mut src = ReadCursor::new(&buf[..truncated_len]);
        let decoded = ClientInfo::decode(&mut src).unwrap();
        assert!(decoded.extra_info.optional_data.session_id.is_none());
    }
}
