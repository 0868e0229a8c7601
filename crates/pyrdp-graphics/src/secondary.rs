//! Secondary drawing orders (`[MS-RDPEGDI] 2.2.2.2.1.2`): cache-management
//! orders (color table, bitmap, glyph, brush caches) rather than drawing
//! primitives. Unlike primary orders, a secondary order carries its own
//! `orderLength`, so each one is self-delimiting and a decode failure on one
//! order doesn't require guessing where the next order starts.

use pyrdp_core::ReadCursor;
use pyrdp_pdu::{ensure_size, invalid_field_err, PduResult};

use crate::primary::Rgb;

pub(crate) const NAME: &str = "SecondaryOrder";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryOrderType {
    BitmapUncompressed,
    CacheColorTable,
    CacheBitmapCompressed,
    CacheGlyph,
    BitmapUncompressedV2,
    BitmapCompressedV2,
    CacheBrush,
    BitmapCompressedV3,
}

impl SecondaryOrderType {
    fn from_u8(value: u8) -> PduResult<Self> {
        Ok(match value {
            0x00 => Self::BitmapUncompressed,
            0x01 => Self::CacheColorTable,
            0x02 => Self::CacheBitmapCompressed,
            0x03 => Self::CacheGlyph,
            0x04 => Self::BitmapUncompressedV2,
            0x05 => Self::BitmapCompressedV2,
            0x07 => Self::CacheBrush,
            0x08 => Self::BitmapCompressedV3,
            _ => return Err(invalid_field_err!(NAME, "orderType", "unassigned secondary order type")),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheColorTableOrder {
    pub cache_index: u16,
    pub colors: Vec<Rgb>,
}

/// A secondary order this proxy doesn't interpret beyond its cache
/// slot: bitmap cache entries (v1/v2/v3, whichever compression codec)
/// and brush cache entries carry compressed/packed pixel data this proxy
/// has no reason to decode, only relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCacheOrder {
    pub kind: SecondaryOrderType,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecondaryOrder {
    CacheColorTable(CacheColorTableOrder),
    /// A `CACHE_GLYPH` order, present only when the session's negotiated
    /// glyph cache support level allows it; see
    /// [`crate::OrdersEngine::on_capabilities`].
    CacheGlyph(RawCacheOrder),
    Raw(RawCacheOrder),
    /// `CACHE_GLYPH` arrived but the client's `CAPSTYPE_GLYPHCACHE`
    /// capability reported no glyph cache support; the order is consumed
    /// (so framing stays correct) but otherwise ignored.
    GlyphCacheUnsupported,
}

/// Whether the session's glyph cache capability allows `CACHE_GLYPH`
/// orders, mirroring `CAPSTYPE_GLYPHCACHE`'s `GlyphSupportLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlyphCacheSupport {
    None,
    Partial,
    Full,
}

pub(crate) fn parse_secondary(
    src: &mut ReadCursor<'_>,
    glyph_cache_support: GlyphCacheSupport,
) -> PduResult<SecondaryOrder> {
    ensure_size!(ctx: NAME, in: src, size: 5);
    let order_length = src.read_u16();
    let _extra_flags = src.read_u16();
    let kind = SecondaryOrderType::from_u8(src.read_u8())?;

    // `[MS-RDPEGDI] 2.2.2.2.1.2.1.1`: orderLength historically undercounts
    // the header by 13 bytes relative to its on-wire meaning; every known
    // implementation (FreeRDP, PyRDP) compensates by adding 13 back, then
    // subtracting the 6 header bytes (orderLength/extraFlags/orderType,
    // plus the controlFlags byte the caller already consumed) already read.
    let body_len = usize::from(order_length).saturating_add(13).saturating_sub(6);
    let body = src.try_read_slice(NAME, body_len)?;
    let mut body_src = ReadCursor::new(body);

    Ok(match kind {
        SecondaryOrderType::CacheColorTable => {
            ensure_size!(ctx: NAME, in: body_src, size: 4);
            let cache_index = body_src.read_u16();
            let number_colors = body_src.read_u16();
            let mut colors = Vec::with_capacity(number_colors as usize);
            for _ in 0..number_colors {
                if body_src.len() < 4 {
                    break;
                }
                colors.push(Rgb {
                    r: body_src.read_u8(),
                    g: body_src.read_u8(),
                    b: body_src.read_u8(),
                });
                body_src.advance(1); // pad
            }
            SecondaryOrder::CacheColorTable(CacheColorTableOrder { cache_index, colors })
        }
        SecondaryOrderType::CacheGlyph => {
            if glyph_cache_support == GlyphCacheSupport::None {
                SecondaryOrder::GlyphCacheUnsupported
            } else {
                SecondaryOrder::CacheGlyph(RawCacheOrder {
                    kind,
                    data: body.to_vec(),
                })
            }
        }
        other => SecondaryOrder::Raw(RawCacheOrder {
            kind: other,
            data: body.to_vec(),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrdp_core::WriteCursor;

    #[test]
    fn cache_color_table_round_trips() {
        let mut buf = vec![0u8; 5 + 4 + 2 * 4];
        let order_length: u16 = (4 + 2 * 4 + 13 - 6) as u16;
        let mut dst = WriteCursor::new(&mut buf);
        dst.write_u16(order_length);
        dst.write_u16(0); // extraFlags
        dst.write_u8(0x01); // CACHE_COLOR_TABLE
        dst.write_u16(7); // cacheIndex
        dst.write_u16(2); // numberColors
        dst.write_u8(0xFF);
        dst.write_u8(0x00);
        dst.write_u8(0x00);
        dst.write_u8(0); // pad
        dst.write_u8(0x00);
        dst.write_u8(0xFF);
        dst.write_u8(0x00);
        dst.write_u8(0); // pad

        let order = parse_secondary(&mut ReadCursor::new(&buf), GlyphCacheSupport::Full).unwrap();
        match order {
            SecondaryOrder::CacheColorTable(table) => {
                assert_eq!(table.cache_index, 7);
                assert_eq!(table.colors.len(), 2);
                assert_eq!(table.colors[0], Rgb { r: 0xFF, g: 0x00, b: 0x00 });
            }
            other => panic!("expected CacheColorTable, got {other:?}"),
        }
    }

    #[test]
    fn cache_glyph_ignored_without_glyph_cache_support() {
        let mut buf = vec![0u8; 5 + 2];
        let order_length: u16 = (2 + 13 - 6) as u16;
        let mut dst = WriteCursor::new(&mut buf);
        dst.write_u16(order_length);
        dst.write_u16(0);
        dst.write_u8(0x03); // CACHE_GLYPH
        dst.write_u8(0xAA);
        dst.write_u8(0xBB);

        let order = parse_secondary(&mut ReadCursor::new(&buf), GlyphCacheSupport::None).unwrap();
        assert_eq!(order, SecondaryOrder::GlyphCacheUnsupported);
    }

    #[test]
    fn unassigned_secondary_type_is_rejected() {
        let mut buf = vec![0u8; 5];
        let mut dst = WriteCursor::new(&mut buf);
        dst.write_u16(13u16.saturating_sub(6));
        dst.write_u16(0);
        dst.write_u8(0x06); // gap in the secondary order type space

        let err = parse_secondary(&mut ReadCursor::new(&buf), GlyphCacheSupport::Full).unwrap_err();
        assert!(matches!(err.kind(), pyrdp_pdu::PduErrorKind::InvalidField { .. }));
    }
}
