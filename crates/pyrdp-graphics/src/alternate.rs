//! Alternate secondary drawing orders (`[MS-RDPEGDI] 2.2.2.2.1.3`). Unlike
//! primary/secondary orders, alternate orders carry no length prefix at all,
//! so a kind this proxy can't fully decode has nowhere safe to skip to.
//! Mirroring the original PyRDP renderer (which only logs and ignores
//! `WINDOW`/`COMPDESK_FIRST` rather than parsing them), every alt-sec kind
//! this proxy doesn't give real fields is treated the same way: logged and
//! assumed to carry no further bytes. Sessions that actually exercise the
//! GDI+/offscreen-bitmap/window-order families are not supported through
//! this proxy; only [`AlternateOrder::SwitchSurface`] and
//! [`AlternateOrder::FrameMarker`] are decoded with real fields.

use pyrdp_core::ReadCursor;
use pyrdp_pdu::{ensure_size, invalid_field_err, PduResult};

const NAME: &str = "AlternateOrder";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlternateOrderType {
    SwitchSurface,
    CreateOffscreenBitmap,
    StreamBitmapFirst,
    StreamBitmapNext,
    CreateNineGridBitmap,
    GdiplusFirst,
    GdiplusNext,
    GdiplusEnd,
    GdiplusCacheFirst,
    GdiplusCacheNext,
    GdiplusCacheEnd,
    Window,
    CompdeskFirst,
    FrameMarker,
}

impl AlternateOrderType {
    fn from_u8(value: u8) -> PduResult<Self> {
        Ok(match value {
            0x00 => Self::SwitchSurface,
            0x01 => Self::CreateOffscreenBitmap,
            0x02 => Self::StreamBitmapFirst,
            0x03 => Self::StreamBitmapNext,
            0x04 => Self::CreateNineGridBitmap,
            0x05 => Self::GdiplusFirst,
            0x06 => Self::GdiplusNext,
            0x07 => Self::GdiplusEnd,
            0x08 => Self::GdiplusCacheFirst,
            0x09 => Self::GdiplusCacheNext,
            0x0A => Self::GdiplusCacheEnd,
            0x0B => Self::Window,
            0x0C => Self::CompdeskFirst,
            0x0D => Self::FrameMarker,
            _ => return Err(invalid_field_err!(NAME, "orderType", "unassigned alternate order type")),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlternateOrder {
    SwitchSurface { bitmap_id: u16 },
    FrameMarker { frame_action: u16 },
    /// Logged and otherwise ignored, matching the original renderer's
    /// treatment of `WINDOW`/`COMPDESK_FIRST` and (here) every other
    /// alt-sec kind this proxy doesn't give real fields.
    Unsupported(AlternateOrderType),
}

pub(crate) fn parse_alternate(src: &mut ReadCursor<'_>, raw_flags: u8) -> PduResult<AlternateOrder> {
    let kind = AlternateOrderType::from_u8(raw_flags >> 2)?;

    Ok(match kind {
        AlternateOrderType::SwitchSurface => {
            ensure_size!(ctx: NAME, in: src, size: 2);
            AlternateOrder::SwitchSurface {
                bitmap_id: src.read_u16(),
            }
        }
        AlternateOrderType::FrameMarker => {
            ensure_size!(ctx: NAME, in: src, size: 2);
            AlternateOrder::FrameMarker {
                frame_action: src.read_u16(),
            }
        }
        other => AlternateOrder::Unsupported(other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrdp_core::WriteCursor;

    #[test]
    fn switch_surface_round_trips() {
        let mut buf = vec![0u8; 2];
        WriteCursor::new(&mut buf).write_u16(5);
        let raw_flags = 0x00 << 2;
        let order = parse_alternate(&mut ReadCursor::new(&buf), raw_flags).unwrap();
        assert_eq!(order, AlternateOrder::SwitchSurface { bitmap_id: 5 });
    }

    #[test]
    fn window_order_is_logged_and_consumes_nothing() {
        let order = parse_alternate(&mut ReadCursor::new(&[]), 0x0B << 2).unwrap();
        assert_eq!(order, AlternateOrder::Unsupported(AlternateOrderType::Window));
    }

    #[test]
    fn unassigned_alternate_type_is_rejected() {
        let err = parse_alternate(&mut ReadCursor::new(&[]), 0x0E << 2).unwrap_err();
        assert!(matches!(err.kind(), pyrdp_pdu::PduErrorKind::InvalidField { .. }));
    }
}
