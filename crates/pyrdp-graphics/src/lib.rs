//! The drawing-order engine: decodes the GDI drawing orders carried in a
//! slow-path Update PDU or fast-path Orders update
//! (`[MS-RDPEGDI] 2.2.2.2`) and dispatches each one to a [`GdiFrontend`].
//!
//! A server's update stream is a sequence of primary (actual drawing),
//! secondary (cache population), and alternate-secondary (everything else:
//! frame markers, offscreen surfaces) orders, dispatched by the
//! `controlFlags` byte each one starts with. Primary orders additionally
//! persist state across the whole connection: a field a server omits from
//! an order keeps whatever value that field last carried, so the decoder
//! can't treat each order in isolation the way the rest of this codebase's
//! PDU types do ([`primary::PrimaryContext`] is exactly that persisted
//! state).
//!
//! This engine is created only once the client capability exchange tells it
//! to: a session that never advertises `CAPSTYPE_ORDER` never draws
//! anything, so there is nothing to feed this engine, matching the
//! original renderer which only instantiates its order parser when that
//! capability is present.

pub mod alternate;
pub mod control_flags;
pub mod frontend;
pub mod primary;
pub mod secondary;

pub use alternate::{AlternateOrder, AlternateOrderType};
pub use control_flags::ControlFlags;
pub use frontend::GdiFrontend;
pub use primary::{Bounds, PrimaryContext, PrimaryOrder, PrimaryOrderType};
pub use secondary::{GlyphCacheSupport, SecondaryOrder, SecondaryOrderType};

use pyrdp_core::ReadCursor;
use pyrdp_pdu::capability_sets::{CapabilitySet, GlyphSupportLevel};
use pyrdp_pdu::{ensure_size, PduResult};

const NAME: &str = "OrdersEngine";

/// Decodes a stream of drawing orders and fans each one out to a
/// [`GdiFrontend`]. Holds the persisted [`PrimaryContext`] state and the
/// glyph cache capability gating `CACHE_GLYPH` orders.
#[derive(Debug, Default)]
pub struct OrdersEngine {
    primary: PrimaryContext,
    glyph_cache_support: GlyphCacheSupport,
}

impl Default for GlyphCacheSupport {
    fn default() -> Self {
        Self::None
    }
}

impl OrdersEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the negotiated glyph cache support level from the client's
    /// `CAPSTYPE_GLYPHCACHE` capability, gating future `CACHE_GLYPH`
    /// orders. Sessions that never send this capability keep the default
    /// [`GlyphCacheSupport::None`].
    pub fn on_capabilities(&mut self, capabilities: &[CapabilitySet]) {
        for capability in capabilities {
            if let CapabilitySet::GlyphCache(glyph_cache) = capability {
                self.glyph_cache_support = match glyph_cache.glyph_support_level {
                    GlyphSupportLevel::None => GlyphCacheSupport::None,
                    GlyphSupportLevel::Partial => GlyphCacheSupport::Partial,
                    GlyphSupportLevel::Full | GlyphSupportLevel::Encode => GlyphCacheSupport::Full,
                };
            }
        }
    }

    /// Decodes every order in one update's payload, dispatching each to
    /// `frontend`. A malformed order aborts the rest of *this* update (its
    /// remaining orders are lost) but never propagates past this call: the
    /// caller's session keeps running and the next update is decoded fresh,
    /// matching the original renderer's per-update try/catch around its
    /// whole order loop.
    pub fn parse_update(&mut self, payload: &[u8], frontend: &mut dyn GdiFrontend) {
        let mut src = ReadCursor::new(payload);
        if let Err(err) = self.try_parse_update(&mut src, frontend) {
            tracing::warn!(%err, "failed to decode drawing order update, dropping remaining orders in this update");
        }
    }

    fn try_parse_update(&mut self, src: &mut ReadCursor<'_>, frontend: &mut dyn GdiFrontend) -> PduResult<()> {
        ensure_size!(ctx: NAME, in: src, size: 2);
        let number_orders = src.read_u16();

        for _ in 0..number_orders {
            self.parse_order(src, frontend)?;
        }

        Ok(())
    }

    fn parse_order(&mut self, src: &mut ReadCursor<'_>, frontend: &mut dyn GdiFrontend) -> PduResult<()> {
        ensure_size!(ctx: NAME, in: src, size: 1);
        let raw_flags = src.read_u8();
        let flags = ControlFlags::from_bits_truncate(raw_flags);

        if !flags.contains(ControlFlags::STANDARD) {
            let order = alternate::parse_alternate(src, raw_flags)?;
            dispatch_alternate(order, frontend);
        } else if flags.contains(ControlFlags::SECONDARY) {
            let order = secondary::parse_secondary(src, self.glyph_cache_support)?;
            dispatch_secondary(order, frontend);
        } else {
            let order = self.primary.parse(src, raw_flags)?;
            if self.primary.bounded {
                frontend.on_bounds(self.primary.bounds);
            }
            dispatch_primary(order, frontend);
        }

        Ok(())
    }
}

fn dispatch_primary(order: PrimaryOrder, frontend: &mut dyn GdiFrontend) {
    match order {
        PrimaryOrder::DstBlt(order) => frontend.dst_blt(&order),
        PrimaryOrder::PatBlt(order) => frontend.pat_blt(&order),
        PrimaryOrder::ScrBlt(order) => frontend.scr_blt(&order),
        PrimaryOrder::LineTo(order) => frontend.line_to(&order),
        PrimaryOrder::OpaqueRect(order) => frontend.opaque_rect(&order),
        PrimaryOrder::MemBlt(order) => frontend.mem_blt(&order),
        PrimaryOrder::Mem3Blt(order) => frontend.mem3_blt(&order),
        PrimaryOrder::MultiDstBlt(order) => frontend.multi_dst_blt(&order),
        PrimaryOrder::MultiOpaqueRect(order) => frontend.multi_opaque_rect(&order),
        PrimaryOrder::GlyphIndex(order) => frontend.glyph_index(&order),
        PrimaryOrder::FastIndex(order) => frontend.fast_index(&order),
        PrimaryOrder::Polyline(order) => frontend.polyline(&order),
        PrimaryOrder::EllipseSc(order) => frontend.ellipse_sc(&order),
        PrimaryOrder::Generic(order) => frontend.generic_primary(&order),
    }
}

fn dispatch_secondary(order: SecondaryOrder, frontend: &mut dyn GdiFrontend) {
    match order {
        SecondaryOrder::CacheColorTable(order) => frontend.cache_color_table(&order),
        SecondaryOrder::CacheGlyph(order) => frontend.cache_glyph(&order),
        SecondaryOrder::Raw(order) => frontend.cache_raw(&order),
        SecondaryOrder::GlyphCacheUnsupported => {
            tracing::debug!("ignoring CACHE_GLYPH order, session has no glyph cache support");
        }
    }
}

fn dispatch_alternate(order: AlternateOrder, frontend: &mut dyn GdiFrontend) {
    match order {
        AlternateOrder::SwitchSurface { bitmap_id } => frontend.switch_surface(bitmap_id),
        AlternateOrder::FrameMarker { frame_action } => frontend.frame_marker(frame_action),
        AlternateOrder::Unsupported(kind) => {
            tracing::debug!(?kind, "alternate secondary order not supported, ignoring");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrdp_core::WriteCursor;
    use std::sync::{Arc, Mutex};

    #[derive(Default, Clone)]
    struct RecordingFrontend {
        dst_blts: Arc<Mutex<Vec<primary::DstBltOrder>>>,
    }

    impl GdiFrontend for RecordingFrontend {
        fn dst_blt(&mut self, order: &primary::DstBltOrder) {
            self.dst_blts.lock().unwrap().push(*order);
        }
    }

    fn encode_dstblt_order(left: i16, top: i16, width: i16, height: i16, rop: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push((ControlFlags::STANDARD | ControlFlags::TYPE_CHANGE).bits());
        buf.push(0x00); // orderType: DSTBLT
        buf.push(0x1F); // fieldFlags: all 5 fields
        buf.extend_from_slice(&left.to_le_bytes());
        buf.extend_from_slice(&top.to_le_bytes());
        buf.extend_from_slice(&width.to_le_bytes());
        buf.extend_from_slice(&height.to_le_bytes());
        buf.push(rop);
        buf
    }

    #[test]
    fn parse_update_dispatches_dstblt_to_frontend() {
        let mut engine = OrdersEngine::new();
        let mut frontend = RecordingFrontend::default();

        let order_bytes = encode_dstblt_order(1, 2, 3, 4, 0xAA);
        let mut payload = vec![0u8; 2];
        WriteCursor::new(&mut payload).write_u16(1);
        payload.extend_from_slice(&order_bytes);

        engine.parse_update(&payload, &mut frontend);

        let dst_blts = frontend.dst_blts.lock().unwrap();
        assert_eq!(dst_blts.len(), 1);
        assert_eq!(dst_blts[0].left, 1);
        assert_eq!(dst_blts[0].rop, 0xAA);
    }

    #[test]
    fn parse_update_tolerates_malformed_order_without_panicking() {
        let mut engine = OrdersEngine::new();
        let mut frontend = RecordingFrontend::default();

        // numberOrders says two orders follow, but the payload is truncated.
        let mut payload = vec![0u8; 2];
        WriteCursor::new(&mut payload).write_u16(2);
        payload.push(ControlFlags::TYPE_CHANGE.bits());
        payload.push(0x00); // orderType: DSTBLT
                             // fieldFlags and fields are missing entirely.

        // Must not panic; the update is simply dropped.
        engine.parse_update(&payload, &mut frontend);
        assert!(frontend.dst_blts.lock().unwrap().is_empty());
    }

    #[test]
    fn glyph_cache_capability_gates_cache_glyph_orders() {
        use pyrdp_pdu::capability_sets::{CacheDefinition, CapabilitySet, GlyphCache, GlyphSupportLevel, GLYPH_CACHE_NUM};

        let mut engine = OrdersEngine::new();
        engine.on_capabilities(&[CapabilitySet::GlyphCache(GlyphCache {
            glyph_cache: [CacheDefinition::default(); GLYPH_CACHE_NUM],
            frag_cache: CacheDefinition::default(),
            glyph_support_level: GlyphSupportLevel::Full,
        })]);
        assert_eq!(engine.glyph_cache_support, GlyphCacheSupport::Full);
    }
}
