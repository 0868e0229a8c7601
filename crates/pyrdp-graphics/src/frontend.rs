//! The sink a drawing-order decode feeds into: one method per order kind,
//! each with a no-op default so a consumer (the replay engine's rasterizer,
//! or a proxy that only wants to log traffic) only implements what it
//! cares about. Mirrors how the original renderer's `notify` callback set
//! fans out one method per order.

use crate::primary::{
    DstBltOrder, EllipseScOrder, FastIndexOrder, GenericPrimaryOrder, GlyphIndexOrder, LineToOrder, MemBltOrder,
    Mem3BltOrder, MultiDstBltOrder, MultiOpaqueRectOrder, OpaqueRectOrder, PatBltOrder, PolylineOrder, ScrBltOrder,
};
use crate::secondary::{CacheColorTableOrder, RawCacheOrder};

pub trait GdiFrontend {
    fn on_bounds(&mut self, _bounds: crate::primary::Bounds) {}

    fn dst_blt(&mut self, _order: &DstBltOrder) {}
    fn pat_blt(&mut self, _order: &PatBltOrder) {}
    fn scr_blt(&mut self, _order: &ScrBltOrder) {}
    fn line_to(&mut self, _order: &LineToOrder) {}
    fn opaque_rect(&mut self, _order: &OpaqueRectOrder) {}
    fn mem_blt(&mut self, _order: &MemBltOrder) {}
    fn mem3_blt(&mut self, _order: &Mem3BltOrder) {}
    fn multi_dst_blt(&mut self, _order: &MultiDstBltOrder) {}
    fn multi_opaque_rect(&mut self, _order: &MultiOpaqueRectOrder) {}
    fn glyph_index(&mut self, _order: &GlyphIndexOrder) {}
    fn fast_index(&mut self, _order: &FastIndexOrder) {}
    fn polyline(&mut self, _order: &PolylineOrder) {}
    fn ellipse_sc(&mut self, _order: &EllipseScOrder) {}
    fn generic_primary(&mut self, _order: &GenericPrimaryOrder) {}

    fn cache_color_table(&mut self, _order: &CacheColorTableOrder) {}
    fn cache_glyph(&mut self, _order: &RawCacheOrder) {}
    fn cache_raw(&mut self, _order: &RawCacheOrder) {}

    fn switch_surface(&mut self, _bitmap_id: u16) {}
    fn frame_marker(&mut self, _frame_action: u16) {}
}
