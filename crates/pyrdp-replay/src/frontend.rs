//! A [`GdiFrontend`] that paints the fully-fielded order kinds onto a
//! [`Surface`] and counts every other kind it merely observes. This is the
//! replay's only rendering path — there is no live display, so "paint"
//! just means "mutate the offscreen framebuffer the caller can read back".

use pyrdp_graphics::frontend::GdiFrontend;
use pyrdp_graphics::primary::{DstBltOrder, MultiOpaqueRectOrder, OpaqueRectOrder};

use crate::surface::Surface;

/// Renders drawing orders onto an owned [`Surface`], tracking how many
/// orders this replay couldn't give pixels to (everything beyond the
/// handful of fully-fielded kinds).
pub struct SurfaceFrontend {
    pub surface: Surface,
    pub unrendered_orders: u64,
}

impl SurfaceFrontend {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            surface: Surface::new(width, height),
            unrendered_orders: 0,
        }
    }
}

impl GdiFrontend for SurfaceFrontend {
    fn dst_blt(&mut self, order: &DstBltOrder) {
        // DSTBLT only ever reads/manipulates destination pixels through a
        // ROP3 code; without the destination's prior contents modeled,
        // BLACKNESS (0x00) and WHITENESS (0xFF) are the only codes this
        // replay can render faithfully.
        match order.rop {
            0x00 => self.surface.fill_rect(order.left, order.top, order.width, order.height, (0, 0, 0)),
            0xFF => self.surface.fill_rect(order.left, order.top, order.width, order.height, (255, 255, 255)),
            _ => self.unrendered_orders += 1,
        }
    }

    fn opaque_rect(&mut self, order: &OpaqueRectOrder) {
        self.surface
            .fill_rect(order.left, order.top, order.width, order.height, (order.color.r, order.color.g, order.color.b));
    }

    fn multi_opaque_rect(&mut self, order: &MultiOpaqueRectOrder) {
        let mut left = order.left;
        let mut top = order.top;
        for rect in &order.rects {
            left += rect.left;
            top += rect.top;
            self.surface
                .fill_rect(left, top, rect.width, rect.height, (order.color.r, order.color.g, order.color.b));
        }
    }

    fn pat_blt(&mut self, _order: &pyrdp_graphics::primary::PatBltOrder) {
        self.unrendered_orders += 1;
    }

    fn scr_blt(&mut self, _order: &pyrdp_graphics::primary::ScrBltOrder) {
        self.unrendered_orders += 1;
    }

    fn line_to(&mut self, _order: &pyrdp_graphics::primary::LineToOrder) {
        self.unrendered_orders += 1;
    }

    fn mem_blt(&mut self, _order: &pyrdp_graphics::primary::MemBltOrder) {
        self.unrendered_orders += 1;
    }

    fn mem3_blt(&mut self, _order: &pyrdp_graphics::primary::Mem3BltOrder) {
        self.unrendered_orders += 1;
    }

    fn multi_dst_blt(&mut self, _order: &pyrdp_graphics::primary::MultiDstBltOrder) {
        self.unrendered_orders += 1;
    }

    fn glyph_index(&mut self, _order: &pyrdp_graphics::primary::GlyphIndexOrder) {
        self.unrendered_orders += 1;
    }

    fn fast_index(&mut self, _order: &pyrdp_graphics::primary::FastIndexOrder) {
        self.unrendered_orders += 1;
    }

    fn polyline(&mut self, _order: &pyrdp_graphics::primary::PolylineOrder) {
        self.unrendered_orders += 1;
    }

    fn ellipse_sc(&mut self, _order: &pyrdp_graphics::primary::EllipseScOrder) {
        self.unrendered_orders += 1;
    }

    fn generic_primary(&mut self, _order: &pyrdp_graphics::primary::GenericPrimaryOrder) {
        self.unrendered_orders += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrdp_graphics::primary::Rgb;

    #[test]
    fn opaque_rect_paints_the_surface() {
        let mut frontend = SurfaceFrontend::new(4, 4);
        frontend.opaque_rect(&OpaqueRectOrder {
            left: 0,
            top: 0,
            width: 2,
            height: 2,
            color: Rgb { r: 10, g: 20, b: 30 },
        });

        assert_eq!(&frontend.surface.pixels()[0..3], &[10, 20, 30]);
    }

    #[test]
    fn dst_blt_blackness_fills_black() {
        let mut frontend = SurfaceFrontend::new(2, 2);
        frontend.surface.fill_rect(0, 0, 2, 2, (255, 255, 255));
        frontend.dst_blt(&DstBltOrder {
            left: 0,
            top: 0,
            width: 2,
            height: 2,
            rop: 0x00,
        });

        assert_eq!(&frontend.surface.pixels()[0..3], &[0, 0, 0]);
    }

    #[test]
    fn unsupported_rop_is_counted_not_rendered() {
        let mut frontend = SurfaceFrontend::new(2, 2);
        frontend.dst_blt(&DstBltOrder {
            left: 0,
            top: 0,
            width: 2,
            height: 2,
            rop: 0x55,
        });

        assert_eq!(frontend.unrendered_orders, 1);
    }
}
