//! Primary drawing orders (`[MS-RDPEGDI] 2.2.2.2.1.1/2.2.2.2.1.2`): the GDI
//! calls a server issues to draw into the session's primary surface.
//!
//! Every primary order shares the same field-presence encoding: a
//! `fieldFlags` bitmask (one bit per field, narrowed when the control byte's
//! `TS_ZERO_FIELD_BYTE_BIT0`/`BIT1` bits say trailing flag bytes were
//! omitted) tells the decoder which fields were actually sent; omitted
//! fields keep whatever value this order kind last carried, which is why
//! [`PrimaryContext`] persists one state struct per order kind across the
//! whole connection rather than decoding each order in isolation.
//! Coordinate fields are additionally either absolute 16-bit values or
//! signed deltas against the previous value, selected by the control byte's
//! `TS_DELTA_COORDS` bit.

use pyrdp_core::ReadCursor;
use pyrdp_pdu::{ensure_size, invalid_field_err, PduResult};

use crate::control_flags::ControlFlags;

pub(crate) const NAME: &str = "PrimaryOrder";

/// Reads the variable-width field-presence bitmask preceding a primary
/// order's fields, honoring the control byte's trailing-zero-byte
/// shorthand.
pub(crate) fn read_field_flags(src: &mut ReadCursor<'_>, raw_flags: u8, num_fields: usize) -> PduResult<u32> {
    let mut field_bytes = num_fields.div_ceil(8);
    if raw_flags & ControlFlags::ZERO_FIELD_BYTE_BIT0.bits() != 0 {
        field_bytes = field_bytes.saturating_sub(1);
    }
    if raw_flags & ControlFlags::ZERO_FIELD_BYTE_BIT1.bits() != 0 {
        field_bytes = field_bytes.saturating_sub(1);
    }
    ensure_size!(ctx: NAME, in: src, size: field_bytes);
    let mut result: u32 = 0;
    for i in 0..field_bytes {
        result |= u32::from(src.read_u8()) << (i * 8);
    }
    Ok(result)
}

pub(crate) fn field_is_set(field_flags: u32, index: usize) -> bool {
    (field_flags >> index) & 1 != 0
}

/// Decodes one delta-coded signed value: the low 7 bits of the first byte
/// hold the magnitude (bit 6 its sign), a set high bit means a second byte
/// extends it. Used for every coordinate field when `TS_DELTA_COORDS` is
/// active.
pub(crate) fn read_delta(src: &mut ReadCursor<'_>) -> i32 {
    let byte = src.read_u8();
    let low7 = i32::from(byte & 0x7F);
    let mut value = if byte & 0x40 != 0 { low7 - 128 } else { low7 };
    if byte & 0x80 != 0 {
        let byte2 = src.read_u8();
        value = (value << 8) | i32::from(byte2);
    }
    value
}

pub(crate) fn read_coord(src: &mut ReadCursor<'_>, use_delta: bool, previous: i32) -> i32 {
    if use_delta {
        previous + read_delta(src)
    } else {
        i32::from(src.read_i16())
    }
}

/// A clip rectangle attached to an order via `TS_BOUNDS`. Persists across
/// orders the same way per-kind field state does: `TS_ZERO_BOUNDS_DELTAS`
/// means "reuse the last bounds unchanged".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Bounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct BoundsFlags: u8 {
        const LEFT = 0x01;
        const TOP = 0x02;
        const RIGHT = 0x04;
        const BOTTOM = 0x08;
        const DELTA_LEFT = 0x10;
        const DELTA_TOP = 0x20;
        const DELTA_RIGHT = 0x40;
        const DELTA_BOTTOM = 0x80;
    }
}

impl Bounds {
    fn update(&mut self, src: &mut ReadCursor<'_>) -> PduResult<()> {
        ensure_size!(ctx: NAME, in: src, size: 1);
        let flags = BoundsFlags::from_bits_truncate(src.read_u8());

        if flags.contains(BoundsFlags::LEFT) {
            ensure_size!(ctx: NAME, in: src, size: 2);
            self.left = i32::from(src.read_i16());
        } else if flags.contains(BoundsFlags::DELTA_LEFT) {
            self.left += read_delta(src);
        }
        if flags.contains(BoundsFlags::TOP) {
            ensure_size!(ctx: NAME, in: src, size: 2);
            self.top = i32::from(src.read_i16());
        } else if flags.contains(BoundsFlags::DELTA_TOP) {
            self.top += read_delta(src);
        }
        if flags.contains(BoundsFlags::RIGHT) {
            ensure_size!(ctx: NAME, in: src, size: 2);
            self.right = i32::from(src.read_i16());
        } else if flags.contains(BoundsFlags::DELTA_RIGHT) {
            self.right += read_delta(src);
        }
        if flags.contains(BoundsFlags::BOTTOM) {
            ensure_size!(ctx: NAME, in: src, size: 2);
            self.bottom = i32::from(src.read_i16());
        } else if flags.contains(BoundsFlags::DELTA_BOTTOM) {
            self.bottom += read_delta(src);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

fn read_rgb(src: &mut ReadCursor<'_>) -> Rgb {
    Rgb {
        r: src.read_u8(),
        g: src.read_u8(),
        b: src.read_u8(),
    }
}

fn write_rgb(dst: &mut pyrdp_core::WriteCursor<'_>, rgb: Rgb) {
    dst.write_u8(rgb.r);
    dst.write_u8(rgb.g);
    dst.write_u8(rgb.b);
}

macro_rules! persisted_coord_fields {
    ($state:ident { $($field:ident),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub(crate) struct $state {
            $(pub $field: i32,)+
        }
    };
}

// --- DSTBLT ---------------------------------------------------------------

persisted_coord_fields!(DstBltState { left, top, width, height });

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DstBltOrder {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub rop: u8,
}

impl DstBltState {
    fn update(&mut self, src: &mut ReadCursor<'_>, raw_flags: u8, rop: &mut u8) -> PduResult<DstBltOrder> {
        let field_flags = read_field_flags(src, raw_flags, 5)?;
        let use_delta = raw_flags & ControlFlags::DELTA_COORDS.bits() != 0;

        if field_is_set(field_flags, 0) {
            self.left = read_coord(src, use_delta, self.left);
        }
        if field_is_set(field_flags, 1) {
            self.top = read_coord(src, use_delta, self.top);
        }
        if field_is_set(field_flags, 2) {
            self.width = read_coord(src, use_delta, self.width);
        }
        if field_is_set(field_flags, 3) {
            self.height = read_coord(src, use_delta, self.height);
        }
        if field_is_set(field_flags, 4) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            *rop = src.read_u8();
        }

        Ok(DstBltOrder {
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
            rop: *rop,
        })
    }
}

// --- PATBLT ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatBltOrder {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub rop: u8,
    pub back_color: Rgb,
    pub fore_color: Rgb,
    pub brush_org_x: i32,
    pub brush_org_y: i32,
    pub brush_style: u8,
    pub brush_hatch: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PatBltState {
    left: i32,
    top: i32,
    width: i32,
    height: i32,
    rop: u8,
    back_color: (u8, u8, u8),
    fore_color: (u8, u8, u8),
    brush_org_x: i32,
    brush_org_y: i32,
    brush_style: u8,
    brush_hatch: u8,
}

impl PatBltState {
    fn update(&mut self, src: &mut ReadCursor<'_>, raw_flags: u8) -> PduResult<PatBltOrder> {
        let field_flags = read_field_flags(src, raw_flags, 11)?;
        let use_delta = raw_flags & ControlFlags::DELTA_COORDS.bits() != 0;

        if field_is_set(field_flags, 0) {
            self.left = read_coord(src, use_delta, self.left);
        }
        if field_is_set(field_flags, 1) {
            self.top = read_coord(src, use_delta, self.top);
        }
        if field_is_set(field_flags, 2) {
            self.width = read_coord(src, use_delta, self.width);
        }
        if field_is_set(field_flags, 3) {
            self.height = read_coord(src, use_delta, self.height);
        }
        if field_is_set(field_flags, 4) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.rop = src.read_u8();
        }
        if field_is_set(field_flags, 5) {
            ensure_size!(ctx: NAME, in: src, size: 3);
            let rgb = read_rgb(src);
            self.back_color = (rgb.r, rgb.g, rgb.b);
        }
        if field_is_set(field_flags, 6) {
            ensure_size!(ctx: NAME, in: src, size: 3);
            let rgb = read_rgb(src);
            self.fore_color = (rgb.r, rgb.g, rgb.b);
        }
        if field_is_set(field_flags, 7) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.brush_org_x = i32::from(src.read_u8());
        }
        if field_is_set(field_flags, 8) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.brush_org_y = i32::from(src.read_u8());
        }
        if field_is_set(field_flags, 9) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.brush_style = src.read_u8();
        }
        if field_is_set(field_flags, 10) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.brush_hatch = src.read_u8();
        }

        Ok(PatBltOrder {
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
            rop: self.rop,
            back_color: Rgb {
                r: self.back_color.0,
                g: self.back_color.1,
                b: self.back_color.2,
            },
            fore_color: Rgb {
                r: self.fore_color.0,
                g: self.fore_color.1,
                b: self.fore_color.2,
            },
            brush_org_x: self.brush_org_x,
            brush_org_y: self.brush_org_y,
            brush_style: self.brush_style,
            brush_hatch: self.brush_hatch,
        })
    }
}

// --- SCRBLT ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrBltOrder {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub rop: u8,
    pub x_src: i32,
    pub y_src: i32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ScrBltState {
    left: i32,
    top: i32,
    width: i32,
    height: i32,
    rop: u8,
    x_src: i32,
    y_src: i32,
}

impl ScrBltState {
    fn update(&mut self, src: &mut ReadCursor<'_>, raw_flags: u8) -> PduResult<ScrBltOrder> {
        let field_flags = read_field_flags(src, raw_flags, 7)?;
        let use_delta = raw_flags & ControlFlags::DELTA_COORDS.bits() != 0;

        if field_is_set(field_flags, 0) {
            self.left = read_coord(src, use_delta, self.left);
        }
        if field_is_set(field_flags, 1) {
            self.top = read_coord(src, use_delta, self.top);
        }
        if field_is_set(field_flags, 2) {
            self.width = read_coord(src, use_delta, self.width);
        }
        if field_is_set(field_flags, 3) {
            self.height = read_coord(src, use_delta, self.height);
        }
        if field_is_set(field_flags, 4) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.rop = src.read_u8();
        }
        if field_is_set(field_flags, 5) {
            self.x_src = read_coord(src, use_delta, self.x_src);
        }
        if field_is_set(field_flags, 6) {
            self.y_src = read_coord(src, use_delta, self.y_src);
        }

        Ok(ScrBltOrder {
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
            rop: self.rop,
            x_src: self.x_src,
            y_src: self.y_src,
        })
    }
}

// --- LINE_TO -----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineToOrder {
    pub back_mode: u16,
    pub x_start: i32,
    pub y_start: i32,
    pub x_end: i32,
    pub y_end: i32,
    pub back_color: Rgb,
    pub rop2: u8,
    pub pen_style: u8,
    pub pen_width: u8,
    pub pen_color: Rgb,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct LineToState {
    back_mode: u16,
    x_start: i32,
    y_start: i32,
    x_end: i32,
    y_end: i32,
    back_color: (u8, u8, u8),
    rop2: u8,
    pen_style: u8,
    pen_width: u8,
    pen_color: (u8, u8, u8),
}

impl LineToState {
    fn update(&mut self, src: &mut ReadCursor<'_>, raw_flags: u8) -> PduResult<LineToOrder> {
        let field_flags = read_field_flags(src, raw_flags, 10)?;
        let use_delta = raw_flags & ControlFlags::DELTA_COORDS.bits() != 0;

        if field_is_set(field_flags, 0) {
            ensure_size!(ctx: NAME, in: src, size: 2);
            self.back_mode = src.read_u16();
        }
        if field_is_set(field_flags, 1) {
            self.x_start = read_coord(src, use_delta, self.x_start);
        }
        if field_is_set(field_flags, 2) {
            self.y_start = read_coord(src, use_delta, self.y_start);
        }
        if field_is_set(field_flags, 3) {
            self.x_end = read_coord(src, use_delta, self.x_end);
        }
        if field_is_set(field_flags, 4) {
            self.y_end = read_coord(src, use_delta, self.y_end);
        }
        if field_is_set(field_flags, 5) {
            ensure_size!(ctx: NAME, in: src, size: 3);
            let rgb = read_rgb(src);
            self.back_color = (rgb.r, rgb.g, rgb.b);
        }
        if field_is_set(field_flags, 6) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.rop2 = src.read_u8();
        }
        if field_is_set(field_flags, 7) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.pen_style = src.read_u8();
        }
        if field_is_set(field_flags, 8) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.pen_width = src.read_u8();
        }
        if field_is_set(field_flags, 9) {
            ensure_size!(ctx: NAME, in: src, size: 3);
            let rgb = read_rgb(src);
            self.pen_color = (rgb.r, rgb.g, rgb.b);
        }

        Ok(LineToOrder {
            back_mode: self.back_mode,
            x_start: self.x_start,
            y_start: self.y_start,
            x_end: self.x_end,
            y_end: self.y_end,
            back_color: Rgb {
                r: self.back_color.0,
                g: self.back_color.1,
                b: self.back_color.2,
            },
            rop2: self.rop2,
            pen_style: self.pen_style,
            pen_width: self.pen_width,
            pen_color: Rgb {
                r: self.pen_color.0,
                g: self.pen_color.1,
                b: self.pen_color.2,
            },
        })
    }
}

// --- OPAQUE_RECT -------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpaqueRectOrder {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub color: Rgb,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct OpaqueRectState {
    left: i32,
    top: i32,
    width: i32,
    height: i32,
    color: (u8, u8, u8),
}

impl OpaqueRectState {
    fn update(&mut self, src: &mut ReadCursor<'_>, raw_flags: u8) -> PduResult<OpaqueRectOrder> {
        let field_flags = read_field_flags(src, raw_flags, 7)?;
        let use_delta = raw_flags & ControlFlags::DELTA_COORDS.bits() != 0;

        if field_is_set(field_flags, 0) {
            self.left = read_coord(src, use_delta, self.left);
        }
        if field_is_set(field_flags, 1) {
            self.top = read_coord(src, use_delta, self.top);
        }
        if field_is_set(field_flags, 2) {
            self.width = read_coord(src, use_delta, self.width);
        }
        if field_is_set(field_flags, 3) {
            self.height = read_coord(src, use_delta, self.height);
        }
        if field_is_set(field_flags, 4) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.color.0 = src.read_u8();
        }
        if field_is_set(field_flags, 5) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.color.1 = src.read_u8();
        }
        if field_is_set(field_flags, 6) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.color.2 = src.read_u8();
        }

        Ok(OpaqueRectOrder {
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
            color: Rgb {
                r: self.color.0,
                g: self.color.1,
                b: self.color.2,
            },
        })
    }
}

// --- MEMBLT / MEM3BLT --------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemBltOrder {
    pub cache_id: u16,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub rop: u8,
    pub x_src: i32,
    pub y_src: i32,
    pub cache_index: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct MemBltState {
    cache_id: u16,
    left: i32,
    top: i32,
    width: i32,
    height: i32,
    rop: u8,
    x_src: i32,
    y_src: i32,
    cache_index: u16,
}

impl MemBltState {
    fn update(&mut self, src: &mut ReadCursor<'_>, raw_flags: u8) -> PduResult<MemBltOrder> {
        let field_flags = read_field_flags(src, raw_flags, 9)?;
        let use_delta = raw_flags & ControlFlags::DELTA_COORDS.bits() != 0;

        if field_is_set(field_flags, 0) {
            ensure_size!(ctx: NAME, in: src, size: 2);
            self.cache_id = src.read_u16();
        }
        if field_is_set(field_flags, 1) {
            self.left = read_coord(src, use_delta, self.left);
        }
        if field_is_set(field_flags, 2) {
            self.top = read_coord(src, use_delta, self.top);
        }
        if field_is_set(field_flags, 3) {
            self.width = read_coord(src, use_delta, self.width);
        }
        if field_is_set(field_flags, 4) {
            self.height = read_coord(src, use_delta, self.height);
        }
        if field_is_set(field_flags, 5) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.rop = src.read_u8();
        }
        if field_is_set(field_flags, 6) {
            self.x_src = read_coord(src, use_delta, self.x_src);
        }
        if field_is_set(field_flags, 7) {
            self.y_src = read_coord(src, use_delta, self.y_src);
        }
        if field_is_set(field_flags, 8) {
            ensure_size!(ctx: NAME, in: src, size: 2);
            self.cache_index = src.read_u16();
        }

        Ok(MemBltOrder {
            cache_id: self.cache_id,
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
            rop: self.rop,
            x_src: self.x_src,
            y_src: self.y_src,
            cache_index: self.cache_index,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mem3BltOrder {
    pub cache_id: u16,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub rop: u8,
    pub x_src: i32,
    pub y_src: i32,
    pub back_color: Rgb,
    pub fore_color: Rgb,
    pub cache_index: u16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Mem3BltState {
    cache_id: u16,
    left: i32,
    top: i32,
    width: i32,
    height: i32,
    rop: u8,
    x_src: i32,
    y_src: i32,
    back_color: (u8, u8, u8),
    fore_color: (u8, u8, u8),
    cache_index: u16,
}

impl Mem3BltState {
    fn update(&mut self, src: &mut ReadCursor<'_>, raw_flags: u8) -> PduResult<Mem3BltOrder> {
        let field_flags = read_field_flags(src, raw_flags, 11)?;
        let use_delta = raw_flags & ControlFlags::DELTA_COORDS.bits() != 0;

        if field_is_set(field_flags, 0) {
            ensure_size!(ctx: NAME, in: src, size: 2);
            self.cache_id = src.read_u16();
        }
        if field_is_set(field_flags, 1) {
            self.left = read_coord(src, use_delta, self.left);
        }
        if field_is_set(field_flags, 2) {
            self.top = read_coord(src, use_delta, self.top);
        }
        if field_is_set(field_flags, 3) {
            self.width = read_coord(src, use_delta, self.width);
        }
        if field_is_set(field_flags, 4) {
            self.height = read_coord(src, use_delta, self.height);
        }
        if field_is_set(field_flags, 5) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.rop = src.read_u8();
        }
        if field_is_set(field_flags, 6) {
            self.x_src = read_coord(src, use_delta, self.x_src);
        }
        if field_is_set(field_flags, 7) {
            self.y_src = read_coord(src, use_delta, self.y_src);
        }
        if field_is_set(field_flags, 8) {
            ensure_size!(ctx: NAME, in: src, size: 3);
            let rgb = read_rgb(src);
            self.back_color = (rgb.r, rgb.g, rgb.b);
        }
        if field_is_set(field_flags, 9) {
            ensure_size!(ctx: NAME, in: src, size: 3);
            let rgb = read_rgb(src);
            self.fore_color = (rgb.r, rgb.g, rgb.b);
        }
        if field_is_set(field_flags, 10) {
            ensure_size!(ctx: NAME, in: src, size: 2);
            self.cache_index = src.read_u16();
        }

        Ok(Mem3BltOrder {
            cache_id: self.cache_id,
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
            rop: self.rop,
            x_src: self.x_src,
            y_src: self.y_src,
            back_color: Rgb {
                r: self.back_color.0,
                g: self.back_color.1,
                b: self.back_color.2,
            },
            fore_color: Rgb {
                r: self.fore_color.0,
                g: self.fore_color.1,
                b: self.fore_color.2,
            },
            cache_index: self.cache_index,
        })
    }
}

// --- MULTI_DSTBLT / MULTI_OPAQUE_RECT ---------------------------------------

/// One rectangle in a multi-order's delta rectangle list: self-delimited by
/// its own one-byte presence flags (left/top/width/height), each present
/// field delta-coded against the previous rectangle in the list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaRect {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct RectPresence: u8 {
        const LEFT = 0x01;
        const TOP = 0x02;
        const WIDTH = 0x04;
        const HEIGHT = 0x08;
    }
}

fn read_delta_rects(src: &mut ReadCursor<'_>, count: u8) -> PduResult<Vec<DeltaRect>> {
    let mut rects = Vec::with_capacity(count as usize);
    let mut previous = DeltaRect::default();

    for _ in 0..count {
        ensure_size!(ctx: NAME, in: src, size: 1);
        let presence = RectPresence::from_bits_truncate(src.read_u8());
        let mut rect = previous;
        if presence.contains(RectPresence::LEFT) {
            rect.left += read_delta(src);
        }
        if presence.contains(RectPresence::TOP) {
            rect.top += read_delta(src);
        }
        if presence.contains(RectPresence::WIDTH) {
            rect.width += read_delta(src);
        }
        if presence.contains(RectPresence::HEIGHT) {
            rect.height += read_delta(src);
        }
        rects.push(rect);
        previous = rect;
    }

    Ok(rects)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiDstBltOrder {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub rop: u8,
    pub rects: Vec<DeltaRect>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct MultiDstBltState {
    left: i32,
    top: i32,
    width: i32,
    height: i32,
    rop: u8,
}

impl MultiDstBltState {
    fn update(&mut self, src: &mut ReadCursor<'_>, raw_flags: u8) -> PduResult<MultiDstBltOrder> {
        let field_flags = read_field_flags(src, raw_flags, 6)?;
        let use_delta = raw_flags & ControlFlags::DELTA_COORDS.bits() != 0;

        if field_is_set(field_flags, 0) {
            self.left = read_coord(src, use_delta, self.left);
        }
        if field_is_set(field_flags, 1) {
            self.top = read_coord(src, use_delta, self.top);
        }
        if field_is_set(field_flags, 2) {
            self.width = read_coord(src, use_delta, self.width);
        }
        if field_is_set(field_flags, 3) {
            self.height = read_coord(src, use_delta, self.height);
        }
        if field_is_set(field_flags, 4) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.rop = src.read_u8();
        }
        let rects = if field_is_set(field_flags, 5) {
            ensure_size!(ctx: NAME, in: src, size: 2);
            let count = src.read_u8();
            let _coded_length = src.read_u8();
            read_delta_rects(src, count)?
        } else {
            Vec::new()
        };

        Ok(MultiDstBltOrder {
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
            rop: self.rop,
            rects,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiOpaqueRectOrder {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub color: Rgb,
    pub rects: Vec<DeltaRect>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct MultiOpaqueRectState {
    left: i32,
    top: i32,
    width: i32,
    height: i32,
    color: (u8, u8, u8),
}

impl MultiOpaqueRectState {
    fn update(&mut self, src: &mut ReadCursor<'_>, raw_flags: u8) -> PduResult<MultiOpaqueRectOrder> {
        let field_flags = read_field_flags(src, raw_flags, 8)?;
        let use_delta = raw_flags & ControlFlags::DELTA_COORDS.bits() != 0;

        if field_is_set(field_flags, 0) {
            self.left = read_coord(src, use_delta, self.left);
        }
        if field_is_set(field_flags, 1) {
            self.top = read_coord(src, use_delta, self.top);
        }
        if field_is_set(field_flags, 2) {
            self.width = read_coord(src, use_delta, self.width);
        }
        if field_is_set(field_flags, 3) {
            self.height = read_coord(src, use_delta, self.height);
        }
        if field_is_set(field_flags, 4) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.color.0 = src.read_u8();
        }
        if field_is_set(field_flags, 5) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.color.1 = src.read_u8();
        }
        if field_is_set(field_flags, 6) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.color.2 = src.read_u8();
        }
        let rects = if field_is_set(field_flags, 7) {
            ensure_size!(ctx: NAME, in: src, size: 2);
            let count = src.read_u8();
            let _coded_length = src.read_u8();
            read_delta_rects(src, count)?
        } else {
            Vec::new()
        };

        Ok(MultiOpaqueRectOrder {
            left: self.left,
            top: self.top,
            width: self.width,
            height: self.height,
            color: Rgb {
                r: self.color.0,
                g: self.color.1,
                b: self.color.2,
            },
            rects,
        })
    }
}

// --- GLYPH_INDEX / FAST_INDEX -------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphIndexOrder {
    pub cache_id: u8,
    pub fl_accel: u8,
    pub back_color: Rgb,
    pub fore_color: Rgb,
    pub bk_left: i32,
    pub bk_top: i32,
    pub bk_right: i32,
    pub bk_bottom: i32,
    pub x: i32,
    pub y: i32,
    pub glyph_data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct GlyphIndexState {
    cache_id: u8,
    fl_accel: u8,
    back_color: (u8, u8, u8),
    fore_color: (u8, u8, u8),
    bk_left: i32,
    bk_top: i32,
    bk_right: i32,
    bk_bottom: i32,
    x: i32,
    y: i32,
}

impl GlyphIndexState {
    fn update(&mut self, src: &mut ReadCursor<'_>, raw_flags: u8) -> PduResult<GlyphIndexOrder> {
        let field_flags = read_field_flags(src, raw_flags, 11)?;
        let use_delta = raw_flags & ControlFlags::DELTA_COORDS.bits() != 0;

        if field_is_set(field_flags, 0) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.cache_id = src.read_u8();
        }
        if field_is_set(field_flags, 1) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.fl_accel = src.read_u8();
        }
        if field_is_set(field_flags, 2) {
            ensure_size!(ctx: NAME, in: src, size: 3);
            let rgb = read_rgb(src);
            self.back_color = (rgb.r, rgb.g, rgb.b);
        }
        if field_is_set(field_flags, 3) {
            ensure_size!(ctx: NAME, in: src, size: 3);
            let rgb = read_rgb(src);
            self.fore_color = (rgb.r, rgb.g, rgb.b);
        }
        if field_is_set(field_flags, 4) {
            self.bk_left = read_coord(src, use_delta, self.bk_left);
        }
        if field_is_set(field_flags, 5) {
            self.bk_top = read_coord(src, use_delta, self.bk_top);
        }
        if field_is_set(field_flags, 6) {
            self.bk_right = read_coord(src, use_delta, self.bk_right);
        }
        if field_is_set(field_flags, 7) {
            self.bk_bottom = read_coord(src, use_delta, self.bk_bottom);
        }
        if field_is_set(field_flags, 8) {
            self.x = read_coord(src, use_delta, self.x);
        }
        if field_is_set(field_flags, 9) {
            self.y = read_coord(src, use_delta, self.y);
        }
        let glyph_data = if field_is_set(field_flags, 10) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            let len = usize::from(src.read_u8());
            src.try_read_slice(NAME, len)?.to_vec()
        } else {
            Vec::new()
        };

        Ok(GlyphIndexOrder {
            cache_id: self.cache_id,
            fl_accel: self.fl_accel,
            back_color: Rgb {
                r: self.back_color.0,
                g: self.back_color.1,
                b: self.back_color.2,
            },
            fore_color: Rgb {
                r: self.fore_color.0,
                g: self.fore_color.1,
                b: self.fore_color.2,
            },
            bk_left: self.bk_left,
            bk_top: self.bk_top,
            bk_right: self.bk_right,
            bk_bottom: self.bk_bottom,
            x: self.x,
            y: self.y,
            glyph_data,
        })
    }
}

pub type FastIndexOrder = GlyphIndexOrder;
pub(crate) type FastIndexState = GlyphIndexState;

// --- POLYLINE ----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolylineOrder {
    pub x_start: i32,
    pub y_start: i32,
    pub back_color: Rgb,
    pub rop2: u8,
    pub points: Vec<(i32, i32)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct PolylineState {
    x_start: i32,
    y_start: i32,
    back_color: (u8, u8, u8),
    rop2: u8,
}

impl PolylineState {
    fn update(&mut self, src: &mut ReadCursor<'_>, raw_flags: u8) -> PduResult<PolylineOrder> {
        let field_flags = read_field_flags(src, raw_flags, 7)?;
        let use_delta = raw_flags & ControlFlags::DELTA_COORDS.bits() != 0;

        if field_is_set(field_flags, 0) {
            self.x_start = read_coord(src, use_delta, self.x_start);
        }
        if field_is_set(field_flags, 1) {
            self.y_start = read_coord(src, use_delta, self.y_start);
        }
        if field_is_set(field_flags, 2) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.rop2 = src.read_u8();
        }
        if field_is_set(field_flags, 3) {
            ensure_size!(ctx: NAME, in: src, size: 3);
            let rgb = read_rgb(src);
            self.back_color = (rgb.r, rgb.g, rgb.b);
        }

        let mut points = Vec::new();
        if field_is_set(field_flags, 5) {
            ensure_size!(ctx: NAME, in: src, size: 2);
            let num_points = src.read_u8();
            let _coded_length = src.read_u8();
            let mut previous = (self.x_start, self.y_start);
            for _ in 0..num_points {
                let dx = read_delta(src);
                let dy = read_delta(src);
                previous = (previous.0 + dx, previous.1 + dy);
                points.push(previous);
            }
        }

        Ok(PolylineOrder {
            x_start: self.x_start,
            y_start: self.y_start,
            back_color: Rgb {
                r: self.back_color.0,
                g: self.back_color.1,
                b: self.back_color.2,
            },
            rop2: self.rop2,
            points,
        })
    }
}

// --- ELLIPSE_SC ----------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EllipseScOrder {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub rop2: u8,
    pub fill_mode: u8,
    pub color: Rgb,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct EllipseScState {
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    rop2: u8,
    fill_mode: u8,
    color: (u8, u8, u8),
}

impl EllipseScState {
    fn update(&mut self, src: &mut ReadCursor<'_>, raw_flags: u8) -> PduResult<EllipseScOrder> {
        let field_flags = read_field_flags(src, raw_flags, 7)?;
        let use_delta = raw_flags & ControlFlags::DELTA_COORDS.bits() != 0;

        if field_is_set(field_flags, 0) {
            self.left = read_coord(src, use_delta, self.left);
        }
        if field_is_set(field_flags, 1) {
            self.top = read_coord(src, use_delta, self.top);
        }
        if field_is_set(field_flags, 2) {
            self.right = read_coord(src, use_delta, self.right);
        }
        if field_is_set(field_flags, 3) {
            self.bottom = read_coord(src, use_delta, self.bottom);
        }
        if field_is_set(field_flags, 4) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.rop2 = src.read_u8();
        }
        if field_is_set(field_flags, 5) {
            ensure_size!(ctx: NAME, in: src, size: 1);
            self.fill_mode = src.read_u8();
        }
        if field_is_set(field_flags, 6) {
            ensure_size!(ctx: NAME, in: src, size: 3);
            let rgb = read_rgb(src);
            self.color = (rgb.r, rgb.g, rgb.b);
        }

        Ok(EllipseScOrder {
            left: self.left,
            top: self.top,
            right: self.right,
            bottom: self.bottom,
            rop2: self.rop2,
            fill_mode: self.fill_mode,
            color: Rgb {
                r: self.color.0,
                g: self.color.1,
                b: self.color.2,
            },
        })
    }
}

// --- Rarer kinds: shared generic field-table decode -------------------------

/// The nine primary order kinds this proxy doesn't give a bespoke struct
/// (draw-nine-grid family, save-bitmap, the remaining multi-* orders,
/// polygon family, fast-glyph, ellipse-cb): their fields are all treated as
/// generic delta-capable coordinates and kept as an opaque value list,
/// since this proxy relays but never interprets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericPrimaryOrder {
    pub kind: PrimaryOrderType,
    pub fields: Vec<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct GenericPrimaryState {
    fields: Vec<i32>,
}

impl GenericPrimaryState {
    fn update(
        &mut self,
        src: &mut ReadCursor<'_>,
        raw_flags: u8,
        kind: PrimaryOrderType,
        num_fields: usize,
    ) -> PduResult<GenericPrimaryOrder> {
        if self.fields.len() != num_fields {
            self.fields.resize(num_fields, 0);
        }
        let field_flags = read_field_flags(src, raw_flags, num_fields)?;
        let use_delta = raw_flags & ControlFlags::DELTA_COORDS.bits() != 0;

        for (i, field) in self.fields.iter_mut().enumerate() {
            if field_is_set(field_flags, i) {
                *field = read_coord(src, use_delta, *field);
            }
        }

        Ok(GenericPrimaryOrder {
            kind,
            fields: self.fields.clone(),
        })
    }
}

/// `[MS-RDPEGDI] 2.2.2.2.1.1.2`'s `orderType` discriminants for primary
/// orders. Gaps in the wire value space (0x03-0x06, 0x0C, 0x17) have no
/// assigned meaning and are never dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryOrderType {
    DstBlt,
    PatBlt,
    ScrBlt,
    DrawNineGrid,
    MultiDrawNineGrid,
    LineTo,
    OpaqueRect,
    SaveBitmap,
    MemBlt,
    Mem3Blt,
    MultiDstBlt,
    MultiPatBlt,
    MultiScrBlt,
    MultiOpaqueRect,
    FastIndex,
    PolygonSc,
    PolygonCb,
    Polyline,
    FastGlyph,
    EllipseSc,
    EllipseCb,
    GlyphIndex,
}

impl PrimaryOrderType {
    fn from_u8(value: u8) -> PduResult<Self> {
        Ok(match value {
            0x00 => Self::DstBlt,
            0x01 => Self::PatBlt,
            0x02 => Self::ScrBlt,
            0x07 => Self::DrawNineGrid,
            0x08 => Self::MultiDrawNineGrid,
            0x09 => Self::LineTo,
            0x0A => Self::OpaqueRect,
            0x0B => Self::SaveBitmap,
            0x0D => Self::MemBlt,
            0x0E => Self::Mem3Blt,
            0x0F => Self::MultiDstBlt,
            0x10 => Self::MultiPatBlt,
            0x11 => Self::MultiScrBlt,
            0x12 => Self::MultiOpaqueRect,
            0x13 => Self::FastIndex,
            0x14 => Self::PolygonSc,
            0x15 => Self::PolygonCb,
            0x16 => Self::Polyline,
            0x18 => Self::FastGlyph,
            0x19 => Self::EllipseSc,
            0x1A => Self::EllipseCb,
            0x1B => Self::GlyphIndex,
            _ => return Err(invalid_field_err!(NAME, "orderType", "unassigned primary order type")),
        })
    }
}

fn generic_field_count(kind: PrimaryOrderType) -> usize {
    match kind {
        PrimaryOrderType::DrawNineGrid => 5,
        PrimaryOrderType::MultiDrawNineGrid => 7,
        PrimaryOrderType::SaveBitmap => 5,
        PrimaryOrderType::MultiPatBlt => 12,
        PrimaryOrderType::MultiScrBlt => 8,
        PrimaryOrderType::PolygonSc => 7,
        PrimaryOrderType::PolygonCb => 13,
        PrimaryOrderType::FastGlyph => 14,
        PrimaryOrderType::EllipseCb => 13,
        _ => 0,
    }
}

/// One decoded primary order, named variants for the kinds this proxy gives
/// individually fielded structs, [`GenericPrimaryOrder`] for the rest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryOrder {
    DstBlt(DstBltOrder),
    PatBlt(PatBltOrder),
    ScrBlt(ScrBltOrder),
    LineTo(LineToOrder),
    OpaqueRect(OpaqueRectOrder),
    MemBlt(MemBltOrder),
    Mem3Blt(Mem3BltOrder),
    MultiDstBlt(MultiDstBltOrder),
    MultiOpaqueRect(MultiOpaqueRectOrder),
    GlyphIndex(GlyphIndexOrder),
    FastIndex(FastIndexOrder),
    Polyline(PolylineOrder),
    EllipseSc(EllipseScOrder),
    Generic(GenericPrimaryOrder),
}

/// Persists per-order-kind state across the life of a session, since any
/// field a server omits keeps its last transmitted value.
#[derive(Debug, Default)]
pub struct PrimaryContext {
    last_order_type: Option<PrimaryOrderType>,
    pub bounds: Bounds,
    pub bounded: bool,
    dst_blt: DstBltState,
    dst_blt_rop: u8,
    pat_blt: PatBltState,
    scr_blt: ScrBltState,
    line_to: LineToState,
    opaque_rect: OpaqueRectState,
    mem_blt: MemBltState,
    mem3_blt: Mem3BltState,
    multi_dst_blt: MultiDstBltState,
    multi_opaque_rect: MultiOpaqueRectState,
    glyph_index: GlyphIndexState,
    fast_index: FastIndexState,
    polyline: PolylineState,
    ellipse_sc: EllipseScState,
    generic: [GenericPrimaryState; 9],
}

impl PrimaryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the order-type/bounds preamble shared by every primary order
    /// and dispatches to the right per-kind decoder, returning the decoded
    /// order.
    pub fn parse(&mut self, src: &mut ReadCursor<'_>, raw_flags: u8) -> PduResult<PrimaryOrder> {
        let kind = if raw_flags & ControlFlags::TYPE_CHANGE.bits() != 0 {
            ensure_size!(ctx: NAME, in: src, size: 1);
            let kind = PrimaryOrderType::from_u8(src.read_u8())?;
            self.last_order_type = Some(kind);
            kind
        } else {
            self.last_order_type
                .ok_or_else(|| invalid_field_err!(NAME, "orderType", "no previous order type to repeat"))?
        };

        self.bounded = raw_flags & ControlFlags::BOUNDS.bits() != 0;
        if self.bounded && raw_flags & ControlFlags::ZERO_BOUNDS_DELTAS.bits() == 0 {
            self.bounds.update(src)?;
        }

        Ok(match kind {
            PrimaryOrderType::DstBlt => PrimaryOrder::DstBlt(self.dst_blt.update(src, raw_flags, &mut self.dst_blt_rop)?),
            PrimaryOrderType::PatBlt => PrimaryOrder::PatBlt(self.pat_blt.update(src, raw_flags)?),
            PrimaryOrderType::ScrBlt => PrimaryOrder::ScrBlt(self.scr_blt.update(src, raw_flags)?),
            PrimaryOrderType::LineTo => PrimaryOrder::LineTo(self.line_to.update(src, raw_flags)?),
            PrimaryOrderType::OpaqueRect => PrimaryOrder::OpaqueRect(self.opaque_rect.update(src, raw_flags)?),
            PrimaryOrderType::MemBlt => PrimaryOrder::MemBlt(self.mem_blt.update(src, raw_flags)?),
            PrimaryOrderType::Mem3Blt => PrimaryOrder::Mem3Blt(self.mem3_blt.update(src, raw_flags)?),
            PrimaryOrderType::MultiDstBlt => PrimaryOrder::MultiDstBlt(self.multi_dst_blt.update(src, raw_flags)?),
            PrimaryOrderType::MultiOpaqueRect => {
                PrimaryOrder::MultiOpaqueRect(self.multi_opaque_rect.update(src, raw_flags)?)
            }
            PrimaryOrderType::GlyphIndex => PrimaryOrder::GlyphIndex(self.glyph_index.update(src, raw_flags)?),
            PrimaryOrderType::FastIndex => PrimaryOrder::FastIndex(self.fast_index.update(src, raw_flags)?),
            PrimaryOrderType::Polyline => PrimaryOrder::Polyline(self.polyline.update(src, raw_flags)?),
            PrimaryOrderType::EllipseSc => PrimaryOrder::EllipseSc(self.ellipse_sc.update(src, raw_flags)?),
            other => {
                let slot = generic_slot(other);
                let num_fields = generic_field_count(other);
                PrimaryOrder::Generic(self.generic[slot].update(src, raw_flags, other, num_fields)?)
            }
        })
    }
}

fn generic_slot(kind: PrimaryOrderType) -> usize {
    match kind {
        PrimaryOrderType::DrawNineGrid => 0,
        PrimaryOrderType::MultiDrawNineGrid => 1,
        PrimaryOrderType::SaveBitmap => 2,
        PrimaryOrderType::MultiPatBlt => 3,
        PrimaryOrderType::MultiScrBlt => 4,
        PrimaryOrderType::PolygonSc => 5,
        PrimaryOrderType::PolygonCb => 6,
        PrimaryOrderType::FastGlyph => 7,
        PrimaryOrderType::EllipseCb => 8,
        _ => unreachable!("generic_slot called for a bespoke order kind"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrdp_core::WriteCursor;

    /// Encodes one delta-coded value the way a server would, inverse of
    /// [`read_delta`]; only needed to build test fixtures since this proxy
    /// never re-encodes drawing orders (it relays the server's own bytes).
    fn write_delta(dst: &mut WriteCursor<'_>, mut value: i32) {
        if (-64..64).contains(&value) {
            let byte = if value < 0 { ((value + 128) & 0x7F) as u8 } else { value as u8 };
            dst.write_u8(byte);
        } else {
            value = value.clamp(-8192, 8191);
            let sign_bit = if value < 0 { 0x40 } else { 0x00 };
            let magnitude = (value.unsigned_abs() & 0x3F_FF) as u16;
            let high = ((magnitude >> 8) as u8 & 0x3F) | sign_bit | 0x80;
            let low = (magnitude & 0xFF) as u8;
            dst.write_u8(high);
            dst.write_u8(low);
        }
    }

    /// Encodes a DSTBLT order the way a server would: type change, all
    /// fields present, absolute coordinates.
    fn encode_dstblt_absolute(left: i16, top: i16, width: i16, height: i16, rop: u8) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(0x1F); // fieldFlags: 5 bits set
        buf.extend_from_slice(&left.to_le_bytes());
        buf.extend_from_slice(&top.to_le_bytes());
        buf.extend_from_slice(&width.to_le_bytes());
        buf.extend_from_slice(&height.to_le_bytes());
        buf.push(rop);
        buf
    }

    #[test]
    fn dstblt_decodes_absolute_fields_on_type_change() {
        let mut ctx = PrimaryContext::new();
        let body = encode_dstblt_absolute(10, 20, 100, 50, 0xCC);
        let mut full = vec![0x00u8]; // orderType: DSTBLT
        full.extend_from_slice(&body);

        let raw_flags = ControlFlags::TYPE_CHANGE.bits();
        let order = ctx.parse(&mut ReadCursor::new(&full), raw_flags).unwrap();
        match order {
            PrimaryOrder::DstBlt(dstblt) => {
                assert_eq!(dstblt.left, 10);
                assert_eq!(dstblt.top, 20);
                assert_eq!(dstblt.width, 100);
                assert_eq!(dstblt.height, 50);
                assert_eq!(dstblt.rop, 0xCC);
            }
            other => panic!("expected DstBlt, got {other:?}"),
        }
    }

    #[test]
    fn dstblt_delta_round_trips_against_persisted_state() {
        // First order establishes absolute state, second uses small deltas.
        let mut ctx = PrimaryContext::new();
        let mut first = vec![0x00u8];
        first.extend_from_slice(&encode_dstblt_absolute(10, 20, 100, 50, 1));
        ctx.parse(&mut ReadCursor::new(&first), ControlFlags::TYPE_CHANGE.bits()).unwrap();

        // Second order: no type change (repeat DSTBLT), delta coords, only left/top set.
        let mut buf = vec![0u8; 16];
        let mut dst = WriteCursor::new(&mut buf);
        dst.write_u8(0b0000_0011); // fieldFlags: left, top
        write_delta(&mut dst, 5); // left += 5
        write_delta(&mut dst, -3); // top -= 3
        let written = dst.pos();
        buf.truncate(written);

        let raw_flags = ControlFlags::DELTA_COORDS.bits();
        let order = ctx.parse(&mut ReadCursor::new(&buf), raw_flags).unwrap();
        match order {
            PrimaryOrder::DstBlt(dstblt) => {
                assert_eq!(dstblt.left, 15);
                assert_eq!(dstblt.top, 17);
                assert_eq!(dstblt.width, 100, "omitted field keeps its persisted value");
                assert_eq!(dstblt.height, 50);
                assert_eq!(dstblt.rop, 1);
            }
            other => panic!("expected DstBlt, got {other:?}"),
        }
    }

    #[test]
    fn unassigned_order_type_is_rejected() {
        let mut ctx = PrimaryContext::new();
        let full = vec![0x03u8]; // gap in the orderType space
        let err = ctx
            .parse(&mut ReadCursor::new(&full), ControlFlags::TYPE_CHANGE.bits())
            .unwrap_err();
        assert!(matches!(err.kind(), pyrdp_pdu::PduErrorKind::InvalidField { .. }));
    }

    #[test]
    fn generic_kind_persists_unset_fields_too() {
        let mut ctx = PrimaryContext::new();
        let mut full = vec![0x07u8]; // DRAW_NINE_GRID
        full.push(0b0000_0001); // fieldFlags: field 0 only
        full.extend_from_slice(&42i16.to_le_bytes());

        let order = ctx.parse(&mut ReadCursor::new(&full), ControlFlags::TYPE_CHANGE.bits()).unwrap();
        match order {
            PrimaryOrder::Generic(generic) => {
                assert_eq!(generic.kind, PrimaryOrderType::DrawNineGrid);
                assert_eq!(generic.fields[0], 42);
                assert_eq!(generic.fields[1], 0);
            }
            other => panic!("expected Generic, got {other:?}"),
        }
    }
}
