/// Bails out of the enclosing `fn` with a [`crate::ErrorKind::NotEnoughBytes`]
/// error unless `$buf` has at least `$size` bytes remaining.
#[macro_export]
macro_rules! ensure_size {
    (ctx: $ctx:expr, in: $buf:ident, size: $expected:expr) => {{
        let received = $buf.len();
        let expected = $expected;
        if received < expected {
            return Err(<$crate::Error<$crate::ErrorKind> as $crate::ErrorExt>::not_enough_bytes(
                $ctx, received, expected,
            ));
        }
    }};
    (in: $buf:ident, size: $expected:expr) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: $expected)
    }};
}

/// Shorthand for `ensure_size!` against a type's `FIXED_PART_SIZE` constant.
#[macro_export]
macro_rules! ensure_fixed_part_size {
    (in: $buf:ident) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: Self::FIXED_PART_SIZE)
    }};
}

/// Shorthand for `Err(Error::invalid_field(...))`.
#[macro_export]
macro_rules! invalid_field_err {
    ($ctx:expr, $field:expr, $reason:expr $(,)?) => {{
        <$crate::Error<$crate::ErrorKind> as $crate::ErrorExt>::invalid_field($ctx, $field, $reason)
    }};
    ($field:expr, $reason:expr $(,)?) => {{
        $crate::invalid_field_err!(Self::NAME, $field, $reason)
    }};
}

/// Casts a length-ish value (usually a `usize`) into the narrower integer
/// type a wire field requires, converting overflow into an
/// [`crate::ErrorKind::InvalidField`] error.
#[macro_export]
macro_rules! cast_length {
    ($ctx:expr, $field:expr, $len:expr) => {{
        ::core::convert::TryInto::try_into($len)
            .map_err(|_| $crate::invalid_field_err!($ctx, $field, "too many elements"))
    }};
    ($field:expr, $len:expr) => {{
        $crate::cast_length!(Self::NAME, $field, $len)
    }};
}
