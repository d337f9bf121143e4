//! # Positions
//!
//! Every positional argument goes through `IntoPosition` before the index
//! set or the table is touched, so malformed input fails fast.
//!
//! Accepted inputs:
//! - unsigned integers, as-is
//! - signed integers, when non-negative
//! - strings holding a non-negative integer (surrounding whitespace allowed)
//!
//! Everything else is `ArrayError::InvalidArgument`.

use super::error::{ArrayError, ArrayResult};

/// Conversion into a non-negative array position
pub trait IntoPosition {
    /// Coerce into a position. `what` names the argument in error messages.
    fn into_position(self, what: &'static str) -> ArrayResult<usize>;
}

macro_rules! integer_position {
    ($($ty:ty),*) => {
        $(
            impl IntoPosition for $ty {
                fn into_position(self, what: &'static str) -> ArrayResult<usize> {
                    usize::try_from(self).map_err(|_| ArrayError::invalid(what, self))
                }
            }
        )*
    };
}

integer_position!(usize, u8, u16, u32, u64, isize, i8, i16, i32, i64);

impl IntoPosition for &str {
    fn into_position(self, what: &'static str) -> ArrayResult<usize> {
        parse_position(self).ok_or_else(|| ArrayError::invalid(what, self))
    }
}

impl IntoPosition for String {
    fn into_position(self, what: &'static str) -> ArrayResult<usize> {
        self.as_str().into_position(what)
    }
}

impl IntoPosition for &String {
    fn into_position(self, what: &'static str) -> ArrayResult<usize> {
        self.as_str().into_position(what)
    }
}

/// Parse a table key or user string as a position.
///
/// Only plain decimal digits are accepted: no sign, no fraction, no exponent.
pub(crate) fn parse_position(raw: &str) -> Option<usize> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}

/// The table key an entry at `position` is stored under
pub(crate) fn entry_key(position: usize) -> String {
    position.to_string()
}

/// The position behind `key`, if `key` is exactly what `entry_key` produces for it
pub(crate) fn is_entry_key(key: &str) -> Option<usize> {
    let position = parse_position(key)?;
    (entry_key(position) == key).then_some(position)
}
