//! Length-bounded identifier derivation.

use crate::MAX_TABLE_NAME_LENGTH;

/// Build `_<base>_<suffix>`, cutting `base` from the right until the whole
/// identifier fits in [`MAX_TABLE_NAME_LENGTH`] bytes.
///
/// The leading underscore, the separator and the suffix are never cut, so the
/// suffix is always recognisable at the end of the result.
pub fn safe_table_name(base: &str, suffix: &str) -> String {
    let name = format!("_{base}_{suffix}");
    if name.len() <= MAX_TABLE_NAME_LENGTH {
        return name;
    }
    let extra = name.len() - MAX_TABLE_NAME_LENGTH;
    let keep = base.len().saturating_sub(extra);
    format!("_{}_{suffix}", truncate_to_boundary(base, keep))
}

/// Leftmost `max_bytes` bytes of `s`, backing off to the previous char
/// boundary so a multi-byte character is never split.
pub fn truncate_to_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
