//! Text conversion helpers.
//!
//! Project files predate Unicode support: every human-readable cell is
//! Windows-1252, every numeric cell is ASCII decimal. Conversion to UTF-8
//! happens here, at the field boundary.

use encoding_rs::WINDOWS_1252;

pub(crate) fn from_windows_1252(bytes: &[u8]) -> String {
    let (text, _, _) = WINDOWS_1252.decode(bytes);
    text.into_owned()
}

pub(crate) fn parse_u32(bytes: &[u8]) -> Option<u32> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

pub(crate) fn parse_u64(bytes: &[u8]) -> Option<u64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

pub(crate) fn parse_i32(bytes: &[u8]) -> Option<i32> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}
