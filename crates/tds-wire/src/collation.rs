//! Collation code pages for VARCHAR decoding.
//!
//! Non-Unicode character data is stored in the code page implied by the
//! column collation's LCID. UTF-8 collations (SQL Server 2019+) set bit 27.

#[cfg(feature = "encoding")]
use encoding_rs::Encoding;

/// Flag bit indicating a UTF-8 collation.
pub const COLLATION_FLAG_UTF8: u32 = 0x0800_0000;

/// Mask for the primary language id inside an LCID.
const PRIMARY_LANGUAGE_MASK: u32 = 0x0000_03FF;

/// Returns whether the collation info describes a UTF-8 collation.
#[inline]
#[must_use]
pub fn is_utf8_collation(lcid: u32) -> bool {
    lcid & COLLATION_FLAG_UTF8 != 0
}

/// Windows code page for an LCID.
///
/// Returns `None` for UTF-8 collations. Unknown languages fall back to 1252.
#[must_use]
pub fn code_page_for_lcid(lcid: u32) -> Option<u16> {
    if is_utf8_collation(lcid) {
        return None;
    }
    let full = lcid & 0x0000_FFFF;
    // Chinese needs the sub-language to pick simplified vs traditional.
    let page = match full {
        0x0404 | 0x0C04 | 0x1404 => 950,
        0x0804 | 0x1004 => 936,
        _ => match full & PRIMARY_LANGUAGE_MASK {
            0x11 => 932,
            0x12 => 949,
            0x1E => 874,
            0x2A => 1258,
            0x05 | 0x0E | 0x15 | 0x18 | 0x1A | 0x1B | 0x24 | 0x1C => 1250,
            0x19 | 0x22 | 0x23 | 0x02 | 0x2F | 0x3F | 0x40 | 0x44 | 0x50 => 1251,
            0x08 => 1253,
            0x1F | 0x2C | 0x43 => 1254,
            0x0D => 1255,
            0x01 | 0x20 | 0x29 | 0x8C => 1256,
            0x25 | 0x26 | 0x27 => 1257,
            _ => 1252,
        },
    };
    Some(page)
}

/// Encoding for an LCID, or `None` when the data is already UTF-8.
#[cfg(feature = "encoding")]
#[must_use]
pub fn encoding_for_lcid(lcid: u32) -> Option<&'static Encoding> {
    let encoding = match code_page_for_lcid(lcid)? {
        874 => encoding_rs::WINDOWS_874,
        932 => encoding_rs::SHIFT_JIS,
        936 => encoding_rs::GBK,
        949 => encoding_rs::EUC_KR,
        950 => encoding_rs::BIG5,
        1250 => encoding_rs::WINDOWS_1250,
        1251 => encoding_rs::WINDOWS_1251,
        1253 => encoding_rs::WINDOWS_1253,
        1254 => encoding_rs::WINDOWS_1254,
        1255 => encoding_rs::WINDOWS_1255,
        1256 => encoding_rs::WINDOWS_1256,
        1257 => encoding_rs::WINDOWS_1257,
        1258 => encoding_rs::WINDOWS_1258,
        _ => encoding_rs::WINDOWS_1252,
    };
    Some(encoding)
}
