//! Built-in header definitions.
//!
//! The primary header used by the stream parser is the 6 byte CCSDS primary header
//! followed by a 10 byte secondary header carrying flash storage location and time:
//!
//! | Bytes | Fields |
//! |---|---|
//! | 0-1 | `HDR_VER`(3) `HDR_TYPE`(1) `HDR_SHDR`(1) `HDR_APID`(11) |
//! | 2-3 | `HDR_GRP`(2) `HDR_SEQ`(14) |
//! | 4-5 | `HDR_LEN`(16) |
//! | 6-15 | `HDR_SPARE`(1) `HDR_RT_PB`(1) `HDR_FLASH_PAGE`(6) `HDR_FLASH_BLOCK`(14) `HDR_TIME_VALID`(1) `HDR_YEAR`(11) `HDR_DAY`(9) `HDR_HOUR`(5) `HDR_MIN`(6) `HDR_SEC`(6) `HDR_USEC`(20) |
//!
//! Explicit offsets are given relative to the start of each field's first byte, which is
//! what places every field correctly given that windows are read sequentially.
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::{ByteOrder, Field, Fields, Kind, PacketDef};

/// Name of the header field holding the APID.
pub const APID_FIELD: &str = "HDR_APID";
/// Name of the header field holding the packet length minus 7.
pub const LENGTH_FIELD: &str = "HDR_LEN";

/// Length in bytes of the primary and secondary header.
pub const HEADER_LEN: usize = 16;

#[rustfmt::skip]
static SPACE_PACKET_HEADER: [(&str, Kind, usize, usize); 7] = [
    ("HDR_VER", Kind::Uint, 3, 0),
    ("HDR_TYPE", Kind::Uint, 1, 3),
    ("HDR_SHDR", Kind::Uint, 1, 4),
    ("HDR_APID", Kind::Uint, 11, 5),
    ("HDR_GRP", Kind::Uint, 2, 0),
    ("HDR_SEQ", Kind::Uint, 14, 2),
    ("HDR_LEN", Kind::Uint, 16, 0),
];

#[rustfmt::skip]
static SECONDARY_HEADER: [(&str, Kind, usize, usize); 11] = [
    ("HDR_SPARE", Kind::Fill, 1, 0),
    ("HDR_RT_PB", Kind::Fill, 1, 1),
    ("HDR_FLASH_PAGE", Kind::Uint, 6, 2),
    ("HDR_FLASH_BLOCK", Kind::Uint, 14, 0),
    ("HDR_TIME_VALID", Kind::Uint, 1, 6),
    ("HDR_YEAR", Kind::Uint, 11, 7),
    ("HDR_DAY", Kind::Uint, 9, 2),
    ("HDR_HOUR", Kind::Uint, 5, 3),
    ("HDR_MIN", Kind::Uint, 6, 0),
    ("HDR_SEC", Kind::Uint, 6, 6),
    ("HDR_USEC", Kind::Uint, 20, 4),
];

fn to_fields<I>(defs: I) -> Vec<Field>
where
    I: IntoIterator<Item = &'static (&'static str, Kind, usize, usize)>,
{
    defs.into_iter()
        .map(|&(name, kind, len, offset)| {
            Field::fixed(name, kind, len, Some(offset), ByteOrder::Big)
        })
        .collect()
}

/// Fields of the 6 byte CCSDS primary header.
#[must_use]
pub fn space_packet_header_fields() -> Vec<Field> {
    to_fields(SPACE_PACKET_HEADER.iter())
}

/// Fields of the full 16 byte primary and secondary header.
///
/// Body definitions are decoded from the start of the packet, so they typically begin
/// with these fields (or a 128 bit fill field) followed by the body fields.
#[must_use]
pub fn primary_header_fields() -> Vec<Field> {
    to_fields(SPACE_PACKET_HEADER.iter().chain(SECONDARY_HEADER.iter()))
}

/// Definition for the 6 byte CCSDS primary header.
#[must_use]
pub fn space_packet_header() -> PacketDef {
    PacketDef::fixed("SPACE_PACKET_HEADER", space_packet_header_fields())
}

/// Definition for the full 16 byte primary and secondary header.
#[must_use]
pub fn primary_header() -> PacketDef {
    PacketDef::fixed("PRIMARY_HEADER", primary_header_fields())
}

/// Time from decoded secondary header fields.
///
/// Returns `None` if the time valid flag is not set, any time field is missing, or the
/// fields do not form a valid time. `HDR_DAY` is the 1-based day of year.
#[must_use]
pub fn header_time(fields: &Fields) -> Option<DateTime<Utc>> {
    if fields.get_uint("HDR_TIME_VALID")? != 1 {
        return None;
    }
    let get = |name: &str| fields.get_uint(name).and_then(|v| u32::try_from(v).ok());

    let date = NaiveDate::from_yo_opt(i32::try_from(get("HDR_YEAR")?).ok()?, get("HDR_DAY")?)?;
    let dt = date.and_hms_micro_opt(
        get("HDR_HOUR")?,
        get("HDR_MIN")?,
        get("HDR_SEC")?,
        get("HDR_USEC")?,
    )?;
    Some(Utc.from_utc_datetime(&dt))
}
