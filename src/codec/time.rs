//! TIME header parsing.
//!
//! The value is `YYYYMMDDTHHMMSS` optionally followed by one timezone
//! indicator character (usually `Z`). It is not null-terminated; the header
//! length delimits it.

use chrono::{Duration, Local, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeZone};

/// Parse a TIME header value into seconds since the Unix epoch.
///
/// Without a zone indicator the fields are taken as local time and converted
/// as-is. With one, the local UTC offset is added to the converted value.
/// Out-of-range fields carry into the next unit (month 13 is January of the
/// following year) and a local time skipped by a DST change is read with the
/// offset in force before it. Returns `None` only when fewer than the six
/// numeric fields are present.
pub fn parse_iso8601(raw: &[u8]) -> Option<i64> {
    let text = std::str::from_utf8(raw).ok()?;
    let (naive, zone) = split_fields(text)?;

    let (mut time, offset) = match Local.from_local_datetime(&naive) {
        LocalResult::Single(local) | LocalResult::Ambiguous(local, _) => {
            (local.timestamp(), local.offset().fix().local_minus_utc())
        },
        LocalResult::None => {
            let offset = Local.offset_from_utc_datetime(&naive).fix().local_minus_utc();
            (naive.and_utc().timestamp() - i64::from(offset), offset)
        },
    };
    if zone.is_some() {
        time += i64::from(offset);
    }

    Some(time)
}

/// Format seconds since the epoch as a UTC TIME value (`...Z`)
pub fn format_iso8601(time: i64) -> Option<String> {
    let utc = chrono::DateTime::from_timestamp(time, 0)?;
    Some(utc.format("%Y%m%dT%H%M%SZ").to_string())
}

fn split_fields(text: &str) -> Option<(NaiveDateTime, Option<char>)> {
    let digits = |range: std::ops::Range<usize>| -> Option<i64> {
        let field = text.get(range)?;
        if !field.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        field.parse().ok()
    };

    let year = digits(0..4)?;
    let month = digits(4..6)?;
    let day = digits(6..8)?;
    if text.get(8..9)? != "T" {
        return None;
    }
    let hour = digits(9..11)?;
    let minute = digits(11..13)?;
    let second = digits(13..15)?;

    let zone = text.get(15..).and_then(|rest| rest.chars().next());

    // Month 0 is December of the year before
    let months = year * 12 + month - 1;
    let first = NaiveDate::from_ymd_opt(
        i32::try_from(months.div_euclid(12)).ok()?,
        u32::try_from(months.rem_euclid(12) + 1).ok()?,
        1,
    )?;
    let seconds = (day - 1) * 86_400 + hour * 3_600 + minute * 60 + second;
    let naive = first
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::seconds(seconds))?;
    Some((naive, zone))
}
