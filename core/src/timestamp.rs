// Packed FAT date/time words.
// date: bits 15-9 year since 1980, 8-5 month, 4-0 day
// time: bits 15-11 hour, 10-5 minute, 4-0 seconds / 2

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

/// Packs a calendar timestamp into FAT date/time words. Years outside the
/// representable 1980..=2107 range are clamped.
pub fn encode(ts: NaiveDateTime) -> (u16, u16) {
    let year = (ts.year().clamp(1980, 2107) - 1980) as u16;
    let date = (year << 9) | ((ts.month() as u16) << 5) | ts.day() as u16;
    let time = ((ts.hour() as u16) << 11) | ((ts.minute() as u16) << 5) | (ts.second() as u16 / 2);
    (date, time)
}

/// Unpacks FAT date/time words; `None` when the words do not hold a valid
/// calendar value (e.g. the zeroed stamp of an unset entry).
pub fn decode(date: u16, time: u16) -> Option<NaiveDateTime> {
    let year = 1980 + (date >> 9) as i32;
    let month = ((date >> 5) & 0x0F) as u32;
    let day = (date & 0x1F) as u32;
    let hour = (time >> 11) as u32;
    let minute = ((time >> 5) & 0x3F) as u32;
    let second = ((time & 0x1F) as u32) * 2;

    let d = NaiveDate::from_ymd_opt(year, month, day)?;
    let t = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(NaiveDateTime::new(d, t))
}
