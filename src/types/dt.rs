//! Date/time conversions.
//!
//! Postgres counts days and microseconds from 2000-01-01. Values that fall
//! outside the client range (years 1 through 9999) are rendered as text in
//! the server's own ISO notation, including the `infinity` specials.
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::error::DecodeError;
use crate::session::Session;
use crate::value::{PgInterval, PgValue};

use super::{read_array, utf8};

pub(crate) const USECS_PER_SEC: i64 = 1_000_000;
pub(crate) const USECS_PER_MINUTE: i64 = 60 * USECS_PER_SEC;
pub(crate) const USECS_PER_HOUR: i64 = 60 * USECS_PER_MINUTE;
pub(crate) const USECS_PER_DAY: i64 = 24 * USECS_PER_HOUR;

/// Julian day number of the postgres epoch 2000-01-01.
pub(crate) const PG_EPOCH_JDAY: i64 = 2_451_545;

/// Postgres day numbers of 0001-01-01 and 9999-12-31, the client range.
const MIN_PG_DAY: i64 = -730_119;
const MAX_PG_DAY: i64 = 2_921_939;

const MIN_PG_TIMESTAMP: i64 = MIN_PG_DAY * USECS_PER_DAY;
const MAX_PG_TIMESTAMP: i64 = (MAX_PG_DAY + 1) * USECS_PER_DAY - 1;

// ===== date =====

fn date_from_pg_day(day: i64) -> Option<Date> {
    if !(MIN_PG_DAY..=MAX_PG_DAY).contains(&day) {
        return None;
    }
    Date::from_julian_day((day + PG_EPOCH_JDAY) as i32).ok()
}

pub(crate) fn date_to_pg_day(date: Date) -> i32 {
    date.to_julian_day() - PG_EPOCH_JDAY as i32
}

/// Julian day expansion for values beyond the client date range, inspired
/// by the postgres server code.
fn date_parts_from_day(pg_day: i64) -> (i64, u8, u8) {
    let mut julian = pg_day + 2_483_589;
    let quad = julian.div_euclid(146_097);
    let extra = julian.rem_euclid(146_097) * 4 + 3;
    julian += 60 + quad * 3 + extra.div_euclid(146_097);
    let quad2 = julian.div_euclid(1461);
    julian = julian.rem_euclid(1461);
    let mut year = julian * 4 / 1461;
    julian = if year != 0 { (julian + 305) % 365 } else { (julian + 306) % 366 } + 123;
    year += quad2 * 4;
    let quad3 = julian * 2141 / 65536;
    (
        year - 4800,
        ((quad3 + 10) % 12 + 1) as u8,
        (julian - 7834 * quad3 / 256) as u8,
    )
}

/// Render a date outside the client range the way the server would.
fn out_of_range_date(pg_day: i64) -> String {
    let (year, month, day) = date_parts_from_day(pg_day);
    if year > 0 {
        format!("{year}-{month:02}-{day:02}")
    } else {
        // there is no year zero
        format!("{:04}-{month:02}-{day:02} BC", -(year - 1))
    }
}

pub(crate) fn txt_date(session: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let text = utf8(buf)?;
    if session.iso_dates() && text.len() == 10 {
        if let Some(date) = parse_iso_date(text) {
            return Ok(PgValue::Date(date));
        }
    }
    Ok(PgValue::Text(text.to_owned()))
}

pub(crate) fn bin_date(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let pg_day = i32::from_be_bytes(read_array(buf)?);
    if pg_day == i32::MAX {
        return Ok(PgValue::Text("infinity".into()));
    }
    if pg_day == i32::MIN {
        return Ok(PgValue::Text("-infinity".into()));
    }
    Ok(match date_from_pg_day(pg_day as i64) {
        Some(date) => PgValue::Date(date),
        None => PgValue::Text(out_of_range_date(pg_day as i64)),
    })
}

// ===== time =====

/// Split a day-relative microsecond count into clock fields.
///
/// Hour 24 is accepted and wraps to 0, like the server accepts `24:00`.
fn time_parts(value: i64) -> Result<(u8, u8, u8, u32), DecodeError> {
    let hour = value.div_euclid(USECS_PER_HOUR);
    let rest = value.rem_euclid(USECS_PER_HOUR);
    if !(0..=24).contains(&hour) {
        return Err(DecodeError::new("time value out of range"));
    }
    let minute = rest / USECS_PER_MINUTE;
    let rest = rest % USECS_PER_MINUTE;
    let second = rest / USECS_PER_SEC;
    let usec = rest % USECS_PER_SEC;
    Ok(((hour % 24) as u8, minute as u8, second as u8, usec as u32))
}

fn make_time(h: u8, m: u8, s: u8, usec: u32) -> Result<Time, DecodeError> {
    Time::from_hms_micro(h, m, s, usec).map_err(|_| DecodeError::new("invalid time value"))
}

pub(crate) fn txt_time(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let (time, rest) = parse_clock(utf8(buf)?)?;
    if !rest.is_empty() {
        return Err(DecodeError::new("invalid time value"));
    }
    Ok(PgValue::Time(time))
}

pub(crate) fn bin_time(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let value = i64::from_be_bytes(read_array(buf)?);
    let (h, m, s, usec) = time_parts(value)?;
    Ok(PgValue::Time(make_time(h, m, s, usec)?))
}

pub(crate) fn txt_timetz(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let (time, rest) = parse_clock(utf8(buf)?)?;
    let offset =
        parse_utc_offset(rest).ok_or_else(|| DecodeError::new("invalid timetz value"))?;
    Ok(PgValue::TimeTz(time, offset))
}

pub(crate) fn bin_timetz(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let raw: [u8; 12] = read_array(buf)?;
    let value = i64::from_be_bytes(raw[..8].try_into().unwrap());
    // the wire carries seconds west of greenwich, the client counts east
    let offset_secs = -i32::from_be_bytes(raw[8..].try_into().unwrap());
    let (h, m, s, usec) = time_parts(value)?;
    let offset = UtcOffset::from_whole_seconds(offset_secs)
        .map_err(|_| DecodeError::new("invalid timetz offset"))?;
    Ok(PgValue::TimeTz(make_time(h, m, s, usec)?, offset))
}

// ===== timestamp =====

fn out_of_range_timestamp(value: i64, utc_suffix: bool) -> String {
    let pg_day = value.div_euclid(USECS_PER_DAY);
    let time = value.rem_euclid(USECS_PER_DAY);
    let (year, month, day) = date_parts_from_day(pg_day);
    let hour = time / USECS_PER_HOUR;
    let minute = time % USECS_PER_HOUR / USECS_PER_MINUTE;
    let second = time % USECS_PER_MINUTE / USECS_PER_SEC;
    let usec = time % USECS_PER_SEC;

    let (year, bc) = if year < 1 { (-year + 1, " BC") } else { (year, "") };
    let frac = if usec != 0 {
        let mut s = format!(".{usec:06}");
        s.truncate(s.trim_end_matches('0').len());
        s
    } else {
        String::new()
    };
    let tz = if utc_suffix { "+00" } else { "" };
    format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}{frac}{tz}{bc}")
}

pub(crate) fn txt_timestamp(session: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let text = utf8(buf)?;
    if session.iso_dates() {
        if let Some((datetime, rest)) = parse_iso_datetime(text) {
            if rest.is_empty() {
                return Ok(PgValue::Timestamp(datetime));
            }
        }
    }
    Ok(PgValue::Text(text.to_owned()))
}

pub(crate) fn bin_timestamp(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let value = i64::from_be_bytes(read_array(buf)?);
    if value == i64::MAX {
        return Ok(PgValue::Text("infinity".into()));
    }
    if value == i64::MIN {
        return Ok(PgValue::Text("-infinity".into()));
    }

    let pg_day = value.div_euclid(USECS_PER_DAY);
    let time = value.rem_euclid(USECS_PER_DAY);
    match date_from_pg_day(pg_day) {
        Some(date) => {
            let (h, m, s, usec) = time_parts(time)?;
            Ok(PgValue::Timestamp(PrimitiveDateTime::new(date, make_time(h, m, s, usec)?)))
        }
        None => Ok(PgValue::Text(out_of_range_timestamp(value, false))),
    }
}

pub(crate) fn txt_timestamptz(session: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let text = utf8(buf)?;
    if session.iso_dates() {
        if let Some((datetime, rest)) = parse_iso_datetime(text) {
            if let Some(offset) = parse_utc_offset(rest) {
                return Ok(PgValue::TimestampTz(datetime.assume_offset(offset)));
            }
        }
    }
    Ok(PgValue::Text(text.to_owned()))
}

/// Binary `timestamptz` carries UTC microseconds.
///
/// The instant is localised to the session offset when one is set. When
/// the UTC value itself falls outside the client range the session offset
/// may still pull it back in; otherwise the server's ISO rendering with a
/// `+00` suffix is returned.
pub(crate) fn bin_timestamptz(session: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let value = i64::from_be_bytes(read_array(buf)?);
    if value == i64::MAX {
        return Ok(PgValue::Text("infinity".into()));
    }
    if value == i64::MIN {
        return Ok(PgValue::Text("-infinity".into()));
    }

    let timezone = session.timezone();

    if (MIN_PG_TIMESTAMP..=MAX_PG_TIMESTAMP).contains(&value) {
        let utc = datetime_from_usecs(value)?.assume_utc();
        let localised = match timezone {
            // localisation can push year 1 / 9999 edges out of range, in
            // which case the UTC instant is returned as is
            Some(offset) => utc.checked_to_offset(offset).unwrap_or(utc),
            None => utc,
        };
        return Ok(PgValue::TimestampTz(localised));
    }

    if let Some(offset) = timezone {
        // The UTC value is outside the client range, but the session offset
        // may land the local rendering just inside it.
        let adjusted = value.saturating_add(offset.whole_seconds() as i64 * USECS_PER_SEC);
        if (MIN_PG_TIMESTAMP..=MAX_PG_TIMESTAMP).contains(&adjusted) {
            let local = datetime_from_usecs(adjusted)?;
            return Ok(PgValue::TimestampTz(local.assume_offset(offset)));
        }
    }

    Ok(PgValue::Text(out_of_range_timestamp(value, true)))
}

fn datetime_from_usecs(value: i64) -> Result<PrimitiveDateTime, DecodeError> {
    let pg_day = value.div_euclid(USECS_PER_DAY);
    let time = value.rem_euclid(USECS_PER_DAY);
    let date = date_from_pg_day(pg_day)
        .ok_or_else(|| DecodeError::new("timestamp out of range"))?;
    let (h, m, s, usec) = time_parts(time)?;
    Ok(PrimitiveDateTime::new(date, make_time(h, m, s, usec)?))
}

pub(crate) fn time_to_usecs(time: Time) -> i64 {
    time.hour() as i64 * USECS_PER_HOUR
        + time.minute() as i64 * USECS_PER_MINUTE
        + time.second() as i64 * USECS_PER_SEC
        + time.microsecond() as i64
}

pub(crate) fn timestamp_to_usecs(datetime: PrimitiveDateTime) -> i64 {
    date_to_pg_day(datetime.date()) as i64 * USECS_PER_DAY + time_to_usecs(datetime.time())
}

pub(crate) fn timestamptz_to_usecs(datetime: OffsetDateTime) -> i64 {
    // via the unix epoch; shifting the date to UTC first could leave the
    // representable year range at the edges
    const UNIX_TO_PG_SECS: i64 = 946_684_800;
    (datetime.unix_timestamp_nanos() / 1_000) as i64 - UNIX_TO_PG_SECS * USECS_PER_SEC
}

// ===== interval =====

pub(crate) fn bin_interval(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let raw: [u8; 16] = read_array(buf)?;
    Ok(PgValue::Interval(PgInterval {
        microseconds: i64::from_be_bytes(raw[..8].try_into().unwrap()),
        days: i32::from_be_bytes(raw[8..12].try_into().unwrap()),
        months: i32::from_be_bytes(raw[12..].try_into().unwrap()),
    }))
}

/// Textual intervals are only parsed in the `postgres` IntervalStyle,
/// e.g. `1 year 2 mons 3 days 04:05:06.789` or `-00:00:01`.
pub(crate) fn txt_interval(session: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    let text = utf8(buf)?;
    if !session.postgres_intervals() {
        return Ok(PgValue::Text(text.to_owned()));
    }

    let parts: Vec<&str> = text.split(' ').collect();
    let mut microseconds = 0i64;
    let mut unit_parts = &parts[..];

    if parts.len() % 2 == 1 {
        // odd part count means a trailing clock component
        let mut clock = *parts.last().expect("split yields at least one part");
        let negative = match clock.as_bytes().first() {
            Some(b'-') => {
                clock = &clock[1..];
                true
            }
            Some(b'+') => {
                clock = &clock[1..];
                false
            }
            _ => false,
        };
        let (time, rest) = parse_clock(clock)?;
        if !rest.is_empty() {
            return Err(DecodeError::new("invalid interval value"));
        }
        microseconds = time_to_usecs(time);
        if negative {
            microseconds = -microseconds;
        }
        unit_parts = &parts[..parts.len() - 1];
    }

    let mut years = 0i64;
    let mut months = 0i64;
    let mut days = 0i64;
    for chunk in unit_parts.chunks(2) {
        let [num, unit] = chunk else {
            return Err(DecodeError::new("invalid interval value"));
        };
        let num: i64 = num
            .parse()
            .map_err(|_| DecodeError::new("invalid interval value"))?;
        if unit.starts_with("y") {
            years = num;
        } else if unit.starts_with("mo") {
            months = num;
        } else if unit.starts_with("d") {
            days = num;
        } else {
            return Err(DecodeError::new("invalid interval value"));
        }
    }

    Ok(PgValue::Interval(PgInterval {
        months: (years * 12 + months) as i32,
        days: days as i32,
        microseconds,
    }))
}

// ===== text parsing helpers =====

fn digits2(b: &[u8]) -> Option<u8> {
    match b {
        [a @ b'0'..=b'9', b @ b'0'..=b'9'] => Some((a - b'0') * 10 + (b - b'0')),
        _ => None,
    }
}

fn parse_iso_date(text: &str) -> Option<Date> {
    let b = text.as_bytes();
    let [y1, y2, y3, y4, b'-', m1, m2, b'-', d1, d2] = b else {
        return None;
    };
    let year = digits2(&[*y1, *y2])? as i32 * 100 + digits2(&[*y3, *y4])? as i32;
    let month = digits2(&[*m1, *m2])?;
    let day = digits2(&[*d1, *d2])?;
    Date::from_calendar_date(year, time::Month::try_from(month).ok()?, day).ok()
}

/// Parse `HH:MM:SS[.1-6 digits]`, returning the remainder of the input.
///
/// Hour 24 wraps to 0, matching the server's acceptance of `24:00:00`.
fn parse_clock(text: &str) -> Result<(Time, &str), DecodeError> {
    let invalid = || DecodeError::new("invalid time value");
    let b = text.as_bytes();
    let [h1, h2, b':', m1, m2, b':', s1, s2, rest @ ..] = b else {
        return Err(invalid());
    };
    let mut hour = digits2(&[*h1, *h2]).ok_or_else(invalid)?;
    if hour == 24 {
        hour = 0;
    }
    let minute = digits2(&[*m1, *m2]).ok_or_else(invalid)?;
    let second = digits2(&[*s1, *s2]).ok_or_else(invalid)?;

    let (usec, consumed) = match rest {
        [b'.', frac @ ..] => {
            let digits = frac.iter().take_while(|b| b.is_ascii_digit()).count();
            if !(1..=6).contains(&digits) {
                return Err(invalid());
            }
            let mut usec = 0u32;
            for d in &frac[..digits] {
                usec = usec * 10 + (d - b'0') as u32;
            }
            usec *= 10u32.pow(6 - digits as u32);
            (usec, 1 + digits)
        }
        _ => (0, 0),
    };

    let time = make_time(hour, minute, second, usec)?;
    Ok((time, &text[8 + consumed..]))
}

/// Parse a `YYYY-MM-DD HH:MM:SS[.frac]` prefix with a strict four digit
/// year, returning the remainder of the input.
fn parse_iso_datetime(text: &str) -> Option<(PrimitiveDateTime, &str)> {
    if text.len() < 19 || text.as_bytes()[10] != b' ' {
        return None;
    }
    let date = parse_iso_date(&text[..10])?;
    let (time, rest) = parse_clock(&text[11..]).ok()?;
    Some((PrimitiveDateTime::new(date, time), rest))
}

/// Parse `(+|-)HH[:MM[:SS]]` covering the whole input.
fn parse_utc_offset(text: &str) -> Option<UtcOffset> {
    let negative = match text.as_bytes().first() {
        Some(b'+') => false,
        Some(b'-') => true,
        _ => return None,
    };
    let mut parts = text[1..].splitn(3, ':');
    let hours: i32 = parts.next()?.parse().ok()?;
    let minutes: i32 = parts.next().map_or(Some(0), |m| m.parse().ok())?;
    let seconds: i32 = parts.next().map_or(Some(0), |s| s.parse().ok())?;

    let mut total = hours * 3600 + minutes * 60 + seconds;
    if negative {
        total = -total;
    }
    UtcOffset::from_whole_seconds(total).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, time};

    fn iso_session() -> Session {
        let mut session = Session::new();
        session.update("DateStyle", "ISO, MDY").unwrap();
        session.update("IntervalStyle", "postgres").unwrap();
        session
    }

    fn tz_session(offset: &str) -> Session {
        let mut session = iso_session();
        session.update("TimeZone", offset).unwrap();
        session
    }

    #[test]
    fn binary_date_specials() {
        let s = iso_session();
        assert_eq!(
            bin_date(&s, &i32::MAX.to_be_bytes()).unwrap(),
            PgValue::Text("infinity".into()),
        );
        assert_eq!(
            bin_date(&s, &i32::MIN.to_be_bytes()).unwrap(),
            PgValue::Text("-infinity".into()),
        );
    }

    #[test]
    fn binary_date_around_the_epoch() {
        let s = iso_session();
        assert_eq!(bin_date(&s, &0i32.to_be_bytes()).unwrap(), PgValue::Date(date!(2000-01-01)));
        assert_eq!(
            bin_date(&s, &(-1i32).to_be_bytes()).unwrap(),
            PgValue::Date(date!(1999-12-31)),
        );
        assert_eq!(
            bin_date(&s, &(MAX_PG_DAY as i32).to_be_bytes()).unwrap(),
            PgValue::Date(date!(9999-12-31)),
        );
        assert_eq!(
            bin_date(&s, &(MIN_PG_DAY as i32).to_be_bytes()).unwrap(),
            PgValue::Date(date!(0001-01-01)),
        );
    }

    #[test]
    fn binary_date_beyond_range_renders_bc() {
        let s = iso_session();
        let val = bin_date(&s, &((MIN_PG_DAY - 1) as i32).to_be_bytes()).unwrap();
        assert_eq!(val, PgValue::Text("0001-12-31 BC".into()));
    }

    #[test]
    fn textual_date_needs_iso_style() {
        let mut s = Session::new();
        assert_eq!(
            txt_date(&s, b"2021-03-15").unwrap(),
            PgValue::Text("2021-03-15".into()),
        );
        s.update("DateStyle", "ISO, MDY").unwrap();
        assert_eq!(txt_date(&s, b"2021-03-15").unwrap(), PgValue::Date(date!(2021-03-15)));
    }

    #[test]
    fn binary_time_accepts_hour_24() {
        let s = iso_session();
        assert_eq!(
            bin_time(&s, &(24 * USECS_PER_HOUR).to_be_bytes()).unwrap(),
            PgValue::Time(time!(00:00:00)),
        );
        assert!(bin_time(&s, &(25 * USECS_PER_HOUR).to_be_bytes()).is_err());
    }

    #[test]
    fn textual_time_with_fraction() {
        let s = iso_session();
        assert_eq!(
            txt_time(&s, b"13:09:25.0001").unwrap(),
            PgValue::Time(time!(13:09:25.0001)),
        );
        assert_eq!(txt_time(&s, b"24:00:00").unwrap(), PgValue::Time(time!(00:00:00)));
        assert!(txt_time(&s, b"13:09").is_err());
    }

    #[test]
    fn binary_timetz_negates_wire_offset() {
        let s = iso_session();
        let mut buf = Vec::new();
        buf.extend_from_slice(&(13 * USECS_PER_HOUR).to_be_bytes());
        buf.extend_from_slice(&(-7200i32).to_be_bytes());
        assert_eq!(
            bin_timetz(&s, &buf).unwrap(),
            PgValue::TimeTz(time!(13:00:00), UtcOffset::from_whole_seconds(7200).unwrap()),
        );
    }

    #[test]
    fn binary_timestamp_roundtrip() {
        let s = iso_session();
        let expected = datetime!(2021-03-15 14:10:03.123456);
        let usecs = timestamp_to_usecs(expected);
        assert_eq!(bin_timestamp(&s, &usecs.to_be_bytes()).unwrap(), PgValue::Timestamp(expected));
    }

    #[test]
    fn binary_timestamp_specials_and_bc() {
        let s = iso_session();
        assert_eq!(
            bin_timestamp(&s, &i64::MAX.to_be_bytes()).unwrap(),
            PgValue::Text("infinity".into()),
        );
        let before_range = (MIN_PG_DAY - 1) * USECS_PER_DAY + 3 * USECS_PER_HOUR;
        assert_eq!(
            bin_timestamp(&s, &before_range.to_be_bytes()).unwrap(),
            PgValue::Text("0001-12-31 03:00:00 BC".into()),
        );
    }

    #[test]
    fn textual_timestamp_parses_iso_only() {
        let s = iso_session();
        assert_eq!(
            txt_timestamp(&s, b"2021-03-15 14:10:03.123").unwrap(),
            PgValue::Timestamp(datetime!(2021-03-15 14:10:03.123)),
        );
        assert_eq!(
            txt_timestamp(&s, b"20210-03-15 14:10:03").unwrap(),
            PgValue::Text("20210-03-15 14:10:03".into()),
        );
    }

    #[test]
    fn binary_timestamptz_localises_to_session_offset() {
        let utc_value = timestamp_to_usecs(datetime!(2021-06-01 12:00:00));

        let s = iso_session();
        assert_eq!(
            bin_timestamptz(&s, &utc_value.to_be_bytes()).unwrap(),
            PgValue::TimestampTz(datetime!(2021-06-01 12:00:00 UTC)),
        );

        let s = tz_session("+02:00");
        assert_eq!(
            bin_timestamptz(&s, &utc_value.to_be_bytes()).unwrap(),
            PgValue::TimestampTz(datetime!(2021-06-01 14:00:00 +02:00)),
        );
    }

    #[test]
    fn binary_timestamptz_edge_rescued_by_offset() {
        // One hour before 0001-01-01 00:00 UTC: out of range in UTC, but a
        // +02:00 session renders it as 01:00 on the first day.
        let value = MIN_PG_TIMESTAMP - USECS_PER_HOUR;
        let s = tz_session("+02:00");
        assert_eq!(
            bin_timestamptz(&s, &value.to_be_bytes()).unwrap(),
            PgValue::TimestampTz(datetime!(0001-01-01 01:00:00 +02:00)),
        );

        // without the offset the ISO rendering is returned
        let s = iso_session();
        assert_eq!(
            bin_timestamptz(&s, &value.to_be_bytes()).unwrap(),
            PgValue::Text("0001-12-31 23:00:00+00 BC".into()),
        );
    }

    #[test]
    fn textual_timestamptz_carries_its_offset() {
        let s = iso_session();
        assert_eq!(
            txt_timestamptz(&s, b"2021-03-15 14:10:03+02").unwrap(),
            PgValue::TimestampTz(datetime!(2021-03-15 14:10:03 +02:00)),
        );
        assert_eq!(
            txt_timestamptz(&s, b"2021-03-15 14:10:03-05:30").unwrap(),
            PgValue::TimestampTz(datetime!(2021-03-15 14:10:03 -05:30)),
        );
    }

    #[test]
    fn binary_interval_field_order() {
        let s = iso_session();
        let mut buf = Vec::new();
        buf.extend_from_slice(&(5 * USECS_PER_SEC).to_be_bytes());
        buf.extend_from_slice(&3i32.to_be_bytes());
        buf.extend_from_slice(&14i32.to_be_bytes());
        assert_eq!(
            bin_interval(&s, &buf).unwrap(),
            PgValue::Interval(PgInterval { months: 14, days: 3, microseconds: 5 * USECS_PER_SEC }),
        );
    }

    #[test]
    fn textual_interval_postgres_style() {
        let s = iso_session();
        assert_eq!(
            txt_interval(&s, b"1 year 2 mons 3 days 04:05:06.789").unwrap(),
            PgValue::Interval(PgInterval {
                months: 14,
                days: 3,
                microseconds: 4 * USECS_PER_HOUR
                    + 5 * USECS_PER_MINUTE
                    + 6 * USECS_PER_SEC
                    + 789_000,
            }),
        );
        assert_eq!(
            txt_interval(&s, b"-00:00:01").unwrap(),
            PgValue::Interval(PgInterval { months: 0, days: 0, microseconds: -USECS_PER_SEC }),
        );
    }

    #[test]
    fn textual_interval_other_styles_stay_text() {
        let mut s = Session::new();
        s.update("IntervalStyle", "iso_8601").unwrap();
        assert_eq!(
            txt_interval(&s, b"P1Y2M3D").unwrap(),
            PgValue::Text("P1Y2M3D".into()),
        );
    }
}
