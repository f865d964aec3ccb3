//! Date, time and duration values.
//!
//! Values without a timezone are placed on the UTC timeline for comparison
//! and equality. Canonical display normalizes a zero offset to `Z`, prints
//! fractional seconds with 3, 6 or 9 digits, and folds duration components
//! (`PT36H` displays as `P1DT12H`).

use chrono::{FixedOffset, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{ValueError, ValueResult};
use crate::types::Datatype;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Split a trailing `Z` or `(+|-)hh:mm` timezone from a lexical value.
fn split_offset(datatype: Datatype, lexical: &str) -> ValueResult<(&str, Option<FixedOffset>)> {
    if let Some(body) = lexical.strip_suffix('Z') {
        return Ok((body, FixedOffset::east_opt(0)));
    }
    let bytes = lexical.as_bytes();
    if bytes.len() > 6 {
        let i = bytes.len() - 6;
        if (bytes[i] == b'+' || bytes[i] == b'-') && bytes[i + 3] == b':' {
            let hours: i32 = lexical[i + 1..i + 3]
                .parse()
                .map_err(|_| ValueError::invalid(datatype, lexical, "invalid timezone hours"))?;
            let minutes: i32 = lexical[i + 4..]
                .parse()
                .map_err(|_| ValueError::invalid(datatype, lexical, "invalid timezone minutes"))?;
            if hours > 14 || minutes > 59 {
                return Err(ValueError::invalid(datatype, lexical, "timezone out of range"));
            }
            let sign = if bytes[i] == b'+' { 1 } else { -1 };
            let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
                .ok_or_else(|| ValueError::invalid(datatype, lexical, "timezone out of range"))?;
            return Ok((&lexical[..i], Some(offset)));
        }
    }
    Ok((lexical, None))
}

fn write_offset(f: &mut fmt::Formatter<'_>, offset: Option<FixedOffset>) -> fmt::Result {
    match offset {
        None => Ok(()),
        Some(o) if o.local_minus_utc() == 0 => write!(f, "Z"),
        Some(o) => {
            let secs = o.local_minus_utc();
            let sign = if secs < 0 { '-' } else { '+' };
            let secs = secs.abs();
            write!(f, "{}{:02}:{:02}", sign, secs / 3600, (secs % 3600) / 60)
        }
    }
}

fn offset_delta(offset: Option<FixedOffset>) -> TimeDelta {
    TimeDelta::seconds(i64::from(offset.map_or(0, |o| o.local_minus_utc())))
}

fn shift_months(datetime: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months < 0 {
        datetime.checked_sub_months(magnitude)
    } else {
        datetime.checked_add_months(magnitude)
    }
}

// ---------------------------------------------------------------------------
// XsDate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct XsDate {
    pub date: NaiveDate,
    pub offset: Option<FixedOffset>,
}

impl XsDate {
    pub fn parse(lexical: &str) -> ValueResult<Self> {
        let (body, offset) = split_offset(Datatype::Date, lexical)?;
        let date = NaiveDate::parse_from_str(body, DATE_FORMAT)
            .map_err(|e| ValueError::invalid(Datatype::Date, lexical, e.to_string()))?;
        Ok(Self { date, offset })
    }

    /// Starting instant of the day on the UTC timeline.
    pub fn instant(&self) -> NaiveDateTime {
        let start = self.date.and_time(NaiveTime::MIN);
        start
            .checked_sub_signed(offset_delta(self.offset))
            .unwrap_or(start)
    }

    pub fn add_months(&self, months: i64) -> Option<Self> {
        let shifted = shift_months(self.date.and_time(NaiveTime::MIN), months)?;
        Some(Self {
            date: shifted.date(),
            offset: self.offset,
        })
    }
}

impl PartialEq for XsDate {
    fn eq(&self, other: &Self) -> bool {
        self.instant() == other.instant()
    }
}

impl Eq for XsDate {}

impl Hash for XsDate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.instant().hash(state);
    }
}

impl PartialOrd for XsDate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for XsDate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant().cmp(&other.instant())
    }
}

impl fmt::Display for XsDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date.format(DATE_FORMAT))?;
        write_offset(f, self.offset)
    }
}

// ---------------------------------------------------------------------------
// XsTime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct XsTime {
    pub time: NaiveTime,
    pub offset: Option<FixedOffset>,
}

impl XsTime {
    pub fn parse(lexical: &str) -> ValueResult<Self> {
        let (body, offset) = split_offset(Datatype::Time, lexical)?;
        let time = NaiveTime::parse_from_str(body, TIME_FORMAT)
            .map_err(|e| ValueError::invalid(Datatype::Time, lexical, e.to_string()))?;
        Ok(Self { time, offset })
    }

    /// Time of day normalized to UTC.
    pub fn instant(&self) -> NaiveTime {
        self.time.overflowing_sub_signed(offset_delta(self.offset)).0
    }
}

impl PartialEq for XsTime {
    fn eq(&self, other: &Self) -> bool {
        self.instant() == other.instant()
    }
}

impl Eq for XsTime {}

impl Hash for XsTime {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.instant().hash(state);
    }
}

impl PartialOrd for XsTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for XsTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant().cmp(&other.instant())
    }
}

impl fmt::Display for XsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.time.format(TIME_FORMAT))?;
        write_offset(f, self.offset)
    }
}

// ---------------------------------------------------------------------------
// XsDateTime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct XsDateTime {
    pub datetime: NaiveDateTime,
    pub offset: Option<FixedOffset>,
}

impl XsDateTime {
    pub fn parse(lexical: &str) -> ValueResult<Self> {
        let (body, offset) = split_offset(Datatype::DateTime, lexical)?;
        let datetime = NaiveDateTime::parse_from_str(body, DATETIME_FORMAT)
            .map_err(|e| ValueError::invalid(Datatype::DateTime, lexical, e.to_string()))?;
        Ok(Self { datetime, offset })
    }

    pub fn instant(&self) -> NaiveDateTime {
        self.datetime
            .checked_sub_signed(offset_delta(self.offset))
            .unwrap_or(self.datetime)
    }

    pub fn add_duration(&self, duration: &DayTimeDuration) -> Option<Self> {
        Some(Self {
            datetime: self.datetime.checked_add_signed(duration.0)?,
            offset: self.offset,
        })
    }

    pub fn add_months(&self, months: i64) -> Option<Self> {
        Some(Self {
            datetime: shift_months(self.datetime, months)?,
            offset: self.offset,
        })
    }
}

impl PartialEq for XsDateTime {
    fn eq(&self, other: &Self) -> bool {
        self.instant() == other.instant()
    }
}

impl Eq for XsDateTime {}

impl Hash for XsDateTime {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.instant().hash(state);
    }
}

impl PartialOrd for XsDateTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for XsDateTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.instant().cmp(&other.instant())
    }
}

impl fmt::Display for XsDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.datetime.format(DATETIME_FORMAT))?;
        write_offset(f, self.offset)
    }
}

// ---------------------------------------------------------------------------
// Durations
// ---------------------------------------------------------------------------

fn parse_count(datatype: Datatype, lexical: &str, digits: &str) -> ValueResult<i64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ValueError::invalid(datatype, lexical, "expected a non-negative number"));
    }
    digits
        .parse()
        .map_err(|_| ValueError::invalid(datatype, lexical, "number out of range"))
}

/// Signed duration in days, hours, minutes and (fractional) seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DayTimeDuration(pub TimeDelta);

impl DayTimeDuration {
    pub fn parse(lexical: &str) -> ValueResult<Self> {
        let dt = Datatype::DayTimeDuration;
        let invalid = |reason: &str| ValueError::invalid(dt, lexical, reason);
        let (negative, rest) = match lexical.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, lexical),
        };
        let rest = rest.strip_prefix('P').ok_or_else(|| invalid("missing 'P' designator"))?;
        let (day_part, time_part) = match rest.split_once('T') {
            Some((d, t)) => (d, Some(t)),
            None => (rest, None),
        };

        let mut seconds: i64 = 0;
        let mut nanos: u32 = 0;
        let mut components = 0;
        let overflow = || invalid("duration out of range");

        if !day_part.is_empty() {
            let days = day_part.strip_suffix('D').ok_or_else(|| invalid("expected days component"))?;
            let days = parse_count(dt, lexical, days)?;
            seconds = days.checked_mul(86_400).ok_or_else(overflow)?;
            components += 1;
        }

        if let Some(time) = time_part {
            if time.is_empty() {
                return Err(invalid("empty time component"));
            }
            let mut remaining = time;
            for (designator, unit) in [('H', 3_600_i64), ('M', 60)] {
                if let Some(idx) = remaining.find(designator) {
                    let count = parse_count(dt, lexical, &remaining[..idx])?;
                    let part = count.checked_mul(unit).ok_or_else(overflow)?;
                    seconds = seconds.checked_add(part).ok_or_else(overflow)?;
                    remaining = &remaining[idx + 1..];
                    components += 1;
                }
            }
            if !remaining.is_empty() {
                let secs = remaining
                    .strip_suffix('S')
                    .ok_or_else(|| invalid("unexpected trailing characters"))?;
                let (whole, fraction) = match secs.split_once('.') {
                    Some((w, f)) => (w, Some(f)),
                    None => (secs, None),
                };
                let whole = parse_count(dt, lexical, whole)?;
                seconds = seconds.checked_add(whole).ok_or_else(overflow)?;
                if let Some(fraction) = fraction {
                    if fraction.is_empty()
                        || fraction.len() > 9
                        || !fraction.bytes().all(|b| b.is_ascii_digit())
                    {
                        return Err(invalid("invalid fractional seconds"));
                    }
                    let scale = 10_u32.pow(9 - fraction.len() as u32);
                    nanos = fraction.parse::<u32>().map_err(|_| overflow())? * scale;
                }
                components += 1;
            }
        }

        if components == 0 {
            return Err(invalid("no duration components"));
        }
        let delta = TimeDelta::new(seconds, nanos).ok_or_else(overflow)?;
        Ok(Self(if negative { -delta } else { delta }))
    }
}

impl fmt::Display for DayTimeDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.0 < TimeDelta::zero();
        let abs = if negative { -self.0 } else { self.0 };
        let total = abs.num_seconds();
        let nanos = abs.subsec_nanos();
        let (days, hours, minutes, seconds) =
            (total / 86_400, (total % 86_400) / 3_600, (total % 3_600) / 60, total % 60);

        if negative {
            write!(f, "-")?;
        }
        write!(f, "P")?;
        if days > 0 {
            write!(f, "{}D", days)?;
        }
        if hours > 0 || minutes > 0 || seconds > 0 || nanos > 0 {
            write!(f, "T")?;
            if hours > 0 {
                write!(f, "{}H", hours)?;
            }
            if minutes > 0 {
                write!(f, "{}M", minutes)?;
            }
            if seconds > 0 || nanos > 0 {
                write!(f, "{}", seconds)?;
                if nanos > 0 {
                    let fraction = format!("{:09}", nanos);
                    write!(f, ".{}", fraction.trim_end_matches('0'))?;
                }
                write!(f, "S")?;
            }
        } else if days == 0 {
            write!(f, "T0S")?;
        }
        Ok(())
    }
}

/// Signed duration in whole months.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct YearMonthDuration {
    pub months: i64,
}

impl YearMonthDuration {
    pub fn parse(lexical: &str) -> ValueResult<Self> {
        let dt = Datatype::YearMonthDuration;
        let invalid = |reason: &str| ValueError::invalid(dt, lexical, reason);
        let (negative, rest) = match lexical.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, lexical),
        };
        let mut remaining = rest.strip_prefix('P').ok_or_else(|| invalid("missing 'P' designator"))?;
        let mut months: i64 = 0;
        let mut components = 0;
        for (designator, unit) in [('Y', 12_i64), ('M', 1)] {
            if let Some(idx) = remaining.find(designator) {
                let count = parse_count(dt, lexical, &remaining[..idx])?;
                let part = count.checked_mul(unit).ok_or_else(|| invalid("duration out of range"))?;
                months = months.checked_add(part).ok_or_else(|| invalid("duration out of range"))?;
                remaining = &remaining[idx + 1..];
                components += 1;
            }
        }
        if !remaining.is_empty() {
            return Err(invalid("unexpected trailing characters"));
        }
        if components == 0 {
            return Err(invalid("no duration components"));
        }
        Ok(Self {
            months: if negative { -months } else { months },
        })
    }
}

impl fmt::Display for YearMonthDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.months < 0 {
            write!(f, "-")?;
        }
        let abs = self.months.unsigned_abs();
        let (years, months) = (abs / 12, abs % 12);
        write!(f, "P")?;
        if years > 0 {
            write!(f, "{}Y", years)?;
        }
        if months > 0 || years == 0 {
            write!(f, "{}M", months)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_roundtrip_and_timezones() {
        assert_eq!(XsDate::parse("2024-01-01").unwrap().to_string(), "2024-01-01");
        assert_eq!(XsDate::parse("2024-01-01+00:00").unwrap().to_string(), "2024-01-01Z");
        assert_eq!(XsDate::parse("2024-01-01-05:00").unwrap().to_string(), "2024-01-01-05:00");
        assert!(XsDate::parse("2024-13-01").is_err());
        assert!(XsDate::parse("2024-01-01+15:00").is_err());
    }

    #[test]
    fn test_date_equality_uses_instants() {
        let a = XsDate::parse("2024-01-01Z").unwrap();
        let b = XsDate::parse("2024-01-01").unwrap();
        assert_eq!(a, b);
        let c = XsDate::parse("2024-01-01+01:00").unwrap();
        assert!(c < a);
    }

    #[test]
    fn test_time_roundtrip() {
        assert_eq!(XsTime::parse("09:30:00").unwrap().to_string(), "09:30:00");
        assert_eq!(XsTime::parse("09:30:00.5Z").unwrap().to_string(), "09:30:00.500Z");
        let utc = XsTime::parse("14:00:00Z").unwrap();
        let est = XsTime::parse("09:00:00-05:00").unwrap();
        assert_eq!(utc, est);
    }

    #[test]
    fn test_datetime_arithmetic() {
        let dt = XsDateTime::parse("2024-01-31T10:00:00Z").unwrap();
        let plus_month = dt.add_months(1).unwrap();
        assert_eq!(plus_month.to_string(), "2024-02-29T10:00:00Z");
        let dur = DayTimeDuration::parse("PT14H").unwrap();
        assert_eq!(dt.add_duration(&dur).unwrap().to_string(), "2024-02-01T00:00:00Z");
    }

    #[test]
    fn test_day_time_duration_parse_and_display() {
        assert_eq!(DayTimeDuration::parse("P1DT2H3M4.5S").unwrap().to_string(), "P1DT2H3M4.5S");
        assert_eq!(DayTimeDuration::parse("PT36H").unwrap().to_string(), "P1DT12H");
        assert_eq!(DayTimeDuration::parse("-PT5M").unwrap().to_string(), "-PT5M");
        assert_eq!(DayTimeDuration::parse("P0D").unwrap().to_string(), "PT0S");
        assert!(DayTimeDuration::parse("P").is_err());
        assert!(DayTimeDuration::parse("P1DT").is_err());
        assert!(DayTimeDuration::parse("1D").is_err());
        assert!(DayTimeDuration::parse("PT1.S").is_err());
    }

    #[test]
    fn test_year_month_duration() {
        assert_eq!(YearMonthDuration::parse("P1Y2M").unwrap().months, 14);
        assert_eq!(YearMonthDuration::parse("P14M").unwrap().to_string(), "P1Y2M");
        assert_eq!(YearMonthDuration::parse("-P3M").unwrap().months, -3);
        assert_eq!(YearMonthDuration::parse("P0Y").unwrap().to_string(), "P0M");
        assert!(YearMonthDuration::parse("P1D").is_err());
    }
}
