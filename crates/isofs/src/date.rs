//! Date records: the 17-byte volume-descriptor timestamp and the
//! 7-byte directory-record timestamp, both sharing a parse/new/record triad.

use crate::error::{Error, Result};

/// ECMA-119 8.4.26.1: a 17-byte ASCII timestamp used in volume descriptors.
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DecDateTime {
    year: [u8; 4],
    month: [u8; 2],
    day: [u8; 2],
    hour: [u8; 2],
    minute: [u8; 2],
    second: [u8; 2],
    hundredths: [u8; 2],
    /// GMT offset in 15-minute intervals, signed, range [-48, 52].
    offset: i8,
}

static_assertions::assert_eq_size!(DecDateTime, [u8; 17]);

impl Default for DecDateTime {
    fn default() -> Self {
        Self::unspecified()
    }
}

impl core::fmt::Debug for DecDateTime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_unspecified() {
            return f.write_str("DecDateTime(unspecified)");
        }
        f.debug_struct("DecDateTime")
            .field("year", &core::str::from_utf8(&self.year).unwrap_or("?"))
            .field("month", &core::str::from_utf8(&self.month).unwrap_or("?"))
            .field("day", &core::str::from_utf8(&self.day).unwrap_or("?"))
            .finish_non_exhaustive()
    }
}

fn fmt_digits(buf: &mut [u8], value: u32) {
    let width = buf.len();
    let s = alloc::format!("{:0width$}", value, width = width);
    buf.copy_from_slice(&s.as_bytes()[..width]);
}

impl DecDateTime {
    /// The all-zero-digit form meaning "date and time not specified".
    pub fn unspecified() -> Self {
        Self {
            year: *b"0000",
            month: *b"00",
            day: *b"00",
            hour: *b"00",
            minute: *b"00",
            second: *b"00",
            hundredths: *b"00",
            offset: 0,
        }
    }

    pub fn is_unspecified(&self) -> bool {
        let all_zero_digits = self.year == *b"0000"
            && self.month == *b"00"
            && self.day == *b"00"
            && self.hour == *b"00"
            && self.minute == *b"00"
            && self.second == *b"00";
        let all_nul = self.year == [0; 4]
            && self.month == [0; 2]
            && self.day == [0; 2]
            && self.hour == [0; 2]
            && self.minute == [0; 2]
            && self.second == [0; 2];
        all_zero_digits || all_nul
    }

    #[cfg(feature = "std")]
    pub fn now() -> Self {
        use chrono::{Datelike, Timelike, Utc};
        let now = Utc::now();
        let mut rec = Self::unspecified();
        fmt_digits(&mut rec.year, now.year() as u32);
        fmt_digits(&mut rec.month, now.month());
        fmt_digits(&mut rec.day, now.day());
        fmt_digits(&mut rec.hour, now.hour());
        fmt_digits(&mut rec.minute, now.minute());
        fmt_digits(&mut rec.second, now.second());
        fmt_digits(&mut rec.hundredths, now.nanosecond() / 10_000_000);
        rec.offset = 0;
        rec
    }

    /// Validates the ASCII digits (when not the "unspecified" sentinel) and
    /// returns the record unchanged; parsing tolerates both `"0"*17` and
    /// `"\0"*17` verbatim as the unspecified sentinel.
    pub fn parse(bytes: &[u8; 17]) -> Result<Self> {
        let rec: DecDateTime = *bytemuck::from_bytes(bytes);
        if rec.is_unspecified() {
            return Ok(rec);
        }
        let digit_fields: [&[u8]; 7] = [
            &rec.year, &rec.month, &rec.day, &rec.hour, &rec.minute, &rec.second, &rec.hundredths,
        ];
        for field in digit_fields {
            if !field.iter().all(u8::is_ascii_digit) {
                return Err(Error::malformed("volume descriptor date: non-digit byte"));
            }
        }
        Ok(rec)
    }

    pub fn record(&self) -> [u8; 17] {
        *bytemuck::bytes_of(self).try_into().unwrap()
    }
}

/// ECMA-119 9.1.5: a 7-byte binary timestamp used in directory records.
#[repr(C, packed)]
#[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DirDateTime {
    /// Years since 1900.
    pub years_since_1900: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// GMT offset in 15-minute intervals, signed.
    pub offset: i8,
}

static_assertions::assert_eq_size!(DirDateTime, [u8; 7]);

impl core::fmt::Debug for DirDateTime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}-{:02}-{:02} {:02}:{:02}:{:02}",
            1900 + self.years_since_1900 as u32,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second
        )
    }
}

impl DirDateTime {
    #[cfg(feature = "std")]
    pub fn now() -> Self {
        use chrono::{Datelike, Timelike, Utc};
        let now = Utc::now();
        Self {
            years_since_1900: (now.year() - 1900).max(0) as u8,
            month: now.month() as u8,
            day: now.day() as u8,
            hour: now.hour() as u8,
            minute: now.minute() as u8,
            second: now.second() as u8,
            offset: 0,
        }
    }

    pub fn parse(bytes: [u8; 7]) -> Self {
        *bytemuck::from_bytes(&bytes)
    }

    pub fn record(&self) -> [u8; 7] {
        *bytemuck::bytes_of(self).try_into().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_roundtrips() {
        let rec = DecDateTime::unspecified();
        let parsed = DecDateTime::parse(&rec.record()).unwrap();
        assert!(parsed.is_unspecified());
    }

    #[test]
    fn nul_unspecified_is_tolerated() {
        let bytes = [0u8; 17];
        let parsed = DecDateTime::parse(&bytes).unwrap();
        assert!(parsed.is_unspecified());
    }

    #[test]
    fn garbage_digits_are_malformed() {
        let mut bytes = *b"2026XX28000000000";
        bytes[16] = 0;
        assert!(DecDateTime::parse(&bytes).is_err());
    }

    #[test]
    fn dir_date_roundtrips() {
        let rec = DirDateTime {
            years_since_1900: 126,
            month: 7,
            day: 28,
            hour: 12,
            minute: 30,
            second: 0,
            offset: 4,
        };
        let parsed = DirDateTime::parse(rec.record());
        assert_eq!(parsed.day, 28);
        assert_eq!(parsed.offset, 4);
    }
}
