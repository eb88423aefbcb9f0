//! Calendar-aware duration type.
//!
//! A [`Period`] separates months, days and sub-day microseconds because the
//! three do not convert into each other without a calendar. The text form
//! is a compact unit sequence (`1y2mo3d4h5m6s`), symmetric between
//! [`std::fmt::Display`] and [`std::str::FromStr`].

use crate::error::StorageError;
use crate::types::DataType;
use std::fmt;
use std::str::FromStr;

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;

/// A duration of months, days and microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Period {
    /// Whole months (12 per year).
    pub months: i32,
    /// Whole days.
    pub days: i32,
    /// Sub-day time in microseconds.
    pub micros: i64,
}

impl Period {
    /// Creates a new period from its components.
    #[must_use]
    pub fn new(months: i32, days: i32, micros: i64) -> Self {
        Self {
            months,
            days,
            micros,
        }
    }

    /// A period spanning whole days.
    #[must_use]
    pub fn days(days: i32) -> Self {
        Self::new(0, days, 0)
    }

    /// A period spanning whole hours.
    #[must_use]
    pub fn hours(hours: i64) -> Self {
        Self::new(0, 0, hours * MICROS_PER_HOUR)
    }

    /// True if all components are zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.days == 0 && self.micros == 0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0s");
        }

        let years = self.months / 12;
        let months = self.months % 12;

        if years != 0 {
            write!(f, "{years}y")?;
        }

        if months != 0 {
            write!(f, "{months}mo")?;
        }

        if self.days != 0 {
            write!(f, "{}d", self.days)?;
        }

        let mut micros = self.micros;
        let hours = micros / MICROS_PER_HOUR;
        micros %= MICROS_PER_HOUR;
        let minutes = micros / MICROS_PER_MINUTE;
        micros %= MICROS_PER_MINUTE;
        let seconds = micros / MICROS_PER_SECOND;
        micros %= MICROS_PER_SECOND;

        if hours != 0 {
            write!(f, "{hours}h")?;
        }

        if minutes != 0 {
            write!(f, "{minutes}m")?;
        }

        if seconds != 0 {
            write!(f, "{seconds}s")?;
        }

        if micros != 0 {
            write!(f, "{micros}us")?;
        }

        Ok(())
    }
}

impl FromStr for Period {
    type Err = StorageError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || StorageError::InvalidValue {
            datatype: DataType::Period,
            value: input.to_string(),
        };

        let mut period = Period::default();
        let mut chars = input.trim().char_indices().peekable();
        let mut seen_any = false;

        while let Some(&(start, c)) = chars.peek() {
            if !(c.is_ascii_digit() || c == '-' || c == '+') {
                return Err(invalid());
            }

            chars.next();

            let mut end = start + c.len_utf8();

            while let Some(&(i, d)) = chars.peek() {
                if d.is_ascii_digit() {
                    chars.next();
                    end = i + d.len_utf8();
                } else {
                    break;
                }
            }

            let number: i64 = input[start..end].parse().map_err(|_| invalid())?;

            let mut unit = String::new();

            while let Some(&(_, u)) = chars.peek() {
                if u.is_ascii_alphabetic() {
                    chars.next();
                    unit.push(u.to_ascii_lowercase());
                } else {
                    break;
                }
            }

            match unit.as_str() {
                "y" => period.months += i32::try_from(number).map_err(|_| invalid())? * 12,
                "mo" => period.months += i32::try_from(number).map_err(|_| invalid())?,
                "w" => period.days += i32::try_from(number).map_err(|_| invalid())? * 7,
                "d" => period.days += i32::try_from(number).map_err(|_| invalid())?,
                "h" => period.micros += number * MICROS_PER_HOUR,
                "m" | "min" => period.micros += number * MICROS_PER_MINUTE,
                "s" => period.micros += number * MICROS_PER_SECOND,
                "ms" => period.micros += number * 1000,
                "us" => period.micros += number,
                _ => return Err(invalid()),
            }

            seen_any = true;
        }

        if seen_any {
            Ok(period)
        } else {
            Err(invalid())
        }
    }
}
