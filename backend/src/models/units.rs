//! Fixed-point quantities used by the ledger.
//!
//! Percentages are held as basis points and money as cents, so ownership
//! accounting never goes through floating point. Both accept JSON numbers or
//! decimal strings with at most two fractional digits, and serialize back as
//! JSON numbers.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid decimal `{0}`: expected a number with at most two fractional digits")]
pub struct ParseFixedError(String);

fn parse_hundredths(raw: &str) -> Result<i64, ParseFixedError> {
    let err = || ParseFixedError(raw.to_string());
    let s = raw.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    if whole.is_empty() && frac.is_empty() {
        return Err(err());
    }
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if frac.len() > 2 || !all_digits(whole) || !all_digits(frac) {
        return Err(err());
    }

    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().map_err(|_| err())? };
    let frac: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().map_err(|_| err())? * 10,
        _ => frac.parse().map_err(|_| err())?,
    };
    let value = whole
        .checked_mul(100)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(err)?;
    Ok(if negative { -value } else { value })
}

fn format_hundredths(value: i64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    let (whole, frac) = (abs / 100, abs % 100);
    match frac {
        0 => write!(f, "{sign}{whole}"),
        n if n % 10 == 0 => write!(f, "{sign}{whole}.{}", n / 10),
        n => write!(f, "{sign}{whole}.{n:02}"),
    }
}

struct HundredthsVisitor;

impl<'de> Visitor<'de> for HundredthsVisitor {
    type Value = i64;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or decimal string with at most two fractional digits")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
        v.checked_mul(100)
            .ok_or_else(|| E::custom(format!("{v} is out of range")))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
        i64::try_from(v)
            .ok()
            .and_then(|v| v.checked_mul(100))
            .ok_or_else(|| E::custom(format!("{v} is out of range")))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
        if !v.is_finite() {
            return Err(E::custom("expected a finite number"));
        }
        let scaled = v * 100.0;
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-6 {
            return Err(E::custom(format!(
                "{v} has more than two fractional digits"
            )));
        }
        if rounded.abs() >= i64::MAX as f64 {
            return Err(E::custom(format!("{v} is out of range")));
        }
        Ok(rounded as i64)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
        parse_hundredths(v).map_err(E::custom)
    }
}

macro_rules! fixed_point {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(i64);

        impl $name {
            pub const ZERO: Self = Self(0);

            pub const fn from_hundredths(value: i64) -> Self {
                Self(value)
            }

            pub const fn from_whole(value: i64) -> Self {
                Self(value * 100)
            }

            pub const fn hundredths(self) -> i64 {
                self.0
            }

            pub fn is_positive(self) -> bool {
                self.0 > 0
            }

            pub fn is_negative(self) -> bool {
                self.0 < 0
            }

            pub fn as_f64(self) -> f64 {
                self.0 as f64 / 100.0
            }
        }

        impl Add for $name {
            type Output = Self;

            fn add(self, rhs: Self) -> Self {
                Self(self.0 + rhs.0)
            }
        }

        impl Sub for $name {
            type Output = Self;

            fn sub(self, rhs: Self) -> Self {
                Self(self.0 - rhs.0)
            }
        }

        impl std::iter::Sum for $name {
            fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
                iter.fold(Self::ZERO, |acc, x| Self(acc.0.saturating_add(x.0)))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                format_hundredths(self.0, f)
            }
        }

        impl FromStr for $name {
            type Err = ParseFixedError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_hundredths(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if self.0 % 100 == 0 {
                    serializer.serialize_i64(self.0 / 100)
                } else {
                    serializer.serialize_f64(self.as_f64())
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(HundredthsVisitor).map(Self)
            }
        }
    };
}

fixed_point!(
    /// An ownership share, stored as basis points (percent × 100).
    Percentage
);

fixed_point!(
    /// A dollar amount, stored as cents.
    Money
);

impl Percentage {
    pub const FULL: Self = Self(100 * 100);
}

impl Money {
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// `self × share / 100%`, rounded half away from zero to the cent.
    pub fn share_of(self, share: Percentage) -> Money {
        let product = i128::from(self.0) * i128::from(share.0);
        Money(round_div(product, i128::from(Percentage::FULL.0)) as i64)
    }

    /// Price of one whole percent when `self` buys `share`. `None` when the
    /// share is not positive or the unit price does not fit in cents.
    pub fn per_percent(self, share: Percentage) -> Option<Money> {
        if !share.is_positive() {
            return None;
        }
        let product = i128::from(self.0) * 100;
        i64::try_from(round_div(product, i128::from(share.0))).ok().map(Money)
    }

    /// Applies a valuation multiplier, rounding to the nearest cent.
    pub fn scale(self, factor: f64) -> Money {
        Money((self.0 as f64 * factor).round() as i64)
    }
}

fn round_div(numerator: i128, denominator: i128) -> i128 {
    let half = denominator / 2;
    if numerator >= 0 {
        (numerator + half) / denominator
    } else {
        (numerator - half) / denominator
    }
}
