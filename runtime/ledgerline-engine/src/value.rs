//! Domain scalars: record identifiers, money amounts and rates.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Largest scale a [`Rate`] carries.
pub const MAX_RATE_SCALE: u8 = 9;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{text}` is not a valid {kind}")]
pub struct ValueParseError {
    pub kind: &'static str,
    pub text: String,
}

impl ValueParseError {
    pub(crate) fn new(kind: &'static str, text: &str) -> Self {
        Self {
            kind,
            text: text.to_string(),
        }
    }
}

/// Opaque integer handle of a database record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Serial(i64);

impl Serial {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }
}

impl From<i64> for Serial {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Serial {
    type Err = ValueParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(Serial)
            .map_err(|_| ValueParseError::new("identifier", s))
    }
}

/// Exact money value with two decimal places, held in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount {
    cents: i64,
}

impl Amount {
    pub const ZERO: Amount = Amount { cents: 0 };

    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub const fn cents(self) -> i64 {
        self.cents
    }

    /// Round a binary float to the nearest cent.
    pub fn from_f64(value: f64) -> Option<Self> {
        let cents = (value * 100.0).round();
        if cents.is_finite() && cents.abs() < i64::MAX as f64 {
            Some(Self {
                cents: cents as i64,
            })
        } else {
            None
        }
    }

    pub fn to_f64(self) -> f64 {
        self.cents as f64 / 100.0
    }

    pub fn is_zero(self) -> bool {
        self.cents == 0
    }

    pub fn is_negative(self) -> bool {
        self.cents < 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.cents.checked_add(other.cents).map(Amount::from_cents)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.cents.checked_sub(other.cents).map(Amount::from_cents)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl FromStr for Amount {
    type Err = ValueParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ValueParseError::new("amount", s);
        let (mantissa, scale) = parse_fixed(s).ok_or_else(err)?;
        if scale > 2 {
            return Err(err());
        }
        let cents = mantissa
            .checked_mul(10i64.pow(u32::from(2 - scale)))
            .ok_or_else(err)?;
        Ok(Self { cents })
    }
}

/// Fixed-point rate. `5.250` is mantissa 5250 at scale 3; equality and
/// ordering compare the numeric value, so `5.25 == 5.250`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rate {
    mantissa: i64,
    scale: u8,
}

impl Rate {
    pub fn new(mantissa: i64, scale: u8) -> Option<Self> {
        (scale <= MAX_RATE_SCALE).then_some(Self { mantissa, scale })
    }

    pub fn from_int(value: i64) -> Self {
        Self {
            mantissa: value,
            scale: 0,
        }
    }

    /// Round a binary float to `scale` decimal places.
    pub fn from_f64(value: f64, scale: u8) -> Option<Self> {
        if scale > MAX_RATE_SCALE {
            return None;
        }
        let scaled = (value * 10f64.powi(i32::from(scale))).round();
        if scaled.is_finite() && scaled.abs() < i64::MAX as f64 {
            Some(Self {
                mantissa: scaled as i64,
                scale,
            })
        } else {
            None
        }
    }

    /// Nearest rate to a float of unknown scale: the most decimal places,
    /// up to `MAX_RATE_SCALE`, whose mantissa still fits, with trailing
    /// zeros dropped.
    pub fn from_f64_rounded(value: f64) -> Option<Self> {
        (0..=MAX_RATE_SCALE)
            .rev()
            .find_map(|scale| Self::from_f64(value, scale))
            .map(Self::trimmed)
    }

    fn trimmed(mut self) -> Self {
        while self.scale > 0 && self.mantissa % 10 == 0 {
            self.mantissa /= 10;
            self.scale -= 1;
        }
        self
    }

    pub fn mantissa(self) -> i64 {
        self.mantissa
    }

    pub fn scale(self) -> u8 {
        self.scale
    }

    pub fn to_f64(self) -> f64 {
        self.mantissa as f64 / 10f64.powi(i32::from(self.scale))
    }

    /// Re-express at `scale` places. Fails if digits would be lost or the
    /// mantissa overflows.
    pub fn rescale(self, scale: u8) -> Option<Self> {
        if scale > MAX_RATE_SCALE {
            return None;
        }
        match scale.cmp(&self.scale) {
            Ordering::Equal => Some(self),
            Ordering::Greater => {
                let factor = 10i64.pow(u32::from(scale - self.scale));
                self.mantissa
                    .checked_mul(factor)
                    .map(|mantissa| Self { mantissa, scale })
            }
            Ordering::Less => {
                let factor = 10i64.pow(u32::from(self.scale - scale));
                (self.mantissa % factor == 0).then_some(Self {
                    mantissa: self.mantissa / factor,
                    scale,
                })
            }
        }
    }

    fn widened(self) -> i128 {
        i128::from(self.mantissa) * 10i128.pow(u32::from(MAX_RATE_SCALE - self.scale))
    }
}

impl PartialEq for Rate {
    fn eq(&self, other: &Self) -> bool {
        self.widened() == other.widened()
    }
}

impl Eq for Rate {}

impl PartialOrd for Rate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.widened().cmp(&other.widened())
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let sign = if self.mantissa < 0 { "-" } else { "" };
        let abs = self.mantissa.unsigned_abs();
        let factor = 10u64.pow(u32::from(self.scale));
        write!(
            f,
            "{sign}{}.{:0width$}",
            abs / factor,
            abs % factor,
            width = usize::from(self.scale)
        )
    }
}

impl FromStr for Rate {
    type Err = ValueParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mantissa, scale) = parse_fixed(s).ok_or_else(|| ValueParseError::new("rate", s))?;
        if scale > MAX_RATE_SCALE {
            return Err(ValueParseError::new("rate", s));
        }
        Ok(Self { mantissa, scale })
    }
}

/// Parse `[-+]digits[.digits]` into a mantissa and the number of fraction
/// digits. At least one digit must be present.
fn parse_fixed(text: &str) -> Option<(i64, u8)> {
    let text = text.trim();
    let (negative, body) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (whole, fraction) = match body.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (body, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }
    let scale = u8::try_from(fraction.len()).ok()?;
    let mut mantissa: i64 = 0;
    for digit in whole.bytes().chain(fraction.bytes()) {
        mantissa = mantissa
            .checked_mul(10)?
            .checked_add(i64::from(digit - b'0'))?;
    }
    Some((if negative { -mantissa } else { mantissa }, scale))
}
