//! Units of virtual time, data size, and data rate.

use std::str::FromStr;

/// A point in (or span of) virtual time, in nanoseconds.
///
/// `Time` is signed so that a negative delay can be expressed and rejected at the scheduling
/// boundary instead of wrapping around.
#[derive(
    Debug,
    Default,
    Copy,
    Clone,
    PartialOrd,
    Ord,
    PartialEq,
    Eq,
    Hash,
    derive_more::Add,
    derive_more::Sub,
    derive_more::AddAssign,
    derive_more::SubAssign,
    derive_more::Neg,
    derive_more::Sum,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Time(i64);

impl Time {
    /// Time zero, the start of every simulation.
    pub const ZERO: Time = Self::from_nanos(0);
    /// The largest representable time.
    pub const MAX: Time = Self::from_nanos(i64::MAX);

    /// Creates a `Time` from nanoseconds.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Creates a `Time` from microseconds.
    pub const fn from_micros(micros: i64) -> Self {
        Self(micros * NANOS_PER_MICRO)
    }

    /// Creates a `Time` from milliseconds.
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis * NANOS_PER_MILLI)
    }

    /// Creates a `Time` from whole seconds.
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs * NANOS_PER_SEC)
    }

    /// Creates a `Time` from fractional seconds, rounded to the nearest nanosecond.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * NANOS_PER_SEC as f64).round() as i64)
    }

    /// Returns the time in nanoseconds.
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Returns the time in (fractional) seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / NANOS_PER_SEC as f64
    }

    /// Returns `true` if the time is strictly negative.
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Checked addition. Returns `None` on overflow.
    pub fn checked_add(self, rhs: Time) -> Option<Time> {
        self.0.checked_add(rhs.0).map(Self)
    }

    /// Checked subtraction. Returns `None` on overflow.
    pub fn checked_sub(self, rhs: Time) -> Option<Time> {
        self.0.checked_sub(rhs.0).map(Self)
    }
}

const NANOS_PER_MICRO: i64 = 1_000;
const NANOS_PER_MILLI: i64 = 1_000_000;
const NANOS_PER_SEC: i64 = 1_000_000_000;

impl std::fmt::Display for Time {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

/// Parses strings such as `"2s"`, `"1.5s"`, `"100ms"`, `"20us"` or `"7ns"`.
impl FromStr for Time {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let split = s
            .find(|c: char| c.is_ascii_alphabetic())
            .ok_or(ParseTimeError::MissingUnit)?;
        let (value, unit) = s.split_at(split);
        let scale = match unit {
            "s" => NANOS_PER_SEC,
            "ms" => NANOS_PER_MILLI,
            "us" => NANOS_PER_MICRO,
            "ns" => 1,
            _ => return Err(ParseTimeError::UnknownUnit(unit.to_owned())),
        };
        if let Ok(whole) = value.parse::<i64>() {
            return whole
                .checked_mul(scale)
                .map(Self)
                .ok_or(ParseTimeError::OutOfRange);
        }
        let nanos = (value.parse::<f64>()? * scale as f64).round();
        if !nanos.is_finite() || nanos.abs() >= i64::MAX as f64 {
            return Err(ParseTimeError::OutOfRange);
        }
        Ok(Self(nanos as i64))
    }
}

/// Error parsing a [`Time`].
#[derive(Debug, thiserror::Error)]
pub enum ParseTimeError {
    /// No unit suffix.
    #[error("missing time unit (expected one of s, ms, us, ns)")]
    MissingUnit,

    /// Unrecognized unit suffix.
    #[error("unknown time unit `{0}`")]
    UnknownUnit(String),

    /// The value does not fit in 64-bit nanoseconds.
    #[error("time value out of range")]
    OutOfRange,

    /// The numeric part is malformed.
    #[error("invalid time value")]
    Invalid(#[from] std::num::ParseFloatError),
}

macro_rules! unit {
    ($name: ident) => {
        #[allow(missing_docs)]
        #[derive(
            Debug,
            Default,
            Copy,
            Clone,
            PartialOrd,
            Ord,
            PartialEq,
            Eq,
            Hash,
            derive_more::Add,
            derive_more::Sub,
            derive_more::AddAssign,
            derive_more::SubAssign,
            derive_more::Sum,
            derive_more::FromStr,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(u64);

        #[allow(missing_docs)]
        impl $name {
            pub const ZERO: $name = Self::new(0);
            pub const ONE: $name = Self::new(1);
            pub const MAX: $name = Self::new(u64::MAX);

            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            pub const fn into_u64(self) -> u64 {
                self.0
            }

            pub fn into_f64(self) -> f64 {
                self.0 as f64
            }

            pub fn scale_by(self, val: f64) -> Self {
                Self((self.0 as f64 * val).round() as u64)
            }
        }
    };
}

unit!(Bytes);

impl std::fmt::Display for Bytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}B", self.0)
    }
}

unit!(BitsPerSec);

impl BitsPerSec {
    /// Time needed to serialize `size` onto a wire of this rate, rounded up to the next
    /// nanosecond. Returns `None` for a zero rate.
    pub fn tx_time(self, size: Bytes) -> Option<Time> {
        if self.0 == 0 {
            return None;
        }
        let bits = u128::from(size.into_u64()) * 8 * NANOS_PER_SEC as u128;
        let nanos = bits.div_ceil(u128::from(self.0));
        i64::try_from(nanos).ok().map(Time::from_nanos)
    }
}

impl std::fmt::Display for BitsPerSec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}bps", self.0)
    }
}

unit!(Mbps);

impl std::fmt::Display for Mbps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Mbps", self.0)
    }
}

impl From<Mbps> for BitsPerSec {
    fn from(val: Mbps) -> Self {
        BitsPerSec::new(val.0 * 1_000_000)
    }
}

unit!(Gbps);

impl std::fmt::Display for Gbps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Gbps", self.0)
    }
}

impl From<Gbps> for BitsPerSec {
    fn from(val: Gbps) -> Self {
        BitsPerSec::new(val.0 * 1_000_000_000)
    }
}
