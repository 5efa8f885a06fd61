// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Randomized delays.
//!
//! [`DurationRange`] is the configured `{min}-{max}` bound and may be zero-width, meaning "do not
//! wait". [`DelayRange`] is the validated generator built from one, which needs at least two
//! nanoseconds of room to produce a strictly increasing sub-range.

use crate::errors::{DelayRangeError, DurationError};
use rand::Rng;
use std::str::FromStr;
use std::time::Duration;

/// Half-open `[min, max)` bound on a delay, as read from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DurationRange {
    pub min: Duration,
    pub max: Duration,
}

impl DurationRange {
    pub const ZERO: DurationRange = DurationRange {
        min: Duration::ZERO,
        max: Duration::ZERO,
    };

    pub fn new(min: Duration, max: Duration) -> Result<Self, DurationError> {
        if max < min {
            return Err(DurationError::Inverted { min, max });
        }
        Ok(DurationRange { min, max })
    }

    pub fn is_zero_width(&self) -> bool {
        self.max <= self.min
    }

    /// Draws a delay uniformly from `[min, max)`.
    ///
    /// Zero-width ranges are valid configuration meaning "always wait `min`", but a [`DelayRange`]
    /// refuses them, so anything narrower than two nanoseconds returns `min` directly.
    pub fn jitter(&self) -> Duration {
        match DelayRange::try_from(*self) {
            Ok(range) => range.delay(),
            Err(_) => self.min,
        }
    }
}

impl FromStr for DurationRange {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (min, max) = s
            .split_once('-')
            .ok_or_else(|| DurationError::Format(s.to_string()))?;
        if max.contains('-') {
            return Err(DurationError::Format(s.to_string()));
        }
        DurationRange::new(parse_duration(min)?, parse_duration(max)?)
    }
}

/// Produces random sub-ranges and single delays within a `[min, max)` bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    width: u64,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Result<Self, DelayRangeError> {
        let width = max.checked_sub(min).map(nanos).unwrap_or(0);
        if width < 2 {
            return Err(DelayRangeError::TooNarrow { min, max });
        }
        Ok(DelayRange { min, width })
    }

    /// Returns `(lo, hi)` with `min <= lo < hi < max`.
    pub fn delay_range(&self) -> (Duration, Duration) {
        let mut rng = rand::rng();
        let lo = self.min + Duration::from_nanos(rng.random_range(0..self.width));
        let hi = self.min + Duration::from_nanos(rng.random_range(0..self.width));

        if lo > hi {
            (hi, lo)
        } else if lo == hi {
            self.separate(lo)
        } else {
            (lo, hi)
        }
    }

    pub fn delay(&self) -> Duration {
        self.min + Duration::from_nanos(rand::rng().random_range(0..self.width))
    }

    // Pulls two equal draws one nanosecond apart without leaving the bound.
    fn separate(&self, delay: Duration) -> (Duration, Duration) {
        const ONE: Duration = Duration::from_nanos(1);
        if delay > self.min {
            (delay - ONE, delay)
        } else {
            (delay, delay + ONE)
        }
    }
}

impl TryFrom<DurationRange> for DelayRange {
    type Error = DelayRangeError;

    fn try_from(range: DurationRange) -> Result<Self, Self::Error> {
        DelayRange::new(range.min, range.max)
    }
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Parses durations such as `300ms`, `1.5s` or `1m30s`. Accepted units are `ns`, `us` (or
/// `µs`), `ms`, `s`, `m` and `h`. A bare `0` is also accepted.
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    let invalid = || DurationError::Duration(s.to_string());
    let input = s.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if input.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let (number, tail) = rest.split_at(number_len);
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let scale: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            _ => return Err(invalid()),
        };

        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut value = whole.checked_mul(scale).ok_or_else(invalid)?;

        let mut place = scale;
        for digit in frac.chars() {
            place /= 10;
            if place == 0 {
                break;
            }
            let digit = u128::from(digit.to_digit(10).ok_or_else(invalid)?);
            value += digit * place;
        }

        total = total.checked_add(value).ok_or_else(invalid)?;
        rest = tail;
    }

    u64::try_from(total)
        .map(Duration::from_nanos)
        .map_err(|_| invalid())
}
