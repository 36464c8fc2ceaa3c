//! Canonical duration type: integer milliseconds, parsed from surface syntax
//! `^\d+(ms|s|m|h|d)$`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::validation::DURATION_REGEX;

/// A duration, canonically stored as milliseconds.
///
/// Deserializes from and serializes back to the surface literal (`"10s"`),
/// never from a bare integer, so round-tripped YAML/JSON stays human-readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Duration {
    millis: u64,
}

impl Duration {
    pub fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    pub fn as_millis(&self) -> u64 {
        self.millis
    }

    /// Parse a literal like `"500ms"`, `"10s"`, `"5m"`, `"1h"`, `"7d"`.
    pub fn parse(literal: &str) -> CoreResult<Self> {
        let caps = DURATION_REGEX
            .captures(literal)
            .ok_or_else(|| CoreError::InvalidDuration(literal.to_string()))?;
        let amount: u64 = caps[1]
            .parse()
            .map_err(|_| CoreError::InvalidDuration(literal.to_string()))?;
        let unit_ms: u64 = match &caps[2] {
            "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            other => return Err(CoreError::InvalidDuration(format!("{literal} ({other})"))),
        };
        let millis = amount
            .checked_mul(unit_ms)
            .ok_or_else(|| CoreError::InvalidDuration(literal.to_string()))?;
        Ok(Self { millis })
    }

    /// Render back to the shortest exact unit, preferring larger units.
    pub fn to_literal(&self) -> String {
        const UNITS: [(u64, &str); 5] = [
            (86_400_000, "d"),
            (3_600_000, "h"),
            (60_000, "m"),
            (1_000, "s"),
            (1, "ms"),
        ];
        for (unit_ms, suffix) in UNITS {
            if self.millis % unit_ms == 0 {
                return format!("{}{}", self.millis / unit_ms, suffix);
            }
        }
        format!("{}ms", self.millis)
    }
}

impl TryFrom<String> for Duration {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Duration::parse(&value)
    }
}

impl From<Duration> for String {
    fn from(d: Duration) -> Self {
        d.to_literal()
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_literal())
    }
}
