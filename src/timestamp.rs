//! Timestamps as reported by the producer and the host
//!
//! Both sides report time as a signed integer, or as the literal
//! `unknown` when the clock could not be read. An unknown timestamp is
//! never coerced to zero: events carrying one are dropped, and region
//! bounds carrying one stay unbounded.

use std::fmt;
use std::str::FromStr;

/// Literal used by the producer and host for an unreadable clock
pub const UNKNOWN_TIMESTAMP: &str = "unknown";

/// A timestamp that may be unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timestamp {
    Known(i64),
    Unknown,
}

impl Timestamp {
    /// Returns the integer value if the timestamp is known
    pub fn known(self) -> Option<i64> {
        match self {
            Timestamp::Known(ts) => Some(ts),
            Timestamp::Unknown => None,
        }
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Timestamp::Unknown)
    }
}

impl From<i64> for Timestamp {
    fn from(ts: i64) -> Self {
        Timestamp::Known(ts)
    }
}

impl From<Option<i64>> for Timestamp {
    fn from(ts: Option<i64>) -> Self {
        ts.map_or(Timestamp::Unknown, Timestamp::Known)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Known(ts) => write!(f, "{}", ts),
            Timestamp::Unknown => f.write_str(UNKNOWN_TIMESTAMP),
        }
    }
}

/// Error returned when a token is neither an integer nor `unknown`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTimestampError(pub String);

impl fmt::Display for ParseTimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is neither an integer nor '{}'", self.0, UNKNOWN_TIMESTAMP)
    }
}

impl std::error::Error for ParseTimestampError {}

impl FromStr for Timestamp {
    type Err = ParseTimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        if token == UNKNOWN_TIMESTAMP {
            return Ok(Timestamp::Unknown);
        }

        // i64::from_str accepts a leading '+', the producer never emits one
        if token.starts_with('+') {
            return Err(ParseTimestampError(token.to_string()));
        }

        token
            .parse::<i64>()
            .map(Timestamp::Known)
            .map_err(|_| ParseTimestampError(token.to_string()))
    }
}
