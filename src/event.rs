//! Trace event line protocol
//!
//! One event per line:
//!
//! ```text
//! <timestamp> <unit_id> <enter|exit> <label>
//! ```
//!
//! The first three fields are whitespace-delimited tokens read left to
//! right; the label is everything after the direction token (surrounding
//! whitespace trimmed) and may itself contain spaces or the words
//! `enter`/`exit`. A unit id therefore cannot contain whitespace.

use crate::timestamp::Timestamp;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Whether an event marks the start or the end of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Enter,
    Exit,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Enter => "enter",
            Direction::Exit => "exit",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = LineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enter" => Ok(Direction::Enter),
            "exit" => Ok(Direction::Exit),
            other => Err(LineError::BadDirection(other.to_string())),
        }
    }
}

/// Why a line was rejected
///
/// None of these are fatal; the ingestor logs the raw line and moves on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineError {
    #[error("empty line")]
    Empty,

    #[error("missing {0} field")]
    MissingField(&'static str),

    #[error("invalid timestamp \"{0}\"")]
    BadTimestamp(String),

    #[error("invalid direction \"{0}\" (expected enter or exit)")]
    BadDirection(String),

    #[error("timestamp is unknown")]
    UnknownTimestamp,
}

/// A validated enter/exit event with a known timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub timestamp: i64,
    pub unit: String,
    pub direction: Direction,
    pub label: String,
}

/// Split off the next whitespace-delimited token
fn next_token(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    match input.find(char::is_whitespace) {
        Some(idx) => Some((&input[..idx], &input[idx..])),
        None => Some((input, "")),
    }
}

impl TraceEvent {
    pub fn new(
        timestamp: i64,
        unit: impl Into<String>,
        direction: Direction,
        label: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            unit: unit.into(),
            direction,
            label: label.into(),
        }
    }

    /// Parse one protocol line
    ///
    /// The shape is checked before the timestamp's value: a well-formed
    /// line with an `unknown` timestamp yields
    /// [`LineError::UnknownTimestamp`], a malformed one yields the shape
    /// error.
    pub fn parse(line: &str) -> Result<Self, LineError> {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            return Err(LineError::Empty);
        }

        let (ts_token, rest) = next_token(line).ok_or(LineError::MissingField("timestamp"))?;
        let timestamp: Timestamp = ts_token
            .parse()
            .map_err(|_| LineError::BadTimestamp(ts_token.to_string()))?;

        let (unit, rest) = next_token(rest).ok_or(LineError::MissingField("unit id"))?;
        let (direction, rest) = next_token(rest).ok_or(LineError::MissingField("direction"))?;
        let direction: Direction = direction.parse()?;

        let label = rest.trim();
        if label.is_empty() {
            return Err(LineError::MissingField("label"));
        }

        let timestamp = timestamp.known().ok_or(LineError::UnknownTimestamp)?;

        Ok(Self::new(timestamp, unit, direction, label))
    }
}

impl FromStr for TraceEvent {
    type Err = LineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TraceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.timestamp, self.unit, self.direction, self.label
        )
    }
}
