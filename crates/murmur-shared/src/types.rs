use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MurmurError;

// Backend-assigned user identifier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChannelId(pub String);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Message identifier, unique within one channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Direct,
    Group,
    Public,
    Private,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Direct => "direct",
            Self::Group => "group",
            Self::Public => "public",
            Self::Private => "private",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

// ---------------------------------------------------------------------------
// Timestamp
// ---------------------------------------------------------------------------

/// Ordering key assigned to a message by its source.
///
/// Sources hand these out as `"<seconds>.<fraction>"` strings
/// (e.g. `1507213920.000200`). The raw text is kept so it can be echoed back
/// to the backend verbatim; comparisons use the value at microsecond
/// precision, so `"12.5"` and `"12.500000"` are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp {
    raw: String,
    micros: i64,
}

impl Timestamp {
    pub fn parse(raw: &str) -> Result<Self, MurmurError> {
        raw.parse()
    }

    /// Build a timestamp from whole seconds since the Unix epoch.
    pub fn from_secs(secs: i64) -> Self {
        Self {
            raw: format!("{secs}.000000"),
            micros: secs.saturating_mul(1_000_000),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn as_micros(&self) -> i64 {
        self.micros
    }

    /// Wall-clock instant this key stands for.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        let secs = self.micros.div_euclid(1_000_000);
        let nanos = (self.micros.rem_euclid(1_000_000) * 1_000) as u32;
        DateTime::<Utc>::from_timestamp(secs, nanos).unwrap_or_default()
    }
}

impl FromStr for Timestamp {
    type Err = MurmurError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MurmurError::InvalidTimestamp(s.to_string());
        let trimmed = s.trim();
        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (secs, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let secs: i64 = secs.parse().map_err(|_| invalid())?;
        // Precision beyond microseconds is truncated.
        let mut frac_micros: i64 = 0;
        for (i, digit) in frac.bytes().take(6).enumerate() {
            frac_micros += i64::from(digit - b'0') * 10_i64.pow(5 - i as u32);
        }
        let magnitude = secs
            .checked_mul(1_000_000)
            .and_then(|m| m.checked_add(frac_micros))
            .ok_or_else(invalid)?;

        Ok(Self {
            raw: trimmed.to_string(),
            micros: if negative { -magnitude } else { magnitude },
        })
    }
}

impl TryFrom<String> for Timestamp {
    type Error = MurmurError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.raw
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.micros == other.micros
    }
}

impl Eq for Timestamp {}

impl Hash for Timestamp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.micros.hash(state);
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.micros.cmp(&other.micros)
    }
}
