use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// How many acknowledgments a write waits for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "AckRepr", into = "AckRepr")]
pub enum Acknowledgment {
    /// Fire-and-forget: the backend reports nothing back (`w = 0`).
    Unacknowledged,
    /// Wait for the given number of nodes (`w >= 1`).
    Nodes(u32),
    /// Wait for a majority of voting nodes.
    Majority,
}

/// Wire shape of [`Acknowledgment`]: a node count or the string `"majority"`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum AckRepr {
    Count(u32),
    Mode(String),
}

impl TryFrom<AckRepr> for Acknowledgment {
    type Error = TypeError;

    fn try_from(repr: AckRepr) -> Result<Self, Self::Error> {
        match repr {
            AckRepr::Count(0) => Ok(Self::Unacknowledged),
            AckRepr::Count(n) => Ok(Self::Nodes(n)),
            AckRepr::Mode(mode) if mode == "majority" => Ok(Self::Majority),
            AckRepr::Mode(mode) => Err(TypeError::InvalidWriteConcern(format!(
                "unknown acknowledgment mode {mode:?}"
            ))),
        }
    }
}

impl From<Acknowledgment> for AckRepr {
    fn from(ack: Acknowledgment) -> Self {
        match ack {
            Acknowledgment::Unacknowledged => AckRepr::Count(0),
            Acknowledgment::Nodes(n) => AckRepr::Count(n),
            Acknowledgment::Majority => AckRepr::Mode("majority".into()),
        }
    }
}

impl fmt::Display for Acknowledgment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unacknowledged => write!(f, "0"),
            Self::Nodes(n) => write!(f, "{n}"),
            Self::Majority => write!(f, "majority"),
        }
    }
}

/// Level of acknowledgment requested from the backing store for a write.
///
/// Only acknowledged writes can observe per-call failures such as duplicate
/// keys, so integrity verification is gated on [`WriteConcern::is_acknowledged`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WriteConcern {
    /// Acknowledgment level (`w`).
    pub w: Acknowledgment,
    /// Wait for the write to reach the backend's journal.
    #[serde(default)]
    pub journal: bool,
    /// Give up waiting for acknowledgment after this many milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl WriteConcern {
    /// Fire-and-forget.
    pub const UNACKNOWLEDGED: Self = Self {
        w: Acknowledgment::Unacknowledged,
        journal: false,
        timeout_ms: None,
    };

    /// Acknowledged by the primary.
    pub const ACKNOWLEDGED: Self = Self {
        w: Acknowledgment::Nodes(1),
        journal: false,
        timeout_ms: None,
    };

    /// Acknowledged by a majority, journaled.
    pub const MAJORITY: Self = Self {
        w: Acknowledgment::Majority,
        journal: true,
        timeout_ms: None,
    };

    /// Map the legacy boolean `safe` flag onto the standard levels.
    pub const fn from_legacy_safe(safe: bool) -> Self {
        if safe {
            Self::ACKNOWLEDGED
        } else {
            Self::UNACKNOWLEDGED
        }
    }

    /// Returns `true` if the backend reports the outcome of the write.
    ///
    /// A journaled write is acknowledged even with `w = 0`.
    pub fn is_acknowledged(&self) -> bool {
        self.w != Acknowledgment::Unacknowledged || self.journal
    }

    /// Set the journal flag.
    pub fn with_journal(mut self, journal: bool) -> Self {
        self.journal = journal;
        self
    }

    /// Set the acknowledgment timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

impl Default for WriteConcern {
    fn default() -> Self {
        Self::ACKNOWLEDGED
    }
}

impl fmt::Display for WriteConcern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "w={}", self.w)?;
        if self.journal {
            write!(f, ",j")?;
        }
        if let Some(ms) = self.timeout_ms {
            write!(f, ",wtimeout={ms}ms")?;
        }
        Ok(())
    }
}

/// Which members of the backing deployment reads are routed to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPreference {
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

impl fmt::Display for ReadPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::PrimaryPreferred => write!(f, "primary_preferred"),
            Self::Secondary => write!(f, "secondary"),
            Self::SecondaryPreferred => write!(f, "secondary_preferred"),
            Self::Nearest => write!(f, "nearest"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_safe_mapping() {
        assert_eq!(WriteConcern::from_legacy_safe(true), WriteConcern::ACKNOWLEDGED);
        assert_eq!(WriteConcern::from_legacy_safe(false), WriteConcern::UNACKNOWLEDGED);
    }

    #[test]
    fn acknowledgment_levels() {
        assert!(!WriteConcern::UNACKNOWLEDGED.is_acknowledged());
        assert!(WriteConcern::ACKNOWLEDGED.is_acknowledged());
        assert!(WriteConcern::MAJORITY.is_acknowledged());
        assert!(WriteConcern::UNACKNOWLEDGED.with_journal(true).is_acknowledged());
    }

    #[test]
    fn default_is_acknowledged() {
        assert_eq!(WriteConcern::default(), WriteConcern::ACKNOWLEDGED);
    }

    #[test]
    fn deserialize_numeric_and_majority() {
        let wc: WriteConcern = serde_json::from_value(json!({"w": 0})).unwrap();
        assert_eq!(wc, WriteConcern::UNACKNOWLEDGED);

        let wc: WriteConcern = serde_json::from_value(json!({"w": 2, "journal": true})).unwrap();
        assert_eq!(wc.w, Acknowledgment::Nodes(2));
        assert!(wc.journal);

        let wc: WriteConcern = serde_json::from_value(json!({"w": "majority"})).unwrap();
        assert_eq!(wc.w, Acknowledgment::Majority);
    }

    #[test]
    fn deserialize_rejects_unknown_mode() {
        let parsed: Result<WriteConcern, _> = serde_json::from_value(json!({"w": "all"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn display() {
        assert_eq!(WriteConcern::UNACKNOWLEDGED.to_string(), "w=0");
        assert_eq!(WriteConcern::MAJORITY.to_string(), "w=majority,j");
        assert_eq!(
            WriteConcern::ACKNOWLEDGED.with_timeout_ms(500).to_string(),
            "w=1,wtimeout=500ms"
        );
    }

    #[test]
    fn read_preference_serde() {
        let pref: ReadPreference = serde_json::from_value(json!("secondary_preferred")).unwrap();
        assert_eq!(pref, ReadPreference::SecondaryPreferred);
        assert_eq!(ReadPreference::default(), ReadPreference::Primary);
    }
}
