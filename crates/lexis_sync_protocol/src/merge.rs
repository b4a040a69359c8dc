//! Policies for applying pulled records over local ones.

use crate::error::ProtocolError;
use crate::record::SyncRecord;
use std::fmt;
use std::str::FromStr;

/// How a pulled record is applied when the uid already exists locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergePolicy {
    /// The incoming record always replaces the local one.
    ServerWins,
    /// The incoming record replaces the local one only if strictly newer.
    #[default]
    LastWriteWins,
}

impl MergePolicy {
    /// Returns true if `incoming` should be written over `local`.
    pub fn should_apply(&self, local: Option<&SyncRecord>, incoming: &SyncRecord) -> bool {
        match (self, local) {
            (_, None) => true,
            (MergePolicy::ServerWins, Some(_)) => true,
            (MergePolicy::LastWriteWins, Some(local)) => incoming.updated_at > local.updated_at,
        }
    }

    /// Returns the configuration name of this policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            MergePolicy::ServerWins => "server-wins",
            MergePolicy::LastWriteWins => "last-write-wins",
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergePolicy {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "server-wins" => Ok(MergePolicy::ServerWins),
            "last-write-wins" | "lww" => Ok(MergePolicy::LastWriteWins),
            _ => Err(ProtocolError::UnknownPolicy(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Payload;
    use proptest::prelude::*;

    fn at(updated_at: i64) -> SyncRecord {
        SyncRecord::new("u", updated_at, Payload::new())
    }

    #[test]
    fn unknown_uid_always_applies() {
        assert!(MergePolicy::LastWriteWins.should_apply(None, &at(1)));
        assert!(MergePolicy::ServerWins.should_apply(None, &at(1)));
    }

    #[test]
    fn last_write_wins_needs_strictly_newer() {
        let policy = MergePolicy::LastWriteWins;
        assert!(policy.should_apply(Some(&at(10)), &at(11)));
        assert!(!policy.should_apply(Some(&at(10)), &at(10)));
        assert!(!policy.should_apply(Some(&at(10)), &at(9)));
    }

    #[test]
    fn server_wins_overwrites_newer_local() {
        assert!(MergePolicy::ServerWins.should_apply(Some(&at(10)), &at(9)));
    }

    #[test]
    fn policy_names() {
        assert_eq!("lww".parse::<MergePolicy>().unwrap(), MergePolicy::LastWriteWins);
        assert_eq!(
            "server_wins".parse::<MergePolicy>().unwrap(),
            MergePolicy::ServerWins
        );
        assert!("manual".parse::<MergePolicy>().is_err());
    }

    proptest! {
        #[test]
        fn last_write_wins_never_regresses(local in 0i64..1_000_000, incoming in 0i64..1_000_000) {
            let applied = MergePolicy::LastWriteWins.should_apply(Some(&at(local)), &at(incoming));
            prop_assert_eq!(applied, incoming > local);
        }
    }
}
