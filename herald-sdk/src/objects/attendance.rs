//! RSVP / attendance types.
//!
//! Attendance is never authored locally: every record here originates from
//! the channel a message was posted to, either through a full poll or a
//! pushed [`RsvpUpdateNotification`].

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::signature::Signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Accepted,
    Declined,
    Tentative,
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttendanceStatus::Accepted => write!(f, "accepted"),
            AttendanceStatus::Declined => write!(f, "declined"),
            AttendanceStatus::Tentative => write!(f, "tentative"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub person_id: String,
    pub display_name: String,
    pub status: AttendanceStatus,
}

/// The complete RSVP state of one posted message at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceSnapshot {
    pub records: Vec<AttendanceRecord>,
    #[serde(with = "time::serde::rfc3339")]
    pub fetched_at: OffsetDateTime,
}

/// A pushed RSVP update for one message.
///
/// The snapshot is always complete for that message, never a delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RsvpUpdateNotification {
    pub source_message_id: String,
    pub snapshot: Vec<AttendanceRecord>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Signature for RsvpUpdateNotification {}

impl RsvpUpdateNotification {
    /// Serialized identity used to drop redundant deliveries.
    pub fn identity(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Attendance split by status, each list sorted by display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendancePartition {
    pub accepted: Vec<AttendanceRecord>,
    pub declined: Vec<AttendanceRecord>,
    pub tentative: Vec<AttendanceRecord>,
}

impl AttendancePartition {
    pub fn from_records(records: impl IntoIterator<Item = AttendanceRecord>) -> Self {
        let mut partition = Self::default();
        for record in records {
            match record.status {
                AttendanceStatus::Accepted => partition.accepted.push(record),
                AttendanceStatus::Declined => partition.declined.push(record),
                AttendanceStatus::Tentative => partition.tentative.push(record),
            }
        }
        for bucket in [
            &mut partition.accepted,
            &mut partition.declined,
            &mut partition.tentative,
        ] {
            bucket.sort_by(|a, b| {
                a.display_name
                    .to_lowercase()
                    .cmp(&b.display_name.to_lowercase())
                    .then_with(|| a.person_id.cmp(&b.person_id))
            });
        }
        partition
    }

    pub fn status_of(&self, person_id: &str) -> Option<AttendanceStatus> {
        self.iter()
            .find(|record| record.person_id == person_id)
            .map(|record| record.status)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttendanceRecord> {
        self.accepted
            .iter()
            .chain(self.tentative.iter())
            .chain(self.declined.iter())
    }

    pub fn len(&self) -> usize {
        self.accepted.len() + self.declined.len() + self.tentative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            person_id: id.to_string(),
            display_name: name.to_string(),
            status,
        }
    }

    #[test]
    fn partition_is_sorted_and_split() {
        let partition = AttendancePartition::from_records(vec![
            record("3", "zed", AttendanceStatus::Accepted),
            record("1", "Alice", AttendanceStatus::Accepted),
            record("2", "bob", AttendanceStatus::Tentative),
            record("4", "Carol", AttendanceStatus::Declined),
        ]);
        let accepted: Vec<_> = partition
            .accepted
            .iter()
            .map(|r| r.display_name.as_str())
            .collect();
        assert_eq!(accepted, ["Alice", "zed"]);
        assert_eq!(partition.tentative.len(), 1);
        assert_eq!(partition.status_of("4"), Some(AttendanceStatus::Declined));
        assert_eq!(partition.status_of("9"), None);
        assert_eq!(partition.len(), 4);
    }

    #[test]
    fn identity_changes_with_timestamp() {
        let a = RsvpUpdateNotification {
            source_message_id: "m".into(),
            snapshot: vec![record("1", "a", AttendanceStatus::Accepted)],
            timestamp: time::macros::datetime!(2026-01-01 10:00 UTC),
        };
        let mut b = a.clone();
        assert_eq!(a.identity().unwrap(), b.identity().unwrap());
        b.timestamp += time::Duration::seconds(1);
        assert_ne!(a.identity().unwrap(), b.identity().unwrap());
    }
}
