//! Reminder configuration and delivery payloads.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::signature::Signature;

/// Minutes before start used when an event has reminder history but no
/// stored configuration.
pub const DEFAULT_REMINDER_MINUTES: u32 = 15;

/// Furthest a reminder may fire ahead of its event, in days.
pub const MAX_REMINDER_OFFSET_DAYS: i64 = 366;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReminderConfigError {
    #[error("{slot} reminder offset of {value} {unit} exceeds 366 days")]
    OffsetTooLarge {
        slot: ReminderSlot,
        value: u32,
        unit: OffsetUnit,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetUnit {
    Minutes,
    Hours,
    Days,
}

impl std::fmt::Display for OffsetUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OffsetUnit::Minutes => write!(f, "minutes"),
            OffsetUnit::Hours => write!(f, "hours"),
            OffsetUnit::Days => write!(f, "days"),
        }
    }
}

/// Which attendance buckets receive a reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecipientFilter {
    #[serde(default)]
    pub accepted: bool,
    #[serde(default)]
    pub tentative: bool,
    #[serde(default)]
    pub declined: bool,
    #[serde(default)]
    pub no_response: bool,
}

impl Default for RecipientFilter {
    fn default() -> Self {
        Self {
            accepted: true,
            tentative: true,
            declined: false,
            no_response: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderSpec {
    pub enabled: bool,
    pub value: u32,
    pub unit: OffsetUnit,
    #[serde(default)]
    pub recipients: RecipientFilter,
}

impl ReminderSpec {
    pub fn minutes_before(value: u32) -> Self {
        Self {
            enabled: true,
            value,
            unit: OffsetUnit::Minutes,
            recipients: RecipientFilter::default(),
        }
    }

    /// How long before the event start this reminder fires.
    pub fn offset(&self) -> time::Duration {
        let value = i64::from(self.value);
        match self.unit {
            OffsetUnit::Minutes => time::Duration::minutes(value),
            OffsetUnit::Hours => time::Duration::hours(value),
            OffsetUnit::Days => time::Duration::days(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderSlot {
    First,
    Second,
}

impl std::fmt::Display for ReminderSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReminderSlot::First => write!(f, "first"),
            ReminderSlot::Second => write!(f, "second"),
        }
    }
}

/// The two independent reminder slots of an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default)]
    pub first: Option<ReminderSpec>,
    #[serde(default)]
    pub second: Option<ReminderSpec>,
}

impl ReminderConfig {
    /// A single reminder [`DEFAULT_REMINDER_MINUTES`] before start.
    pub fn default_single() -> Self {
        Self {
            first: Some(ReminderSpec::minutes_before(DEFAULT_REMINDER_MINUTES)),
            second: None,
        }
    }

    pub fn enabled_specs(&self) -> impl Iterator<Item = (ReminderSlot, &ReminderSpec)> {
        [
            (ReminderSlot::First, self.first.as_ref()),
            (ReminderSlot::Second, self.second.as_ref()),
        ]
        .into_iter()
        .filter_map(|(slot, spec)| spec.filter(|s| s.enabled).map(|s| (slot, s)))
    }

    /// Reject offsets that would put a reminder outside any sensible
    /// distance from the event. Disabled slots are checked too, since a
    /// later edit may enable them.
    pub fn validate(&self) -> Result<(), ReminderConfigError> {
        let slots = [
            (ReminderSlot::First, self.first.as_ref()),
            (ReminderSlot::Second, self.second.as_ref()),
        ];
        for (slot, spec) in slots {
            let Some(spec) = spec else { continue };
            if spec.offset() > time::Duration::days(MAX_REMINDER_OFFSET_DAYS) {
                return Err(ReminderConfigError::OffsetTooLarge {
                    slot,
                    value: spec.value,
                    unit: spec.unit,
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRecipient {
    pub person_id: String,
    pub display_name: String,
}

/// Payload delivered when a reminder fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderNotice {
    pub event_id: Uuid,
    pub title: String,
    #[serde(with = "time::serde::rfc3339")]
    pub starts_at: OffsetDateTime,
    pub slot: ReminderSlot,
    pub recipients: Vec<ReminderRecipient>,
}

impl Signature for ReminderNotice {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_unit() {
        let spec = |value, unit| ReminderSpec {
            enabled: true,
            value,
            unit,
            recipients: RecipientFilter::default(),
        };
        assert_eq!(spec(60, OffsetUnit::Minutes).offset(), time::Duration::hours(1));
        assert_eq!(spec(2, OffsetUnit::Hours).offset(), time::Duration::minutes(120));
        assert_eq!(spec(1, OffsetUnit::Days).offset(), time::Duration::hours(24));
    }

    #[test]
    fn disabled_slots_are_skipped() {
        let config = ReminderConfig {
            first: Some(ReminderSpec {
                enabled: false,
                ..ReminderSpec::minutes_before(10)
            }),
            second: Some(ReminderSpec::minutes_before(30)),
        };
        let slots: Vec<_> = config.enabled_specs().map(|(slot, _)| slot).collect();
        assert_eq!(slots, [ReminderSlot::Second]);
        assert_eq!(ReminderConfig::default().enabled_specs().count(), 0);
    }

    #[test]
    fn offsets_beyond_a_year_are_rejected() {
        let within = ReminderConfig {
            first: Some(ReminderSpec {
                value: 366,
                unit: OffsetUnit::Days,
                ..ReminderSpec::minutes_before(0)
            }),
            second: None,
        };
        assert_eq!(within.validate(), Ok(()));

        let beyond = ReminderConfig {
            first: Some(ReminderSpec::minutes_before(30)),
            second: Some(ReminderSpec {
                enabled: false,
                value: u32::MAX,
                unit: OffsetUnit::Hours,
                recipients: RecipientFilter::default(),
            }),
        };
        assert_eq!(
            beyond.validate(),
            Err(ReminderConfigError::OffsetTooLarge {
                slot: ReminderSlot::Second,
                value: u32::MAX,
                unit: OffsetUnit::Hours,
            })
        );
    }

    #[test]
    fn spec_parses_minimal_json() {
        let spec: ReminderSpec =
            serde_json::from_str(r#"{"enabled":true,"value":60,"unit":"minutes"}"#).unwrap();
        assert_eq!(spec.offset(), time::Duration::minutes(60));
        assert_eq!(spec.recipients, RecipientFilter::default());
    }
}
