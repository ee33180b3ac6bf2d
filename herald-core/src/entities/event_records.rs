use crate::framework::DatabaseProcessor;
use compact_str::CompactString;
use herald_sdk::objects::{
    ChannelId, ChannelPublication, EventMessage, EventResponse, ReminderConfig,
    ReminderConfigError, StoredChannelPublications,
};
use kanau::processor::Processor;
use sqlx::types::Json;
use std::collections::BTreeMap;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Errors that reject an operation before it has any side effect.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("event cannot end before it starts")]
    EndsBeforeStart,

    #[error("event {0} is already published")]
    AlreadyPublished(Uuid),

    #[error("event not found: {0}")]
    EventNotFound(Uuid),

    #[error("cycle not found: {0}")]
    CycleNotFound(Uuid),

    #[error("too many images: {count} (at most {max})")]
    TooManyImages { count: usize, max: usize },

    #[error("invalid reminder offset: {0}")]
    InvalidReminderOffset(#[from] ReminderConfigError),
}

/// Where one channel's copy of an event lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub message_id: String,
    pub published_at: OffsetDateTime,
}

/// Channel id to delivered message, ordered by channel id.
///
/// Non-empty exactly when the owning event counts as published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelPublications(BTreeMap<ChannelId, PublishedMessage>);

impl ChannelPublications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, channel_id: &ChannelId) -> Option<&PublishedMessage> {
        self.0.get(channel_id)
    }

    pub fn contains(&self, channel_id: &ChannelId) -> bool {
        self.0.contains_key(channel_id)
    }

    pub fn insert(&mut self, channel_id: ChannelId, message: PublishedMessage) {
        self.0.insert(channel_id, message);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChannelId, &PublishedMessage)> {
        self.0.iter()
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = &ChannelId> {
        self.0.keys()
    }

    /// Channel that holds `message_id`, if any.
    pub fn channel_of_message(&self, message_id: &str) -> Option<&ChannelId> {
        self.0
            .iter()
            .find(|(_, message)| message.message_id == message_id)
            .map(|(channel_id, _)| channel_id)
    }

    /// Add every entry of `other` whose channel is not present yet.
    ///
    /// Existing entries always win; a channel is never re-pointed at a
    /// second message.
    pub fn merge_missing(&mut self, other: &ChannelPublications) {
        for (channel_id, message) in other.iter() {
            self.0
                .entry(channel_id.clone())
                .or_insert_with(|| message.clone());
        }
    }

    pub fn from_stored(
        stored: StoredChannelPublications,
        legacy_channel: &ChannelId,
        legacy_published_at: OffsetDateTime,
    ) -> Self {
        stored
            .normalize(legacy_channel, legacy_published_at)
            .into_iter()
            .map(|publication| {
                (
                    publication.channel_id,
                    PublishedMessage {
                        message_id: publication.message_id,
                        published_at: publication.published_at,
                    },
                )
            })
            .collect()
    }

    pub fn to_views(&self) -> Vec<ChannelPublication> {
        self.0
            .iter()
            .map(|(channel_id, message)| ChannelPublication {
                channel_id: channel_id.clone(),
                message_id: message.message_id.clone(),
                published_at: message.published_at,
            })
            .collect()
    }

    pub fn to_stored(&self) -> StoredChannelPublications {
        StoredChannelPublications::Structured(self.to_views())
    }
}

impl FromIterator<(ChannelId, PublishedMessage)> for ChannelPublications {
    fn from_iter<I: IntoIterator<Item = (ChannelId, PublishedMessage)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub event_id: Uuid,
    pub title: String,
    pub description: String,
    pub starts_at: OffsetDateTime,
    pub ends_at: OffsetDateTime,
    pub cycle_id: Option<Uuid>,
    pub participant_groups: Vec<CompactString>,
    pub header_image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub channel_publications: ChannelPublications,
    pub reminder_config: Option<ReminderConfig>,
    pub scheduled_publication: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl EventRecord {
    pub fn is_published(&self) -> bool {
        !self.channel_publications.is_empty()
    }

    /// The payload channels receive for this event.
    pub fn to_message(&self) -> EventMessage {
        EventMessage {
            event_id: self.event_id,
            title: self.title.clone(),
            description: self.description.clone(),
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            participant_groups: self
                .participant_groups
                .iter()
                .map(|group| group.to_string())
                .collect(),
            header_image_url: self.header_image_url.clone(),
            image_urls: self.image_urls.clone(),
        }
    }

    pub fn to_response(&self) -> EventResponse {
        EventResponse {
            event_id: self.event_id,
            title: self.title.clone(),
            description: self.description.clone(),
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            cycle_id: self.cycle_id,
            participant_groups: self
                .participant_groups
                .iter()
                .map(|group| group.to_string())
                .collect(),
            header_image_url: self.header_image_url.clone(),
            image_urls: self.image_urls.clone(),
            channel_publications: self.channel_publications.to_views(),
            reminder_config: self.reminder_config,
            scheduled_publication: self.scheduled_publication,
            published: self.is_published(),
        }
    }
}

fn validate_fields(
    title: &str,
    starts_at: OffsetDateTime,
    ends_at: OffsetDateTime,
) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    if ends_at < starts_at {
        return Err(ValidationError::EndsBeforeStart);
    }
    Ok(())
}

/// A new event before it has a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub starts_at: OffsetDateTime,
    pub ends_at: OffsetDateTime,
    pub cycle_id: Option<Uuid>,
    /// `None` inherits the cycle's default groups.
    pub participant_groups: Option<Vec<CompactString>>,
    pub reminder_config: Option<ReminderConfig>,
}

impl EventDraft {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_fields(&self.title, self.starts_at, self.ends_at)?;
        if let Some(config) = &self.reminder_config {
            config.validate()?;
        }
        Ok(())
    }

    pub fn into_record(
        self,
        event_id: Uuid,
        inherited_groups: Vec<CompactString>,
        now: OffsetDateTime,
    ) -> EventRecord {
        EventRecord {
            event_id,
            title: self.title.trim().to_string(),
            description: self.description,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            cycle_id: self.cycle_id,
            participant_groups: self.participant_groups.unwrap_or(inherited_groups),
            header_image_url: None,
            image_urls: Vec::new(),
            channel_publications: ChannelPublications::new(),
            reminder_config: self.reminder_config,
            scheduled_publication: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Field-level edits to an existing event. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub starts_at: Option<OffsetDateTime>,
    pub ends_at: Option<OffsetDateTime>,
    pub participant_groups: Option<Vec<CompactString>>,
}

impl EventChanges {
    pub fn apply_to(&self, record: &mut EventRecord) {
        if let Some(title) = &self.title {
            record.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(starts_at) = self.starts_at {
            record.starts_at = starts_at;
        }
        if let Some(ends_at) = self.ends_at {
            record.ends_at = ends_at;
        }
        if let Some(groups) = &self.participant_groups {
            record.participant_groups = groups.clone();
        }
    }

    /// Check the record that would result from applying these changes.
    pub fn validate_against(&self, current: &EventRecord) -> Result<(), ValidationError> {
        let mut merged = current.clone();
        self.apply_to(&mut merged);
        validate_fields(&merged.title, merged.starts_at, merged.ends_at)
    }
}

/// Raw `events` row. JSONB columns are normalized by [`EventRow::into_record`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub event_id: Uuid,
    pub title: String,
    pub description: String,
    pub starts_at: OffsetDateTime,
    pub ends_at: OffsetDateTime,
    pub cycle_id: Option<Uuid>,
    pub participant_groups: Json<Vec<CompactString>>,
    pub header_image_url: Option<String>,
    pub image_urls: Json<Vec<String>>,
    pub channel_publications: Option<Json<StoredChannelPublications>>,
    pub reminder_config: Option<Json<ReminderConfig>>,
    pub scheduled_publication: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl EventRow {
    /// A legacy single message id is stamped with the row's `updated_at`,
    /// the closest thing to a publish time the old shape has.
    pub fn into_record(self, legacy_channel: &ChannelId) -> EventRecord {
        let channel_publications = match self.channel_publications {
            Some(Json(stored)) => {
                ChannelPublications::from_stored(stored, legacy_channel, self.updated_at)
            }
            None => ChannelPublications::new(),
        };
        EventRecord {
            event_id: self.event_id,
            title: self.title,
            description: self.description,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            cycle_id: self.cycle_id,
            participant_groups: self.participant_groups.0,
            header_image_url: self.header_image_url,
            image_urls: self.image_urls.0,
            channel_publications,
            reminder_config: self.reminder_config.map(|Json(config)| config),
            scheduled_publication: self.scheduled_publication,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

const EVENT_COLUMNS: &str = "event_id, title, description, starts_at, ends_at, cycle_id, \
    participant_groups, header_image_url, image_urls, channel_publications, reminder_config, \
    scheduled_publication, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct InsertEvent {
    pub record: EventRecord,
}

impl Processor<InsertEvent> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertEvent")]
    async fn process(&self, cmd: InsertEvent) -> Result<(), sqlx::Error> {
        let record = cmd.record;
        let publications = if record.channel_publications.is_empty() {
            None
        } else {
            Some(Json(record.channel_publications.to_stored()))
        };
        sqlx::query(
            r#"
            INSERT INTO events (
                event_id, title, description, starts_at, ends_at, cycle_id,
                participant_groups, header_image_url, image_urls, channel_publications,
                reminder_config, scheduled_publication, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(record.event_id)
        .bind(record.title)
        .bind(record.description)
        .bind(record.starts_at)
        .bind(record.ends_at)
        .bind(record.cycle_id)
        .bind(Json(record.participant_groups))
        .bind(record.header_image_url)
        .bind(Json(record.image_urls))
        .bind(publications)
        .bind(record.reminder_config.map(Json))
        .bind(record.scheduled_publication)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GetEvent {
    pub event_id: Uuid,
}

impl Processor<GetEvent> for DatabaseProcessor {
    type Output = Option<EventRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetEvent")]
    async fn process(&self, query: GetEvent) -> Result<Option<EventRecord>, sqlx::Error> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_id = $1");
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(query.event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.into_record(&self.legacy_channel)))
    }
}

#[derive(Debug, Clone)]
/// List events ordered by start time, optionally limited to one cycle.
pub struct ListEvents {
    pub cycle_id: Option<Uuid>,
}

impl Processor<ListEvents> for DatabaseProcessor {
    type Output = Vec<EventRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListEvents")]
    async fn process(&self, query: ListEvents) -> Result<Vec<EventRecord>, sqlx::Error> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE $1::uuid IS NULL OR cycle_id = $1 \
             ORDER BY starts_at ASC, event_id ASC"
        );
        let rows = sqlx::query_as::<_, EventRow>(&sql)
            .bind(query.cycle_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_record(&self.legacy_channel))
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct UpdateEventFields {
    pub event_id: Uuid,
    pub changes: EventChanges,
    pub now: OffsetDateTime,
}

impl Processor<UpdateEventFields> for DatabaseProcessor {
    type Output = Option<EventRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpdateEventFields")]
    async fn process(&self, cmd: UpdateEventFields) -> Result<Option<EventRecord>, sqlx::Error> {
        let UpdateEventFields {
            event_id,
            changes,
            now,
        } = cmd;
        let sql = format!(
            "UPDATE events SET \
                title = COALESCE($2, title), \
                description = COALESCE($3, description), \
                starts_at = COALESCE($4, starts_at), \
                ends_at = COALESCE($5, ends_at), \
                participant_groups = COALESCE($6, participant_groups), \
                updated_at = $7 \
             WHERE event_id = $1 \
             RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(event_id)
            .bind(changes.title.map(|title| title.trim().to_string()))
            .bind(changes.description)
            .bind(changes.starts_at)
            .bind(changes.ends_at)
            .bind(changes.participant_groups.map(Json))
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.into_record(&self.legacy_channel)))
    }
}

#[derive(Debug, Clone)]
/// Merge newly delivered messages into the stored publication map.
///
/// The map is re-read under a row lock inside the transaction, so entries
/// written concurrently by another publish are never lost. Publishing also
/// clears the event's pending `scheduled_publication`.
pub struct MergeChannelPublications {
    pub event_id: Uuid,
    pub added: ChannelPublications,
    pub now: OffsetDateTime,
}

impl Processor<MergeChannelPublications> for DatabaseProcessor {
    type Output = Option<EventRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MergeChannelPublications")]
    async fn process(
        &self,
        cmd: MergeChannelPublications,
    ) -> Result<Option<EventRecord>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE event_id = $1 FOR UPDATE");
        let Some(row) = sqlx::query_as::<_, EventRow>(&sql)
            .bind(cmd.event_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        let mut record = row.into_record(&self.legacy_channel);
        record.channel_publications.merge_missing(&cmd.added);
        record.scheduled_publication = None;
        record.updated_at = cmd.now;

        sqlx::query(
            r#"
            UPDATE events
            SET channel_publications = $2, scheduled_publication = NULL, updated_at = $3
            WHERE event_id = $1
            "#,
        )
        .bind(cmd.event_id)
        .bind(Json(record.channel_publications.to_stored()))
        .bind(cmd.now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(record))
    }
}

#[derive(Debug, Clone)]
pub struct SetEventReminderConfig {
    pub event_id: Uuid,
    pub config: Option<ReminderConfig>,
}

impl Processor<SetEventReminderConfig> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:SetEventReminderConfig")]
    async fn process(&self, cmd: SetEventReminderConfig) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE events SET reminder_config = $2 WHERE event_id = $1")
            .bind(cmd.event_id)
            .bind(cmd.config.map(Json))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct SetEventScheduledPublication {
    pub event_id: Uuid,
    pub scheduled_publication: Option<OffsetDateTime>,
}

impl Processor<SetEventScheduledPublication> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:SetEventScheduledPublication")]
    async fn process(&self, cmd: SetEventScheduledPublication) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE events SET scheduled_publication = $2 WHERE event_id = $1")
                .bind(cmd.event_id)
                .bind(cmd.scheduled_publication)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct SetEventImages {
    pub event_id: Uuid,
    pub header_image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub now: OffsetDateTime,
}

impl Processor<SetEventImages> for DatabaseProcessor {
    type Output = Option<EventRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:SetEventImages")]
    async fn process(&self, cmd: SetEventImages) -> Result<Option<EventRecord>, sqlx::Error> {
        let sql = format!(
            "UPDATE events SET header_image_url = $2, image_urls = $3, updated_at = $4 \
             WHERE event_id = $1 RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(cmd.event_id)
            .bind(cmd.header_image_url)
            .bind(Json(cmd.image_urls))
            .bind(cmd.now)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.into_record(&self.legacy_channel)))
    }
}

#[derive(Debug, Clone)]
/// Delete an event. Schedule rows and reminder jobs cascade.
pub struct DeleteEvent {
    pub event_id: Uuid,
}

impl Processor<DeleteEvent> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeleteEvent")]
    async fn process(&self, cmd: DeleteEvent) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM events WHERE event_id = $1")
            .bind(cmd.event_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record() -> EventRecord {
        EventDraft {
            title: "  Raid night ".to_string(),
            description: String::new(),
            starts_at: datetime!(2026-03-01 19:00 UTC),
            ends_at: datetime!(2026-03-01 22:00 UTC),
            cycle_id: None,
            participant_groups: None,
            reminder_config: None,
        }
        .into_record(
            Uuid::now_v7(),
            vec![CompactString::from("core")],
            datetime!(2026-02-01 00:00 UTC),
        )
    }

    #[test]
    fn draft_inherits_groups_and_trims_title() {
        let record = record();
        assert_eq!(record.title, "Raid night");
        assert_eq!(record.participant_groups, [CompactString::from("core")]);
        assert!(!record.is_published());
    }

    #[test]
    fn changes_are_validated_against_merged_record() {
        let record = record();
        let changes = EventChanges {
            ends_at: Some(datetime!(2026-03-01 18:00 UTC)),
            ..Default::default()
        };
        assert_eq!(
            changes.validate_against(&record),
            Err(ValidationError::EndsBeforeStart)
        );

        let changes = EventChanges {
            starts_at: Some(datetime!(2026-03-01 17:00 UTC)),
            ends_at: Some(datetime!(2026-03-01 18:00 UTC)),
            ..Default::default()
        };
        assert_eq!(changes.validate_against(&record), Ok(()));

        let changes = EventChanges {
            title: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(
            changes.validate_against(&record),
            Err(ValidationError::EmptyTitle)
        );
    }

    #[test]
    fn merge_keeps_existing_channel_entries() {
        let at = datetime!(2026-03-01 10:00 UTC);
        let mut publications: ChannelPublications = [(
            ChannelId::from("discord"),
            PublishedMessage {
                message_id: "old".to_string(),
                published_at: at,
            },
        )]
        .into_iter()
        .collect();
        let added: ChannelPublications = [
            (
                ChannelId::from("discord"),
                PublishedMessage {
                    message_id: "new".to_string(),
                    published_at: at,
                },
            ),
            (
                ChannelId::from("forum"),
                PublishedMessage {
                    message_id: "f1".to_string(),
                    published_at: at,
                },
            ),
        ]
        .into_iter()
        .collect();

        publications.merge_missing(&added);

        assert_eq!(publications.len(), 2);
        assert_eq!(
            publications
                .get(&ChannelId::from("discord"))
                .map(|m| m.message_id.as_str()),
            Some("old")
        );
        assert_eq!(
            publications.channel_of_message("f1"),
            Some(&ChannelId::from("forum"))
        );
    }

    #[test]
    fn legacy_row_normalizes_to_legacy_channel() {
        let updated_at = datetime!(2025-12-24 08:00 UTC);
        let publications = ChannelPublications::from_stored(
            StoredChannelPublications::Legacy("998877".to_string()),
            &ChannelId::from("discord"),
            updated_at,
        );
        let message = publications.get(&ChannelId::from("discord"));
        assert_eq!(message.map(|m| m.message_id.as_str()), Some("998877"));
        assert_eq!(message.map(|m| m.published_at), Some(updated_at));
    }
}
