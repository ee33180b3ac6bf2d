use crate::framework::DatabaseProcessor;
use compact_str::CompactString;
use kanau::processor::Processor;

/// Someone expected at an event through one of its participant groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct Participant {
    pub person_id: String,
    pub display_name: String,
}

/// Resolve the members of the given groups, each person at most once.
#[derive(Debug, Clone)]
pub struct GetParticipantsForGroups {
    pub groups: Vec<CompactString>,
}

impl Processor<GetParticipantsForGroups> for DatabaseProcessor {
    type Output = Vec<Participant>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetParticipantsForGroups")]
    async fn process(
        &self,
        query: GetParticipantsForGroups,
    ) -> Result<Vec<Participant>, sqlx::Error> {
        if query.groups.is_empty() {
            return Ok(Vec::new());
        }
        let groups: Vec<String> = query.groups.iter().map(|g| g.to_string()).collect();
        sqlx::query_as::<_, Participant>(
            r#"
            SELECT DISTINCT ON (person_id) person_id, display_name
            FROM participants
            WHERE group_id = ANY($1)
            ORDER BY person_id, display_name
            "#,
        )
        .bind(groups)
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
/// Add or rename a group member.
pub struct UpsertParticipant {
    pub group_id: CompactString,
    pub participant: Participant,
}

impl Processor<UpsertParticipant> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertParticipant")]
    async fn process(&self, cmd: UpsertParticipant) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO participants (group_id, person_id, display_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (group_id, person_id) DO UPDATE SET display_name = EXCLUDED.display_name
            "#,
        )
        .bind(cmd.group_id.as_str())
        .bind(cmd.participant.person_id)
        .bind(cmd.participant.display_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
