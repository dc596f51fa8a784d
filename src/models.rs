use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{Postgres, Row, Transaction};
use uuid::Uuid;

use std::str::FromStr;

/**
 * Election lifecycle states, stored verbatim in `elections.status`.
 *
 * Transitions are linear (UPCOMING -> ACTIVE -> COMPLETED -> ARCHIVED) and
 * driven by admin action, never derived from the clock alone.
 */
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum ElectionStatus {
    #[serde(rename = "UPCOMING")]
    Upcoming,
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "ARCHIVED")]
    Archived,
}

impl ElectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElectionStatus::Upcoming => "UPCOMING",
            ElectionStatus::Active => "ACTIVE",
            ElectionStatus::Completed => "COMPLETED",
            ElectionStatus::Archived => "ARCHIVED",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown election status: {0}")]
pub struct InvalidStatus(String);

impl FromStr for ElectionStatus {
    type Err = InvalidStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "UPCOMING" => Ok(ElectionStatus::Upcoming),
            "ACTIVE" => Ok(ElectionStatus::Active),
            "COMPLETED" => Ok(ElectionStatus::Completed),
            "ARCHIVED" => Ok(ElectionStatus::Archived),
            other => Err(InvalidStatus(other.to_string())),
        }
    }
}

// The status column is VARCHAR backed by a CHECK constraint, so the decode
// happens by hand rather than through a database enum type.
fn status_column(row: &PgRow) -> Result<ElectionStatus, sqlx::Error> {
    let status: String = row.try_get("status")?;
    ElectionStatus::from_str(&status).map_err(|err| sqlx::Error::ColumnDecode {
        index: "status".to_string(),
        source: Box::new(err),
    })
}

#[derive(Clone, Debug, Serialize)]
pub struct Election {
    pub id: Uuid,
    pub election_year: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: ElectionStatus,
    pub is_anonymous_tally: bool,
}

impl<'r> sqlx::FromRow<'r, PgRow> for Election {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Election {
            id: row.try_get("id")?,
            election_year: row.try_get("election_year")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            status: status_column(row)?,
            is_anonymous_tally: row.try_get("is_anonymous_tally")?,
        })
    }
}

impl Election {
    pub async fn load(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
    ) -> Result<Option<Election>, sqlx::Error> {
        sqlx::query_as::<_, Election>(
            "SELECT id, election_year, title, description, start_time, end_time, status, is_anonymous_tally
             FROM elections WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(tx)
        .await
    }
}

/**
 * A role contested within one election.
 */
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Position {
    pub id: Uuid,
    pub name: String,
}

impl Position {
    pub async fn for_election(
        tx: &mut Transaction<'_, Postgres>,
        election_id: Uuid,
    ) -> Result<Vec<Position>, sqlx::Error> {
        sqlx::query_as::<_, Position>(
            "SELECT id, name FROM positions WHERE election_id = $1 ORDER BY name",
        )
        .bind(election_id)
        .fetch_all(tx)
        .await
    }
}

/**
 * The slice of a student row the voting core cares about: that the student
 * exists and whether the owning account passed verification.
 */
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct VoterIdentity {
    pub student_id: Uuid,
    pub is_verified: bool,
}

impl VoterIdentity {
    pub async fn load(
        tx: &mut Transaction<'_, Postgres>,
        student_id: Uuid,
    ) -> Result<Option<VoterIdentity>, sqlx::Error> {
        sqlx::query_as::<_, VoterIdentity>(
            "SELECT s.id AS student_id, u.is_verified
             FROM students s JOIN users u ON u.id = s.user_id
             WHERE s.id = $1",
        )
        .bind(student_id)
        .fetch_optional(tx)
        .await
    }
}

/**
 * The (candidate, position) pairs a ballot may legally reference; only
 * approved candidacies ever make it into this set.
 */
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct CandidateSlot {
    pub id: Uuid,
    pub position_id: Uuid,
}

impl CandidateSlot {
    pub async fn approved_for_election(
        tx: &mut Transaction<'_, Postgres>,
        election_id: Uuid,
    ) -> Result<Vec<CandidateSlot>, sqlx::Error> {
        sqlx::query_as::<_, CandidateSlot>(
            "SELECT id, position_id FROM candidates
             WHERE election_id = $1 AND is_approved = TRUE",
        )
        .bind(election_id)
        .fetch_all(tx)
        .await
    }
}

/**
 * An approved candidate as presented on ballots and in tallies, joined out
 * to the student's name and department. Rows come back in application order
 * so downstream sorts stay stable.
 */
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct CandidateProfile {
    pub id: Uuid,
    pub name: String,
    pub department: Option<String>,
    pub year_of_study: String,
    pub platform_statement: Option<String>,
    pub photo_url: Option<String>,
}

impl CandidateProfile {
    pub async fn approved_for_position(
        tx: &mut Transaction<'_, Postgres>,
        election_id: Uuid,
        position_id: Uuid,
    ) -> Result<Vec<CandidateProfile>, sqlx::Error> {
        sqlx::query_as::<_, CandidateProfile>(
            "SELECT c.id, u.first_name || ' ' || u.last_name AS name,
                    d.name AS department, s.year_of_study,
                    c.platform_statement, c.photo_url
             FROM candidates c
             JOIN students s ON s.id = c.student_id
             JOIN users u ON u.id = s.user_id
             LEFT JOIN departments d ON d.id = s.department_id
             WHERE c.election_id = $1 AND c.position_id = $2 AND c.is_approved = TRUE
             ORDER BY c.created_at",
        )
        .bind(election_id)
        .bind(position_id)
        .fetch_all(tx)
        .await
    }
}

/**
 * Approval state of one candidacy, for the application workflow.
 */
#[derive(Clone, Debug, sqlx::FromRow)]
pub struct CandidacyState {
    pub id: Uuid,
    pub is_approved: bool,
}

impl CandidacyState {
    pub async fn load(
        tx: &mut Transaction<'_, Postgres>,
        candidate_id: Uuid,
    ) -> Result<Option<CandidacyState>, sqlx::Error> {
        sqlx::query_as::<_, CandidacyState>(
            "SELECT id, is_approved FROM candidates WHERE id = $1",
        )
        .bind(candidate_id)
        .fetch_optional(tx)
        .await
    }
}

/**
 * Full roster row for listing every candidacy in an election, approved or
 * still pending.
 */
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct CandidateListing {
    pub id: Uuid,
    pub position_id: Uuid,
    pub position_name: String,
    pub name: String,
    pub department: Option<String>,
    pub year_of_study: String,
    pub platform_statement: Option<String>,
    pub photo_url: Option<String>,
    pub is_approved: bool,
    pub applied_at: DateTime<Utc>,
}

/**
 * A completed election together with its turnout, for the archive listing.
 */
#[derive(Clone, Debug, Serialize)]
pub struct CompletedElection {
    pub id: Uuid,
    pub title: String,
    pub election_year: Option<String>,
    pub status: ElectionStatus,
    pub end_time: DateTime<Utc>,
    pub total_voters: i64,
}

impl<'r> sqlx::FromRow<'r, PgRow> for CompletedElection {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CompletedElection {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            election_year: row.try_get("election_year")?,
            status: status_column(row)?,
            end_time: row.try_get("end_time")?,
            total_voters: row.try_get("total_voters")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in &[
            ElectionStatus::Upcoming,
            ElectionStatus::Active,
            ElectionStatus::Completed,
            ElectionStatus::Archived,
        ] {
            assert_eq!(ElectionStatus::from_str(status.as_str()).unwrap(), *status);
        }
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(ElectionStatus::from_str("PAUSED").is_err());
    }
}
