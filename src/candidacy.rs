/**
 * Candidate applications: students apply for one position per election,
 * admins approve or reject, and approval freezes the application. Approved
 * candidacies are what the ballot and tally modules consider eligible.
 */
use log::*;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{conflict_on_unique, VoteError};
use crate::lifecycle;
use crate::models::{CandidacyState, CandidateListing, Election, VoterIdentity};

/**
 * File an application for a position in an upcoming election.
 *
 * One candidacy per student per election, whatever the position; the unique
 * index on (election_id, student_id) settles concurrent duplicates.
 */
pub async fn apply(
    db: &PgPool,
    student_id: Uuid,
    position_id: Uuid,
    election_id: Uuid,
    platform_statement: Option<String>,
    photo_url: Option<String>,
) -> Result<Uuid, VoteError> {
    let mut tx = db.begin().await?;

    let voter = VoterIdentity::load(&mut tx, student_id)
        .await?
        .ok_or(VoteError::StudentNotFound)?;
    if !voter.is_verified {
        return Err(VoteError::StudentNotVerified);
    }

    let election = Election::load(&mut tx, election_id)
        .await?
        .ok_or(VoteError::ElectionNotFound)?;
    lifecycle::can_accept_applications(&election)?;

    let position: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM positions WHERE id = $1 AND election_id = $2")
            .bind(position_id)
            .bind(election_id)
            .fetch_optional(&mut tx)
            .await?;
    if position.is_none() {
        return Err(VoteError::PositionNotFound);
    }

    let existing: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM candidates WHERE election_id = $1 AND student_id = $2",
    )
    .bind(election_id)
    .bind(student_id)
    .fetch_one(&mut tx)
    .await?;
    if existing > 0 {
        return Err(VoteError::DuplicateCandidacy);
    }

    let candidate_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO candidates (id, student_id, position_id, election_id, platform_statement, photo_url, is_approved)
         VALUES ($1, $2, $3, $4, $5, $6, FALSE)",
    )
    .bind(candidate_id)
    .bind(voter.student_id)
    .bind(position_id)
    .bind(election_id)
    .bind(platform_statement)
    .bind(photo_url)
    .execute(&mut tx)
    .await
    .map_err(|err| conflict_on_unique(err, VoteError::DuplicateCandidacy))?;

    tx.commit().await?;

    info!(
        "candidacy {} filed for election {} awaiting approval",
        candidate_id, election_id
    );
    Ok(candidate_id)
}

/**
 * Owner edits to a pending application. Approved applications are frozen.
 */
pub async fn update(
    db: &PgPool,
    candidate_id: Uuid,
    platform_statement: Option<String>,
    photo_url: Option<String>,
) -> Result<(), VoteError> {
    let mut tx = db.begin().await?;

    let candidacy = CandidacyState::load(&mut tx, candidate_id)
        .await?
        .ok_or(VoteError::CandidateNotFound)?;
    if candidacy.is_approved {
        return Err(VoteError::ApplicationFrozen);
    }

    sqlx::query(
        "UPDATE candidates
         SET platform_statement = COALESCE($2, platform_statement),
             photo_url = COALESCE($3, photo_url)
         WHERE id = $1",
    )
    .bind(candidate_id)
    .bind(platform_statement)
    .bind(photo_url)
    .execute(&mut tx)
    .await?;
    tx.commit().await?;

    Ok(())
}

/**
 * Withdraw a pending application; the row is deleted outright.
 */
pub async fn withdraw(db: &PgPool, candidate_id: Uuid) -> Result<(), VoteError> {
    remove(db, candidate_id, "withdrawn").await
}

/**
 * Admin approval. Approving twice is rejected: the first approval froze the
 * application.
 */
pub async fn approve(db: &PgPool, candidate_id: Uuid) -> Result<(), VoteError> {
    let mut tx = db.begin().await?;

    let candidacy = CandidacyState::load(&mut tx, candidate_id)
        .await?
        .ok_or(VoteError::CandidateNotFound)?;
    if candidacy.is_approved {
        return Err(VoteError::ApplicationFrozen);
    }

    sqlx::query("UPDATE candidates SET is_approved = TRUE WHERE id = $1")
        .bind(candidate_id)
        .execute(&mut tx)
        .await?;
    tx.commit().await?;

    info!("candidacy {} approved", candidate_id);
    Ok(())
}

/**
 * Admin rejection deletes the pending application, same as a withdrawal.
 */
pub async fn reject(db: &PgPool, candidate_id: Uuid) -> Result<(), VoteError> {
    remove(db, candidate_id, "rejected").await
}

async fn remove(db: &PgPool, candidate_id: Uuid, action: &str) -> Result<(), VoteError> {
    let mut tx = db.begin().await?;

    let candidacy = CandidacyState::load(&mut tx, candidate_id)
        .await?
        .ok_or(VoteError::CandidateNotFound)?;
    if candidacy.is_approved {
        return Err(VoteError::ApplicationFrozen);
    }

    sqlx::query("DELETE FROM candidates WHERE id = $1")
        .bind(candidate_id)
        .execute(&mut tx)
        .await?;
    tx.commit().await?;

    info!("candidacy {} {}", candidate_id, action);
    Ok(())
}

/**
 * Every candidacy filed for an election, pending ones included, in
 * application order.
 */
pub async fn election_roster(
    db: &PgPool,
    election_id: Uuid,
) -> Result<Vec<CandidateListing>, VoteError> {
    let mut tx = db.begin().await?;

    Election::load(&mut tx, election_id)
        .await?
        .ok_or(VoteError::ElectionNotFound)?;

    let roster = sqlx::query_as::<_, CandidateListing>(
        "SELECT c.id, c.position_id, p.name AS position_name,
                u.first_name || ' ' || u.last_name AS name,
                d.name AS department, s.year_of_study,
                c.platform_statement, c.photo_url, c.is_approved,
                c.created_at AS applied_at
         FROM candidates c
         JOIN positions p ON p.id = c.position_id
         JOIN students s ON s.id = c.student_id
         JOIN users u ON u.id = s.user_id
         LEFT JOIN departments d ON d.id = s.department_id
         WHERE c.election_id = $1
         ORDER BY c.created_at",
    )
    .bind(election_id)
    .fetch_all(&mut tx)
    .await?;

    Ok(roster)
}
