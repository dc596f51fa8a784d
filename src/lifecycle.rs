/**
 * The lifecycle module is the single source of truth for what an election
 * allows right now. Statuses are stored, not derived, so every check also
 * re-validates the time window where it matters.
 */
use chrono::{DateTime, Utc};
use log::*;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::VoteError;
use crate::models::{Election, ElectionStatus};

/**
 * Candidate applications are only open before the election starts.
 */
pub fn can_accept_applications(election: &Election) -> Result<(), VoteError> {
    if election.status == ElectionStatus::Upcoming {
        Ok(())
    } else {
        Err(VoteError::ElectionNotOpen)
    }
}

/**
 * Votes require an ACTIVE status and a clock inside [start_time, end_time].
 *
 * The status check comes first: an UPCOMING election rejects votes even if
 * its window has technically opened.
 */
pub fn can_accept_votes(election: &Election, now: DateTime<Utc>) -> Result<(), VoteError> {
    if election.status != ElectionStatus::Active {
        return Err(VoteError::VotingClosed);
    }
    if now < election.start_time || now > election.end_time {
        return Err(VoteError::OutsideVotingWindow);
    }
    Ok(())
}

/**
 * Whether a ballot may be shown: normally the voting rules apply, but a
 * preview additionally admits UPCOMING elections so ballots can be checked
 * before the window opens.
 */
pub fn can_present_ballot(
    election: &Election,
    preview: bool,
    now: DateTime<Utc>,
) -> Result<(), VoteError> {
    if preview {
        return match election.status {
            ElectionStatus::Upcoming | ElectionStatus::Active => Ok(()),
            _ => Err(VoteError::VotingClosed),
        };
    }
    can_accept_votes(election, now)
}

/**
 * Results stay hidden from ordinary users until voting is over: either the
 * status moved past ACTIVE, or the window has lapsed. Admins always see them.
 */
pub fn can_view_results(
    election: &Election,
    is_admin: bool,
    now: DateTime<Utc>,
) -> Result<(), VoteError> {
    if is_admin {
        return Ok(());
    }
    match election.status {
        ElectionStatus::Completed | ElectionStatus::Archived => Ok(()),
        ElectionStatus::Active if now > election.end_time => Ok(()),
        _ => Err(VoteError::ResultsNotYetAvailable),
    }
}

/**
 * Publishing flips an election to COMPLETED; it is only legal once the
 * voting window has lapsed.
 */
pub fn can_publish(election: &Election, now: DateTime<Utc>) -> Result<(), VoteError> {
    if now > election.end_time {
        Ok(())
    } else {
        Err(VoteError::ElectionStillOpen)
    }
}

/**
 * Admin action: mark an election COMPLETED after its window has closed.
 */
pub async fn publish(db: &PgPool, election_id: Uuid) -> Result<ElectionStatus, VoteError> {
    let mut tx = db.begin().await?;

    let election = Election::load(&mut tx, election_id)
        .await?
        .ok_or(VoteError::ElectionNotFound)?;
    can_publish(&election, Utc::now())?;

    sqlx::query("UPDATE elections SET status = $2 WHERE id = $1")
        .bind(election_id)
        .bind(ElectionStatus::Completed.as_str())
        .execute(&mut tx)
        .await?;
    tx.commit().await?;

    info!("election {} published", election_id);
    Ok(ElectionStatus::Completed)
}
