/**
 * Ballot presentation and submission.
 *
 * Submission runs one transaction spanning every validation read and the
 * ballot + selection inserts; the unique index on (election_id, student_id)
 * is the final arbiter of the one-ballot rule under concurrent requests.
 */
use chrono::{DateTime, Utc};
use log::*;
use sqlx::PgPool;
use std::collections::HashSet;
use uuid::Uuid;

use crate::api_models::{BallotCandidate, BallotView, PositionBallot, VoteEntry, VoteReceipt, VotedStatus};
use crate::error::{conflict_on_unique, VoteError};
use crate::lifecycle;
use crate::models::{CandidateProfile, CandidateSlot, Election, Position, VoterIdentity};

/**
 * Whether a ballot may leave positions blank. The mode is a startup switch
 * (`STRICT_BALLOTS`), never inferred per request.
 */
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BallotMode {
    /// Unlisted positions simply record no selection.
    Partial,
    /// Every position of the election must appear on the ballot.
    Full,
}

impl BallotMode {
    pub fn from_env(value: Option<String>) -> BallotMode {
        match value {
            Some(v) if v == "1" || v.eq_ignore_ascii_case("true") => BallotMode::Full,
            _ => BallotMode::Partial,
        }
    }
}

/**
 * Collapse the wire representation into the one canonical shape the engine
 * works with: an ordered list of (position, candidate-or-abstain) pairs.
 * Listing a position twice is rejected outright.
 */
pub fn normalize(votes: &[VoteEntry]) -> Result<Vec<(Uuid, Option<Uuid>)>, VoteError> {
    let mut seen = HashSet::with_capacity(votes.len());
    let mut selections = Vec::with_capacity(votes.len());

    for entry in votes {
        if !seen.insert(entry.position_id) {
            return Err(VoteError::DuplicatePosition(entry.position_id));
        }
        selections.push((entry.position_id, entry.candidate_id));
    }
    Ok(selections)
}

/**
 * The validation pipeline every submission goes through, in a fixed order:
 * positions must belong to the election, a Full-mode ballot must cover all
 * of them, and every named candidate must be approved for exactly the
 * position being voted on.
 */
fn validate_selections(
    selections: &[(Uuid, Option<Uuid>)],
    positions: &[Uuid],
    candidates: &[CandidateSlot],
    mode: BallotMode,
) -> Result<(), VoteError> {
    for (position_id, _) in selections {
        if !positions.contains(position_id) {
            return Err(VoteError::InvalidPosition(*position_id));
        }
    }

    if mode == BallotMode::Full {
        for position_id in positions {
            if !selections.iter().any(|(p, _)| p == position_id) {
                return Err(VoteError::IncompleteBallot);
            }
        }
    }

    for (position_id, candidate_id) in selections {
        if let Some(candidate_id) = candidate_id {
            let valid = candidates
                .iter()
                .any(|slot| slot.id == *candidate_id && slot.position_id == *position_id);
            if !valid {
                return Err(VoteError::InvalidCandidate(*candidate_id));
            }
        }
    }
    Ok(())
}

/**
 * Record one student's ballot for an election.
 *
 * Checks short-circuit in a fixed order so each rejection names exactly one
 * reason: voter identity, election and window, prior ballot, positions,
 * candidates. On success the receipt never repeats the choices made.
 */
pub async fn submit_ballot(
    db: &PgPool,
    election_id: Uuid,
    student_id: Uuid,
    votes: &[VoteEntry],
    client_ip: Option<String>,
    mode: BallotMode,
) -> Result<VoteReceipt, VoteError> {
    let selections = normalize(votes)?;

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
    lifecycle::can_accept_votes(&election, Utc::now())?;

    // Friendlier rejection for the common case; the unique index still
    // backstops anything that slips between this read and the insert.
    let prior: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM ballots WHERE election_id = $1 AND student_id = $2")
            .bind(election_id)
            .bind(student_id)
            .fetch_one(&mut tx)
            .await?;
    if prior > 0 {
        return Err(VoteError::AlreadyVoted);
    }

    let positions: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM positions WHERE election_id = $1")
        .bind(election_id)
        .fetch_all(&mut tx)
        .await?;
    let candidates = CandidateSlot::approved_for_election(&mut tx, election_id).await?;
    validate_selections(&selections, &positions, &candidates, mode)?;

    let ballot_id = Uuid::new_v4();
    let submitted_at: DateTime<Utc> = sqlx::query_scalar(
        "INSERT INTO ballots (id, election_id, student_id, ip_address)
         VALUES ($1, $2, $3, $4) RETURNING submitted_at",
    )
    .bind(ballot_id)
    .bind(election_id)
    .bind(voter.student_id)
    .bind(client_ip)
    .fetch_one(&mut tx)
    .await
    .map_err(|err| conflict_on_unique(err, VoteError::AlreadyVoted))?;

    for (position_id, candidate_id) in &selections {
        sqlx::query(
            "INSERT INTO vote_selections (id, ballot_id, position_id, candidate_id)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::new_v4())
        .bind(ballot_id)
        .bind(*position_id)
        .bind(*candidate_id)
        .execute(&mut tx)
        .await?;
    }

    tx.commit().await?;

    info!(
        "ballot {} recorded for election {} ({} selections)",
        ballot_id,
        election_id,
        selections.len()
    );
    Ok(VoteReceipt {
        ballot_id,
        submitted_at,
        votes_count: selections.len(),
    })
}

/**
 * The ballot a voter sees: every position of the election with its approved
 * candidates. `preview` additionally admits UPCOMING elections.
 */
pub async fn ballot_view(
    db: &PgPool,
    election_id: Uuid,
    preview: bool,
) -> Result<BallotView, VoteError> {
    let mut tx = db.begin().await?;

    let election = Election::load(&mut tx, election_id)
        .await?
        .ok_or(VoteError::ElectionNotFound)?;
    lifecycle::can_present_ballot(&election, preview, Utc::now())?;

    let positions = Position::for_election(&mut tx, election_id).await?;
    let mut view = BallotView {
        election: (&election).into(),
        positions: Vec::with_capacity(positions.len()),
    };

    for position in positions {
        let candidates =
            CandidateProfile::approved_for_position(&mut tx, election_id, position.id).await?;
        view.positions.push(PositionBallot {
            id: position.id,
            name: position.name,
            candidates: candidates.iter().map(BallotCandidate::from).collect(),
        });
    }

    debug!("ballot for election {} built", election_id);
    Ok(view)
}

/**
 * Whether a student already cast a ballot in an election, and when.
 */
pub async fn voted_status(
    db: &PgPool,
    election_id: Uuid,
    student_id: Uuid,
) -> Result<VotedStatus, VoteError> {
    let mut tx = db.begin().await?;

    Election::load(&mut tx, election_id)
        .await?
        .ok_or(VoteError::ElectionNotFound)?;

    let voted_at: Option<DateTime<Utc>> = sqlx::query_scalar(
        "SELECT submitted_at FROM ballots WHERE election_id = $1 AND student_id = $2",
    )
    .bind(election_id)
    .bind(student_id)
    .fetch_optional(&mut tx)
    .await?;

    Ok(VotedStatus {
        has_voted: voted_at.is_some(),
        voted_at,
    })
}
