/**
 * Read-only aggregation of vote selections into per-position results.
 *
 * Tallies are computed on demand from the persisted selections; there are no
 * running counters to drift. Selections reach this module joined through
 * ballots, never through voter identity.
 */
use chrono::Utc;
use log::*;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use uuid::Uuid;

use crate::api_models::{CandidateResult, ElectionResults, PositionResults};
use crate::error::VoteError;
use crate::lifecycle;
use crate::models::{CandidateProfile, Election, Position};

/**
 * Aggregate one position: per-candidate counts (zero-vote candidates
 * included), a separate abstention counter, candidates sorted by count
 * descending with ties left in application order.
 *
 * A winner is only declared when one candidate strictly out-polls every
 * other candidate and the abstention count; "None of the Above" can block a
 * winner but never wins itself.
 */
pub fn tally_position(
    position: &Position,
    candidates: &[CandidateProfile],
    selections: &[Option<Uuid>],
) -> PositionResults {
    let mut counts: HashMap<Uuid, i64> = HashMap::new();
    let mut nota_votes: i64 = 0;

    for choice in selections {
        match choice {
            Some(candidate_id) => *counts.entry(*candidate_id).or_insert(0) += 1,
            None => nota_votes += 1,
        }
    }

    let mut rows: Vec<CandidateResult> = candidates
        .iter()
        .map(|candidate| CandidateResult {
            candidate_id: candidate.id,
            name: candidate.name.clone(),
            department: candidate.department.clone(),
            year_of_study: candidate.year_of_study.clone(),
            platform_statement: candidate.platform_statement.clone(),
            photo_url: candidate.photo_url.clone(),
            vote_count: counts.get(&candidate.id).copied().unwrap_or(0),
            is_winner: false,
        })
        .collect();

    // stable sort: equal counts keep application order
    rows.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));

    let winner_id = declare_winner(&rows, nota_votes);
    if let Some(winner_id) = winner_id {
        for row in rows.iter_mut() {
            row.is_winner = row.candidate_id == winner_id;
        }
    }

    PositionResults {
        position_id: position.id,
        position_name: position.name.clone(),
        nota_votes,
        total_votes: selections.len() as i64,
        winner_id,
        candidates: rows,
    }
}

fn declare_winner(rows: &[CandidateResult], nota_votes: i64) -> Option<Uuid> {
    let top = rows.first()?;
    let runner_up = rows.get(1).map(|row| row.vote_count).unwrap_or(0);

    if top.vote_count > runner_up && top.vote_count > nota_votes {
        Some(top.candidate_id)
    } else {
        None
    }
}

/**
 * Results for a whole election, gated by the results-visibility rule.
 *
 * The participation denominator is the ballot count, not the selection
 * count. A position with no candidates and no votes yields an empty entry.
 */
pub async fn election_results(
    db: &PgPool,
    election_id: Uuid,
    is_admin: bool,
) -> Result<ElectionResults, VoteError> {
    let mut tx = db.begin().await?;

    let election = Election::load(&mut tx, election_id)
        .await?
        .ok_or(VoteError::ElectionNotFound)?;
    lifecycle::can_view_results(&election, is_admin, Utc::now())?;

    let total_ballots = count_ballots(&mut tx, election_id).await?;
    let positions = Position::for_election(&mut tx, election_id).await?;

    let mut results = ElectionResults {
        election: (&election).into(),
        total_ballots,
        positions: Vec::with_capacity(positions.len()),
    };

    for position in &positions {
        let candidates =
            CandidateProfile::approved_for_position(&mut tx, election_id, position.id).await?;
        let selections = position_selections(&mut tx, election_id, position.id).await?;
        results
            .positions
            .push(tally_position(position, &candidates, &selections));
    }

    debug!(
        "tallied election {}: {} ballots across {} positions",
        election_id,
        total_ballots,
        positions.len()
    );
    Ok(results)
}

/**
 * Results for a single position of an election, under the same visibility
 * rule as the full tally.
 */
pub async fn position_results(
    db: &PgPool,
    election_id: Uuid,
    position_id: Uuid,
    is_admin: bool,
) -> Result<PositionResults, VoteError> {
    let mut tx = db.begin().await?;

    let election = Election::load(&mut tx, election_id)
        .await?
        .ok_or(VoteError::ElectionNotFound)?;
    lifecycle::can_view_results(&election, is_admin, Utc::now())?;

    let position = sqlx::query_as::<_, Position>(
        "SELECT id, name FROM positions WHERE id = $1 AND election_id = $2",
    )
    .bind(position_id)
    .bind(election_id)
    .fetch_optional(&mut tx)
    .await?
    .ok_or(VoteError::PositionNotFound)?;

    let candidates =
        CandidateProfile::approved_for_position(&mut tx, election_id, position.id).await?;
    let selections = position_selections(&mut tx, election_id, position.id).await?;

    Ok(tally_position(&position, &candidates, &selections))
}

/**
 * Ballot count for an election: the turnout denominator.
 */
pub async fn count_ballots(
    tx: &mut Transaction<'_, Postgres>,
    election_id: Uuid,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM ballots WHERE election_id = $1")
        .bind(election_id)
        .fetch_one(tx)
        .await
}

// The join runs through ballots to scope selections to the election; voter
// identity never enters the query.
async fn position_selections(
    tx: &mut Transaction<'_, Postgres>,
    election_id: Uuid,
    position_id: Uuid,
) -> Result<Vec<Option<Uuid>>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT vs.candidate_id
         FROM vote_selections vs
         JOIN ballots b ON b.id = vs.ballot_id
         WHERE b.election_id = $1 AND vs.position_id = $2",
    )
    .bind(election_id)
    .bind(position_id)
    .fetch_all(tx)
    .await
}
