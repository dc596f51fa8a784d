/**
 * End-to-end tests against a live PostgreSQL, skipped when DATABASE_URL is
 * unset. They exercise the full submission, tally, and application flows
 * including the races the unique indexes exist to settle.
 */
use async_std::task;
use uuid::Uuid;

use crate::api_models::VoteEntry;
use crate::ballot::{self, BallotMode};
use crate::candidacy;
use crate::error::VoteError;
use crate::models::ElectionStatus;
use crate::tally;
use crate::testkit;

fn entry(position_id: Uuid, candidate_id: Option<Uuid>) -> VoteEntry {
    VoteEntry {
        position_id,
        candidate_id,
    }
}

#[async_std::test]
async fn submit_then_tally_round_trip() {
    let pool = match testkit::pool().await {
        Some(pool) => pool,
        None => return,
    };

    let election = testkit::create_election(&pool, ElectionStatus::Active, -30, 30).await;
    let president = testkit::add_position(&pool, election, "President").await;
    let treasurer = testkit::add_position(&pool, election, "Treasurer").await;

    let hopeful = testkit::create_student(&pool, true).await;
    let candidate = testkit::add_candidate(&pool, election, president, hopeful, true).await;

    let voter = testkit::create_student(&pool, true).await;
    let votes = vec![entry(president, Some(candidate)), entry(treasurer, None)];

    let receipt = ballot::submit_ballot(
        &pool,
        election,
        voter,
        &votes,
        Some("203.0.113.7".to_string()),
        BallotMode::Partial,
    )
    .await
    .expect("submission should succeed");
    assert_eq!(receipt.votes_count, 2);

    let status = ballot::voted_status(&pool, election, voter)
        .await
        .expect("voted status");
    assert!(status.has_voted);
    assert!(status.voted_at.is_some());

    let results = tally::election_results(&pool, election, true)
        .await
        .expect("tally");
    assert_eq!(results.total_ballots, 1);

    let president_results = results
        .positions
        .iter()
        .find(|p| p.position_id == president)
        .expect("president results");
    assert_eq!(president_results.total_votes, 1);
    assert_eq!(president_results.nota_votes, 0);
    assert_eq!(president_results.winner_id, Some(candidate));
    assert_eq!(president_results.candidates[0].vote_count, 1);

    let treasurer_results = results
        .positions
        .iter()
        .find(|p| p.position_id == treasurer)
        .expect("treasurer results");
    assert_eq!(treasurer_results.total_votes, 1);
    assert_eq!(treasurer_results.nota_votes, 1);
    assert_eq!(treasurer_results.winner_id, None);
    assert!(treasurer_results.candidates.is_empty());
}

#[async_std::test]
async fn concurrent_double_vote_yields_one_ballot() {
    let pool = match testkit::pool().await {
        Some(pool) => pool,
        None => return,
    };

    let election = testkit::create_election(&pool, ElectionStatus::Active, -30, 30).await;
    let president = testkit::add_position(&pool, election, "President").await;
    let voter = testkit::create_student(&pool, true).await;
    let votes = vec![entry(president, None)];

    let first = {
        let db = pool.clone();
        let votes = votes.clone();
        task::spawn(async move {
            ballot::submit_ballot(&db, election, voter, &votes, None, BallotMode::Partial).await
        })
    };
    let second = {
        let db = pool.clone();
        let votes = votes.clone();
        task::spawn(async move {
            ballot::submit_ballot(&db, election, voter, &votes, None, BallotMode::Partial).await
        })
    };

    let outcomes = vec![first.await, second.await];
    let successes = outcomes.iter().filter(|o| o.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|o| matches!(o, Err(VoteError::AlreadyVoted)))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(conflicts, 1);

    let results = tally::election_results(&pool, election, true)
        .await
        .expect("tally");
    assert_eq!(results.total_ballots, 1);
}

#[async_std::test]
async fn upcoming_election_rejects_votes_even_inside_window() {
    let pool = match testkit::pool().await {
        Some(pool) => pool,
        None => return,
    };

    let election = testkit::create_election(&pool, ElectionStatus::Upcoming, -30, 30).await;
    let president = testkit::add_position(&pool, election, "President").await;
    let voter = testkit::create_student(&pool, true).await;

    let err = ballot::submit_ballot(
        &pool,
        election,
        voter,
        &[entry(president, None)],
        None,
        BallotMode::Partial,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, VoteError::VotingClosed));
}

#[async_std::test]
async fn unverified_students_cannot_vote() {
    let pool = match testkit::pool().await {
        Some(pool) => pool,
        None => return,
    };

    let election = testkit::create_election(&pool, ElectionStatus::Active, -30, 30).await;
    let president = testkit::add_position(&pool, election, "President").await;
    let voter = testkit::create_student(&pool, false).await;

    let err = ballot::submit_ballot(
        &pool,
        election,
        voter,
        &[entry(president, None)],
        None,
        BallotMode::Partial,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, VoteError::StudentNotVerified));
}

#[async_std::test]
async fn cross_position_votes_are_rejected() {
    let pool = match testkit::pool().await {
        Some(pool) => pool,
        None => return,
    };

    let election = testkit::create_election(&pool, ElectionStatus::Active, -30, 30).await;
    let president = testkit::add_position(&pool, election, "President").await;
    let treasurer = testkit::add_position(&pool, election, "Treasurer").await;

    let hopeful = testkit::create_student(&pool, true).await;
    let treasurer_candidate =
        testkit::add_candidate(&pool, election, treasurer, hopeful, true).await;

    let voter = testkit::create_student(&pool, true).await;
    let err = ballot::submit_ballot(
        &pool,
        election,
        voter,
        &[entry(president, Some(treasurer_candidate))],
        None,
        BallotMode::Partial,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, VoteError::InvalidCandidate(c) if c == treasurer_candidate));
}

#[async_std::test]
async fn results_stay_hidden_while_voting_is_open() {
    let pool = match testkit::pool().await {
        Some(pool) => pool,
        None => return,
    };

    let election = testkit::create_election(&pool, ElectionStatus::Active, -30, 30).await;
    testkit::add_position(&pool, election, "President").await;

    let denied = tally::election_results(&pool, election, false).await;
    assert!(matches!(denied, Err(VoteError::ResultsNotYetAvailable)));

    let admin_view = tally::election_results(&pool, election, true).await;
    assert!(admin_view.is_ok());
}

#[async_std::test]
async fn one_candidacy_per_student_per_election() {
    let pool = match testkit::pool().await {
        Some(pool) => pool,
        None => return,
    };

    let election = testkit::create_election(&pool, ElectionStatus::Upcoming, 60, 120).await;
    let president = testkit::add_position(&pool, election, "President").await;
    let treasurer = testkit::add_position(&pool, election, "Treasurer").await;
    let student = testkit::create_student(&pool, true).await;

    candidacy::apply(&pool, student, president, election, None, None)
        .await
        .expect("first application");

    // a different position makes no difference: one candidacy per election
    let err = candidacy::apply(&pool, student, treasurer, election, None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, VoteError::DuplicateCandidacy));
}

#[async_std::test]
async fn approval_freezes_an_application() {
    let pool = match testkit::pool().await {
        Some(pool) => pool,
        None => return,
    };

    let election = testkit::create_election(&pool, ElectionStatus::Upcoming, 60, 120).await;
    let president = testkit::add_position(&pool, election, "President").await;
    let student = testkit::create_student(&pool, true).await;

    let candidate = candidacy::apply(&pool, student, president, election, None, None)
        .await
        .expect("application");
    candidacy::approve(&pool, candidate).await.expect("approve");

    let frozen = candidacy::withdraw(&pool, candidate).await;
    assert!(matches!(frozen, Err(VoteError::ApplicationFrozen)));

    let re_approved = candidacy::approve(&pool, candidate).await;
    assert!(matches!(re_approved, Err(VoteError::ApplicationFrozen)));
}

#[async_std::test]
async fn duplicate_positions_on_one_ballot_are_rejected() {
    let pool = match testkit::pool().await {
        Some(pool) => pool,
        None => return,
    };

    let election = testkit::create_election(&pool, ElectionStatus::Active, -30, 30).await;
    let president = testkit::add_position(&pool, election, "President").await;
    let voter = testkit::create_student(&pool, true).await;

    let err = ballot::submit_ballot(
        &pool,
        election,
        voter,
        &[entry(president, None), entry(president, None)],
        None,
        BallotMode::Partial,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, VoteError::DuplicatePosition(p) if p == president));

    // nothing was persisted for the rejected ballot
    let status = ballot::voted_status(&pool, election, voter)
        .await
        .expect("voted status");
    assert!(!status.has_voted);
}
