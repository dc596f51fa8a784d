use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CandidateProfile, Election, ElectionStatus};

/**
 * One choice on a submitted ballot: a position, and either a candidate or
 * `null` for "None of the Above".
 */
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct VoteEntry {
    pub position_id: Uuid,
    pub candidate_id: Option<Uuid>,
}

/**
 * User-provided ballot with all their votes
 */
#[derive(Debug, Deserialize)]
pub struct VotePayload {
    pub election_id: Uuid,
    pub student_id: Uuid,
    pub votes: Vec<VoteEntry>,
}

/**
 * What the voter gets back after a successful submission. Deliberately never
 * echoes the chosen candidates.
 */
#[derive(Debug, Serialize)]
pub struct VoteReceipt {
    pub ballot_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub votes_count: usize,
}

#[derive(Debug, Serialize)]
pub struct VotedStatus {
    pub has_voted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ElectionSummary {
    pub id: Uuid,
    pub title: String,
    pub election_year: Option<String>,
    pub status: ElectionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub is_anonymous_tally: bool,
}

impl From<&Election> for ElectionSummary {
    fn from(election: &Election) -> Self {
        Self {
            id: election.id,
            title: election.title.clone(),
            election_year: election.election_year.clone(),
            status: election.status,
            start_time: election.start_time,
            end_time: election.end_time,
            is_anonymous_tally: election.is_anonymous_tally,
        }
    }
}

/**
 * The ballot as presented to a voter: every position with its approved
 * candidates.
 */
#[derive(Debug, Serialize)]
pub struct BallotView {
    pub election: ElectionSummary,
    pub positions: Vec<PositionBallot>,
}

#[derive(Debug, Serialize)]
pub struct PositionBallot {
    pub id: Uuid,
    pub name: String,
    pub candidates: Vec<BallotCandidate>,
}

#[derive(Debug, Serialize)]
pub struct BallotCandidate {
    pub id: Uuid,
    pub name: String,
    pub platform_statement: Option<String>,
    pub photo_url: Option<String>,
    pub year_of_study: String,
}

impl From<&CandidateProfile> for BallotCandidate {
    fn from(profile: &CandidateProfile) -> Self {
        Self {
            id: profile.id,
            name: profile.name.clone(),
            platform_statement: profile.platform_statement.clone(),
            photo_url: profile.photo_url.clone(),
            year_of_study: profile.year_of_study.clone(),
        }
    }
}

/**
 * Results from a whole election
 */
#[derive(Debug, Serialize)]
pub struct ElectionResults {
    pub election: ElectionSummary,
    pub total_ballots: i64,
    pub positions: Vec<PositionResults>,
}

#[derive(Debug, Serialize)]
pub struct PositionResults {
    pub position_id: Uuid,
    pub position_name: String,
    pub candidates: Vec<CandidateResult>,
    pub nota_votes: i64,
    pub total_votes: i64,
    /**
     * Only set when one candidate strictly out-polled every other candidate
     * and the abstention count.
     */
    pub winner_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CandidateResult {
    pub candidate_id: Uuid,
    pub name: String,
    pub department: Option<String>,
    pub year_of_study: String,
    pub platform_statement: Option<String>,
    pub photo_url: Option<String>,
    pub vote_count: i64,
    pub is_winner: bool,
}

/**
 * Candidate application, as submitted by a student.
 */
#[derive(Debug, Deserialize)]
pub struct ApplicationRequest {
    pub student_id: Uuid,
    pub position_id: Uuid,
    pub election_id: Uuid,
    pub platform_statement: Option<String>,
    pub photo_url: Option<String>,
}

/**
 * Owner edits to a pending application; absent fields are left untouched.
 */
#[derive(Debug, Deserialize)]
pub struct ApplicationUpdate {
    pub platform_statement: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApplicationReceipt {
    pub candidate_id: Uuid,
    pub status: &'static str,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultsQuery {
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct BallotQuery {
    #[serde(default)]
    pub preview: bool,
}
