use log::*;
use tide::{Body, Response, StatusCode};
use uuid::Uuid;

/**
 * Every rejection the voting core can hand back to a client.
 *
 * Each variant carries a stable machine-readable code alongside the human
 * text, so clients can branch on `code` without parsing messages.
 */
#[derive(Debug, thiserror::Error)]
pub enum VoteError {
    #[error("election not found")]
    ElectionNotFound,

    #[error("student not found")]
    StudentNotFound,

    #[error("position not found in this election")]
    PositionNotFound,

    #[error("candidate application not found")]
    CandidateNotFound,

    #[error("a ballot has already been submitted for this election")]
    AlreadyVoted,

    #[error("student already has a candidacy in this election")]
    DuplicateCandidacy,

    #[error("malformed identifier: {0}")]
    InvalidId(String),

    #[error("position {0} appears more than once on the ballot")]
    DuplicatePosition(Uuid),

    #[error("position {0} does not belong to this election")]
    InvalidPosition(Uuid),

    #[error("candidate {0} is not a valid choice for that position")]
    InvalidCandidate(Uuid),

    #[error("ballot must cover every position in the election")]
    IncompleteBallot,

    #[error("election has not ended yet")]
    ElectionStillOpen,

    #[error("student account is not verified")]
    StudentNotVerified,

    #[error("election is not accepting applications")]
    ElectionNotOpen,

    #[error("election is not accepting votes")]
    VotingClosed,

    #[error("outside the voting window")]
    OutsideVotingWindow,

    #[error("results are not available while voting is open")]
    ResultsNotYetAvailable,

    #[error("approved applications are frozen")]
    ApplicationFrozen,

    #[error("storage failure")]
    Storage(#[from] sqlx::Error),
}

impl VoteError {
    pub fn code(&self) -> &'static str {
        use VoteError::*;
        match self {
            ElectionNotFound => "ELECTION_NOT_FOUND",
            StudentNotFound => "STUDENT_NOT_FOUND",
            PositionNotFound => "POSITION_NOT_FOUND",
            CandidateNotFound => "CANDIDATE_NOT_FOUND",
            AlreadyVoted => "ALREADY_VOTED",
            DuplicateCandidacy => "DUPLICATE_CANDIDACY",
            InvalidId(_) => "INVALID_ID",
            DuplicatePosition(_) => "DUPLICATE_POSITION",
            InvalidPosition(_) => "INVALID_POSITION",
            InvalidCandidate(_) => "INVALID_CANDIDATE",
            IncompleteBallot => "INCOMPLETE_BALLOT",
            ElectionStillOpen => "ELECTION_STILL_OPEN",
            StudentNotVerified => "STUDENT_NOT_VERIFIED",
            ElectionNotOpen => "ELECTION_NOT_OPEN",
            VotingClosed => "VOTING_CLOSED",
            OutsideVotingWindow => "OUTSIDE_VOTING_WINDOW",
            ResultsNotYetAvailable => "RESULTS_NOT_YET_AVAILABLE",
            ApplicationFrozen => "APPLICATION_FROZEN",
            Storage(_) => "STORAGE_FAILURE",
        }
    }

    pub fn status(&self) -> StatusCode {
        use VoteError::*;
        match self {
            ElectionNotFound | StudentNotFound | PositionNotFound | CandidateNotFound => {
                StatusCode::NotFound
            }
            AlreadyVoted | DuplicateCandidacy => StatusCode::Conflict,
            InvalidId(_) | DuplicatePosition(_) | InvalidPosition(_) | InvalidCandidate(_)
            | IncompleteBallot | ElectionStillOpen => StatusCode::BadRequest,
            StudentNotVerified | ElectionNotOpen | VotingClosed | OutsideVotingWindow
            | ResultsNotYetAvailable | ApplicationFrozen => StatusCode::Forbidden,
            Storage(_) => StatusCode::InternalServerError,
        }
    }

    /**
     * Render the rejection as a JSON response body.
     *
     * Storage failures are logged here and surfaced as an opaque 500; every
     * other variant reaches the client with its precise reason.
     */
    pub fn into_response(self) -> Response {
        if let VoteError::Storage(ref err) = self {
            error!("storage failure: {:?}", err);
        }

        let payload = serde_json::json!({
            "code": self.code(),
            "error": self.to_string(),
        });

        let mut response = Response::new(self.status());
        match Body::from_json(&payload) {
            Ok(body) => response.set_body(body),
            Err(_) => response.set_body(self.to_string()),
        }
        response
    }
}

/**
 * Remap a unique-index violation onto its domain conflict, leaving any other
 * database error to surface as a storage failure.
 *
 * The unique indexes are the authoritative guard against concurrent
 * duplicates; the pre-check queries only exist for friendlier ordering.
 */
pub fn conflict_on_unique(err: sqlx::Error, conflict: VoteError) -> VoteError {
    if is_unique_violation(&err) {
        conflict
    } else {
        VoteError::Storage(err)
    }
}

// PostgreSQL SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
            .map(|pg| pg.code() == UNIQUE_VIOLATION)
            .unwrap_or(false),
        _ => false,
    }
}
