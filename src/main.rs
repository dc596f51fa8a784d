use dotenv::dotenv;
use log::*;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tide::{Body, Request, Response, StatusCode};
use uuid::Uuid;

use std::env;

mod api_models;
mod ballot;
mod candidacy;
mod error;
mod lifecycle;
mod models;
mod tally;

#[cfg(test)]
mod db_tests;
#[cfg(test)]
mod testkit;

use crate::ballot::BallotMode;
use crate::error::VoteError;

/**
 * Struct for carrying application state into tide request handlers
 */
#[derive(Clone, Debug)]
pub struct AppState {
    pub db: PgPool,
    pub ballot_mode: BallotMode,
}

/**
 * Create the sqlx connection pool for postgresql
 */
async fn create_pool() -> Result<PgPool, sqlx::Error> {
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
}

/**
 * Serialize a body into a JSON response with the given status
 */
fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> tide::Result<Response> {
    Ok(Response::builder(status)
        .body(Body::from_json(body)?)
        .build())
}

/**
 * Pull a UUID out of a path parameter, rejecting anything malformed before
 * it reaches a query
 */
fn param_uuid(req: &Request<AppState>, key: &str) -> Result<Uuid, VoteError> {
    let raw: String = req
        .param(key)
        .map_err(|_| VoteError::InvalidId(key.to_string()))?;
    Uuid::parse_str(&raw).map_err(|_| VoteError::InvalidId(raw))
}

/**
 * Best-effort client address for the ballot audit trail: the proxy header
 * when present, the socket peer otherwise
 */
fn client_ip(req: &Request<AppState>) -> Option<String> {
    req.header("x-forwarded-for")
        .map(|values| values.last().as_str().to_string())
        .or_else(|| req.remote().map(String::from))
}

/**
 * The routes module contains all the tide routes and the logic to fulfill
 * the responses for each route.
 *
 * Modules are nested for cleaner organization here
 */
mod routes {
    use tide::Request;

    use crate::AppState;

    /**
     *  GET /
     */
    pub async fn index(_req: Request<AppState>) -> Result<String, tide::Error> {
        Ok(format!("digivote v{}", env!("CARGO_PKG_VERSION")))
    }

    pub mod elections {
        use log::*;
        use tide::{Request, Response, StatusCode};

        use crate::api_models::{BallotQuery, ResultsQuery};
        use crate::models::{CompletedElection, Election};
        use crate::{json_response, param_uuid, AppState};

        /**
         *  GET /api/v1/elections/active
         */
        pub async fn active(req: Request<AppState>) -> Result<Response, tide::Error> {
            let elections = sqlx::query_as::<_, Election>(
                "SELECT id, election_year, title, description, start_time, end_time, status, is_anonymous_tally
                 FROM elections
                 WHERE status = 'ACTIVE' AND start_time <= NOW() AND end_time >= NOW()
                 ORDER BY end_time",
            )
            .fetch_all(&req.state().db)
            .await;

            match elections {
                Ok(elections) => json_response(StatusCode::Ok, &elections),
                Err(err) => Ok(crate::VoteError::from(err).into_response()),
            }
        }

        /**
         *  GET /api/v1/elections/completed
         */
        pub async fn completed(req: Request<AppState>) -> Result<Response, tide::Error> {
            let elections = sqlx::query_as::<_, CompletedElection>(
                "SELECT e.id, e.title, e.election_year, e.status, e.end_time,
                        (SELECT COUNT(*) FROM ballots b WHERE b.election_id = e.id) AS total_voters
                 FROM elections e
                 WHERE e.status IN ('COMPLETED', 'ARCHIVED')
                 ORDER BY e.end_time DESC",
            )
            .fetch_all(&req.state().db)
            .await;

            match elections {
                Ok(elections) => json_response(StatusCode::Ok, &elections),
                Err(err) => Ok(crate::VoteError::from(err).into_response()),
            }
        }

        /**
         *  GET /api/v1/elections/:election/ballot
         */
        pub async fn ballot(req: Request<AppState>) -> Result<Response, tide::Error> {
            let election_id = match param_uuid(&req, "election") {
                Ok(id) => id,
                Err(err) => return Ok(err.into_response()),
            };
            let query: BallotQuery =
                serde_qs::from_str(req.url().query().unwrap_or("")).unwrap_or_default();

            debug!("Fetching ballot for election: {}", election_id);

            match crate::ballot::ballot_view(&req.state().db, election_id, query.preview).await {
                Ok(view) => json_response(StatusCode::Ok, &view),
                Err(err) => Ok(err.into_response()),
            }
        }

        /**
         *  GET /api/v1/elections/:election/voted/:student
         */
        pub async fn voted(req: Request<AppState>) -> Result<Response, tide::Error> {
            let election_id = match param_uuid(&req, "election") {
                Ok(id) => id,
                Err(err) => return Ok(err.into_response()),
            };
            let student_id = match param_uuid(&req, "student") {
                Ok(id) => id,
                Err(err) => return Ok(err.into_response()),
            };

            match crate::ballot::voted_status(&req.state().db, election_id, student_id).await {
                Ok(status) => json_response(StatusCode::Ok, &status),
                Err(err) => Ok(err.into_response()),
            }
        }

        /**
         *  GET /api/v1/elections/:election/results
         */
        pub async fn results(req: Request<AppState>) -> Result<Response, tide::Error> {
            let election_id = match param_uuid(&req, "election") {
                Ok(id) => id,
                Err(err) => return Ok(err.into_response()),
            };
            let query: ResultsQuery =
                serde_qs::from_str(req.url().query().unwrap_or("")).unwrap_or_default();

            match crate::tally::election_results(&req.state().db, election_id, query.is_admin).await
            {
                Ok(results) => json_response(StatusCode::Ok, &results),
                Err(err) => Ok(err.into_response()),
            }
        }

        /**
         *  GET /api/v1/elections/:election/results/:position
         */
        pub async fn position_results(req: Request<AppState>) -> Result<Response, tide::Error> {
            let election_id = match param_uuid(&req, "election") {
                Ok(id) => id,
                Err(err) => return Ok(err.into_response()),
            };
            let position_id = match param_uuid(&req, "position") {
                Ok(id) => id,
                Err(err) => return Ok(err.into_response()),
            };
            let query: ResultsQuery =
                serde_qs::from_str(req.url().query().unwrap_or("")).unwrap_or_default();

            match crate::tally::position_results(
                &req.state().db,
                election_id,
                position_id,
                query.is_admin,
            )
            .await
            {
                Ok(results) => json_response(StatusCode::Ok, &results),
                Err(err) => Ok(err.into_response()),
            }
        }

        /**
         *  POST /api/v1/elections/:election/publish
         */
        pub async fn publish(req: Request<AppState>) -> Result<Response, tide::Error> {
            let election_id = match param_uuid(&req, "election") {
                Ok(id) => id,
                Err(err) => return Ok(err.into_response()),
            };

            match crate::lifecycle::publish(&req.state().db, election_id).await {
                Ok(status) => json_response(
                    StatusCode::Ok,
                    &serde_json::json!({
                        "election_id": election_id,
                        "status": status,
                    }),
                ),
                Err(err) => Ok(err.into_response()),
            }
        }
    }

    pub mod votes {
        use log::*;
        use tide::{Request, Response, StatusCode};

        use crate::api_models::VotePayload;
        use crate::{client_ip, json_response, AppState};

        /**
         *  POST /api/v1/vote
         */
        pub async fn submit(mut req: Request<AppState>) -> Result<Response, tide::Error> {
            let payload: VotePayload = req.body_json().await?;
            let ip = client_ip(&req);

            info!(
                "ballot received for election {} from student {}",
                payload.election_id, payload.student_id
            );

            let state = req.state();
            match crate::ballot::submit_ballot(
                &state.db,
                payload.election_id,
                payload.student_id,
                &payload.votes,
                ip,
                state.ballot_mode,
            )
            .await
            {
                Ok(receipt) => json_response(StatusCode::Created, &receipt),
                Err(err) => Ok(err.into_response()),
            }
        }
    }

    pub mod candidates {
        use tide::{Request, Response, StatusCode};

        use crate::api_models::{ApplicationReceipt, ApplicationRequest, ApplicationUpdate};
        use crate::{json_response, param_uuid, AppState};

        /**
         *  POST /api/v1/candidates/apply
         */
        pub async fn apply(mut req: Request<AppState>) -> Result<Response, tide::Error> {
            let payload: ApplicationRequest = req.body_json().await?;

            match crate::candidacy::apply(
                &req.state().db,
                payload.student_id,
                payload.position_id,
                payload.election_id,
                payload.platform_statement,
                payload.photo_url,
            )
            .await
            {
                Ok(candidate_id) => json_response(
                    StatusCode::Created,
                    &ApplicationReceipt {
                        candidate_id,
                        status: "pending_approval",
                    },
                ),
                Err(err) => Ok(err.into_response()),
            }
        }

        /**
         *  GET /api/v1/candidates/election/:election
         */
        pub async fn roster(req: Request<AppState>) -> Result<Response, tide::Error> {
            let election_id = match param_uuid(&req, "election") {
                Ok(id) => id,
                Err(err) => return Ok(err.into_response()),
            };

            match crate::candidacy::election_roster(&req.state().db, election_id).await {
                Ok(roster) => json_response(
                    StatusCode::Ok,
                    &serde_json::json!({
                        "candidates": roster,
                        "total": roster.len(),
                    }),
                ),
                Err(err) => Ok(err.into_response()),
            }
        }

        /**
         *  PUT /api/v1/candidates/:candidate
         */
        pub async fn update(mut req: Request<AppState>) -> Result<Response, tide::Error> {
            let payload: ApplicationUpdate = req.body_json().await?;
            let candidate_id = match param_uuid(&req, "candidate") {
                Ok(id) => id,
                Err(err) => return Ok(err.into_response()),
            };

            match crate::candidacy::update(
                &req.state().db,
                candidate_id,
                payload.platform_statement,
                payload.photo_url,
            )
            .await
            {
                Ok(()) => json_response(
                    StatusCode::Ok,
                    &serde_json::json!({ "candidate_id": candidate_id }),
                ),
                Err(err) => Ok(err.into_response()),
            }
        }

        /**
         *  DELETE /api/v1/candidates/:candidate
         */
        pub async fn withdraw(req: Request<AppState>) -> Result<Response, tide::Error> {
            let candidate_id = match param_uuid(&req, "candidate") {
                Ok(id) => id,
                Err(err) => return Ok(err.into_response()),
            };

            match crate::candidacy::withdraw(&req.state().db, candidate_id).await {
                Ok(()) => Ok(Response::new(StatusCode::NoContent)),
                Err(err) => Ok(err.into_response()),
            }
        }

        /**
         *  POST /api/v1/candidates/:candidate/approve
         */
        pub async fn approve(req: Request<AppState>) -> Result<Response, tide::Error> {
            let candidate_id = match param_uuid(&req, "candidate") {
                Ok(id) => id,
                Err(err) => return Ok(err.into_response()),
            };

            match crate::candidacy::approve(&req.state().db, candidate_id).await {
                Ok(()) => json_response(
                    StatusCode::Ok,
                    &serde_json::json!({ "candidate_id": candidate_id }),
                ),
                Err(err) => Ok(err.into_response()),
            }
        }

        /**
         *  POST /api/v1/candidates/:candidate/reject
         */
        pub async fn reject(req: Request<AppState>) -> Result<Response, tide::Error> {
            let candidate_id = match param_uuid(&req, "candidate") {
                Ok(id) => id,
                Err(err) => return Ok(err.into_response()),
            };

            match crate::candidacy::reject(&req.state().db, candidate_id).await {
                Ok(()) => Ok(Response::new(StatusCode::NoContent)),
                Err(err) => Ok(err.into_response()),
            }
        }
    }
}

#[async_std::main]
async fn main() -> Result<(), std::io::Error> {
    dotenv().ok();
    pretty_env_logger::init();

    match create_pool().await {
        Ok(db) => {
            if let Err(err) = sqlx::migrate!("./migrations").run(&db).await {
                error!("Failed to apply migrations! {:?}", err);
                return Err(std::io::Error::new(std::io::ErrorKind::Other, err));
            }

            let ballot_mode = BallotMode::from_env(env::var("STRICT_BALLOTS").ok());
            info!("ballot mode: {:?}", ballot_mode);

            let state = AppState { db, ballot_mode };
            let mut app = tide::with_state(state);
            app.with(driftwood::ApacheCombinedLogger);

            app.at("/").get(routes::index);
            app.at("/api/v1/elections/active")
                .get(routes::elections::active);
            app.at("/api/v1/elections/completed")
                .get(routes::elections::completed);
            app.at("/api/v1/elections/:election/ballot")
                .get(routes::elections::ballot);
            app.at("/api/v1/elections/:election/voted/:student")
                .get(routes::elections::voted);
            app.at("/api/v1/elections/:election/results")
                .get(routes::elections::results);
            app.at("/api/v1/elections/:election/results/:position")
                .get(routes::elections::position_results);
            app.at("/api/v1/elections/:election/publish")
                .post(routes::elections::publish);
            app.at("/api/v1/vote").post(routes::votes::submit);
            app.at("/api/v1/candidates/apply")
                .post(routes::candidates::apply);
            app.at("/api/v1/candidates/election/:election")
                .get(routes::candidates::roster);
            app.at("/api/v1/candidates/:candidate")
                .put(routes::candidates::update)
                .delete(routes::candidates::withdraw);
            app.at("/api/v1/candidates/:candidate/approve")
                .post(routes::candidates::approve);
            app.at("/api/v1/candidates/:candidate/reject")
                .post(routes::candidates::reject);

            let bind = env::var("HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8000".to_string());
            info!("listening on {}", bind);
            app.listen(bind).await?;
            Ok(())
        }
        Err(err) => {
            error!("Could not initialize pool! {:?}", err);
            Err(std::io::Error::new(std::io::ErrorKind::Other, err))
        }
    }
}
