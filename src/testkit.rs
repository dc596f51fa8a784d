/**
 * Shared fixtures for the database-backed tests. Every helper seeds rows
 * under fresh UUIDs so suites can run concurrently against one database.
 *
 * `pool()` returns None when DATABASE_URL is unset, which lets the suite
 * pass on machines without PostgreSQL.
 */
use chrono::{Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::ElectionStatus;

pub async fn pool() -> Option<PgPool> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("failed to connect to DATABASE_URL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to apply migrations");
    Some(pool)
}

pub async fn create_student(pool: &PgPool, verified: bool) -> Uuid {
    let college_id = Uuid::new_v4();
    sqlx::query("INSERT INTO colleges (id, name) VALUES ($1, $2)")
        .bind(college_id)
        .bind("College of Engineering")
        .execute(pool)
        .await
        .expect("college insert");

    let department_id = Uuid::new_v4();
    sqlx::query("INSERT INTO departments (id, college_id, name) VALUES ($1, $2, $3)")
        .bind(department_id)
        .bind(college_id)
        .bind("Computer Science")
        .execute(pool)
        .await
        .expect("department insert");

    let user_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, email, password_hash, first_name, last_name, is_verified)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(user_id)
    .bind(format!("{}@campus.test", user_id))
    .bind("not-a-real-hash")
    .bind("Test")
    .bind("Voter")
    .bind(verified)
    .execute(pool)
    .await
    .expect("user insert");

    let student_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO students (id, user_id, department_id, year_of_study) VALUES ($1, $2, $3, $4)",
    )
    .bind(student_id)
    .bind(user_id)
    .bind(department_id)
    .bind("3")
    .execute(pool)
    .await
    .expect("student insert");

    student_id
}

pub async fn create_election(
    pool: &PgPool,
    status: ElectionStatus,
    starts_in_min: i64,
    ends_in_min: i64,
) -> Uuid {
    let election_id = Uuid::new_v4();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO elections (id, election_year, title, start_time, end_time, status)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(election_id)
    .bind("2026")
    .bind("Student Council Election")
    .bind(now + Duration::minutes(starts_in_min))
    .bind(now + Duration::minutes(ends_in_min))
    .bind(status.as_str())
    .execute(pool)
    .await
    .expect("election insert");

    election_id
}

pub async fn add_position(pool: &PgPool, election_id: Uuid, name: &str) -> Uuid {
    let position_id = Uuid::new_v4();
    sqlx::query("INSERT INTO positions (id, election_id, name) VALUES ($1, $2, $3)")
        .bind(position_id)
        .bind(election_id)
        .bind(name)
        .execute(pool)
        .await
        .expect("position insert");

    position_id
}

pub async fn add_candidate(
    pool: &PgPool,
    election_id: Uuid,
    position_id: Uuid,
    student_id: Uuid,
    approved: bool,
) -> Uuid {
    let candidate_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO candidates (id, student_id, position_id, election_id, platform_statement, is_approved)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(candidate_id)
    .bind(student_id)
    .bind(position_id)
    .bind(election_id)
    .bind("A platform statement")
    .bind(approved)
    .execute(pool)
    .await
    .expect("candidate insert");

    candidate_id
}
