// src/analytics/source.rs

//! Read-only loaders feeding the analytics engines.

use std::collections::HashMap;

use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    error::AppError,
    models::{
        course::Course,
        quiz_result::{QUIZ_RESULT_COLUMNS, QuizResult},
    },
};

pub async fn load_course(pool: &SqlitePool, course_id: i64) -> Result<Course, AppError> {
    sqlx::query_as::<_, Course>(
        "SELECT id, name, group_names, stage_config, quiz_config, is_deleted \
         FROM courses WHERE id = ? AND is_deleted = FALSE",
    )
    .bind(course_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to load course {}: {:?}", course_id, e);
        AppError::InternalServerError(e.to_string())
    })?
    .ok_or_else(|| AppError::NotFound(format!("Course {} not found", course_id)))
}

/// Non-deleted results of a course, optionally restricted to one attempt,
/// ordered by submission.
pub async fn load_results(
    pool: &SqlitePool,
    course_id: i64,
    attempt: Option<i64>,
) -> Result<Vec<QuizResult>, AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
    qb.push(QUIZ_RESULT_COLUMNS);
    qb.push(" FROM quiz_results WHERE is_deleted = FALSE AND course_id = ");
    qb.push_bind(course_id);
    if let Some(attempt) = attempt {
        qb.push(" AND attempt = ");
        qb.push_bind(attempt);
    }
    qb.push(" ORDER BY id");

    qb.build_query_as::<QuizResult>()
        .fetch_all(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load results for course {}: {:?}", course_id, e);
            AppError::InternalServerError(e.to_string())
        })
}

/// user_id -> enrolled group for a course.
pub async fn load_enrollment_groups(
    pool: &SqlitePool,
    course_id: i64,
) -> Result<HashMap<i64, String>, AppError> {
    let rows: Vec<(i64, String)> =
        sqlx::query_as("SELECT user_id, group_name FROM enrollments WHERE course_id = ?")
            .bind(course_id)
            .fetch_all(pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to load enrollments for course {}: {:?}", course_id, e);
                AppError::InternalServerError(e.to_string())
            })?;
    Ok(rows.into_iter().collect())
}

/// Distinct non-deleted attempt numbers, ascending.
pub async fn load_attempts(pool: &SqlitePool, course_id: i64) -> Result<Vec<i64>, AppError> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT DISTINCT attempt FROM quiz_results \
         WHERE course_id = ? AND is_deleted = FALSE ORDER BY attempt",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(a,)| a).collect())
}

/// Everything the result-based engines need for one request.
pub struct CourseData {
    pub course: Course,
    pub results: Vec<QuizResult>,
    pub enrollments: HashMap<i64, String>,
}

pub async fn load_course_data(
    pool: &SqlitePool,
    course_id: i64,
    attempt: Option<i64>,
) -> Result<CourseData, AppError> {
    let course = load_course(pool, course_id).await?;
    let results = load_results(pool, course_id, attempt).await?;
    let enrollments = load_enrollment_groups(pool, course_id).await?;
    Ok(CourseData {
        course,
        results,
        enrollments,
    })
}
