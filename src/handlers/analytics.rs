// src/handlers/analytics.rs

//! Learner-facing analytics, plus the runners the admin views share.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    analytics::{
        Outcome,
        compare::{AnalysisReport, analyze_metrics},
        efficiency::{UserEfficiency, UserViewError, user_view},
        extract::MetricTable,
        longitudinal::{TimeSeriesReport, analyze_table},
        source::{CourseData, load_attempts, load_course, load_course_data},
    },
    error::AppError,
    models::quiz_result::{NasaRadar, NasaTlx, QUIZ_RESULT_COLUMNS, QuizResult},
    utils::jwt::Claims,
};

pub const NO_DATA: &str = "No data available for this course";

#[derive(Debug, Deserialize)]
pub struct AttemptQuery {
    pub target_attempt: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    /// Comma-separated attempt numbers, e.g. `1,2,3`. Empty means all.
    pub attempts: Option<String>,
}

/// Parses `1, 2,x,3` into `[1, 2, 3]`, skipping anything non-numeric.
pub fn parse_attempts(raw: Option<&str>) -> Vec<i64> {
    raw.unwrap_or_default()
        .split(',')
        .filter_map(|a| a.trim().parse::<i64>().ok())
        .collect()
}

/// Runs CPU-heavy analysis and rendering off the async workers.
pub async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!("Analysis task failed: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })
}

fn table_of(data: &CourseData) -> MetricTable {
    MetricTable::build(&data.course, &data.results, &data.enrollments)
}

/// Learners may only see courses they are enrolled in; admins see all.
async fn ensure_access(pool: &SqlitePool, claims: &Claims, course_id: i64) -> Result<i64, AppError> {
    let user_id = claims.user_id()?;
    load_course(pool, course_id).await?;
    if claims.is_admin() {
        return Ok(user_id);
    }
    let enrolled: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM enrollments WHERE user_id = ? AND course_id = ?")
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(pool)
            .await?;
    match enrolled {
        Some(_) => Ok(user_id),
        None => Err(AppError::Forbidden("Not enrolled in this course".to_string())),
    }
}

pub async fn group_stats(
    pool: &SqlitePool,
    course_id: i64,
    attempt: Option<i64>,
    highlight_user: Option<i64>,
) -> Result<Outcome<AnalysisReport>, AppError> {
    let data = load_course_data(pool, course_id, attempt).await?;
    let table = table_of(&data);
    if table.is_empty() {
        return Ok(Outcome::unavailable(NO_DATA));
    }
    let report = blocking(move || analyze_metrics(&table, highlight_user)).await?;
    Ok(Outcome::Ready(report))
}

pub async fn time_series(
    pool: &SqlitePool,
    course_id: i64,
    attempts: Vec<i64>,
) -> Result<Outcome<TimeSeriesReport>, AppError> {
    let data = load_course_data(pool, course_id, None).await?;
    let table = table_of(&data);
    if table.is_empty() {
        return Ok(Outcome::unavailable(NO_DATA));
    }
    let available = load_attempts(pool, course_id).await?;
    let report = blocking(move || analyze_table(&table, &attempts, available)).await?;
    Ok(Outcome::Ready(report))
}

pub async fn user_efficiency(
    pool: &SqlitePool,
    course_id: i64,
    user_id: i64,
    attempt: Option<i64>,
) -> Result<Outcome<UserEfficiency>, AppError> {
    let data = load_course_data(pool, course_id, attempt).await?;
    let table = table_of(&data);
    match blocking(move || user_view(&table, user_id)).await? {
        Ok(view) => Ok(Outcome::Ready(view)),
        Err(UserViewError::Plot(e)) => {
            tracing::error!("Efficiency plot failed for user {}: {}", user_id, e);
            Err(e.into())
        }
        Err(e) => Ok(Outcome::unavailable(e.to_string())),
    }
}

/// Group comparison over the whole course, with the caller's points marked.
pub async fn learner_stats(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
    Query(params): Query<AttemptQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = ensure_access(&pool, &claims, course_id).await?;
    let report = group_stats(&pool, course_id, params.target_attempt, Some(user_id)).await?;
    Ok(Json(report))
}

pub async fn learner_time_series(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
    Query(params): Query<SeriesQuery>,
) -> Result<impl IntoResponse, AppError> {
    ensure_access(&pool, &claims, course_id).await?;
    let report = time_series(&pool, course_id, parse_attempts(params.attempts.as_deref())).await?;
    Ok(Json(report))
}

pub async fn learner_efficiency_plot(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
    Query(params): Query<AttemptQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = ensure_access(&pool, &claims, course_id).await?;
    let view = user_efficiency(&pool, course_id, user_id, params.target_attempt).await?;
    Ok(Json(view))
}

/// NASA-TLX ratings of the caller's latest submission.
pub async fn nasa_radar(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = ensure_access(&pool, &claims, course_id).await?;

    let latest = sqlx::query_as::<_, QuizResult>(&format!(
        "SELECT {} FROM quiz_results \
         WHERE user_id = ? AND course_id = ? AND is_deleted = FALSE \
         ORDER BY attempt DESC, id DESC LIMIT 1",
        QUIZ_RESULT_COLUMNS
    ))
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| AppError::NotFound("No quiz results yet".to_string()))?;

    // An unreadable rating record shows as an empty chart.
    let nasa = latest.nasa().unwrap_or_else(|e| {
        tracing::warn!("Quiz result {}: {}", latest.id, e);
        NasaTlx::default()
    });
    Ok(Json(NasaRadar::from(&nasa)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_list_skips_junk() {
        assert_eq!(parse_attempts(Some("1, 2,x,,3")), vec![1, 2, 3]);
        assert!(parse_attempts(None).is_empty());
    }
}
