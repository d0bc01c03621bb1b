// src/handlers/admin.rs

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::analytics::{
    NO_DATA, blocking, group_stats, parse_attempts, time_series, user_efficiency,
};
use crate::{
    analytics::{
        Outcome, efficiency,
        engagement::{self, aggregate_images, load_interactions},
        extract::MetricTable,
        source::{load_attempts, load_course, load_course_data, load_enrollment_groups},
    },
    error::AppError,
    models::vocabulary::VocabularyWord,
};

#[derive(Debug, Deserialize)]
pub struct CourseQuery {
    pub course_id: i64,
    pub target_attempt: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UserEfficiencyQuery {
    pub course_id: i64,
    pub user_id: i64,
    pub target_attempt: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct EngagementQuery {
    pub course_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    pub course_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TimeSeriesQuery {
    pub course_id: i64,
    pub attempts: Option<String>,
}

/// Group comparison of every metric in a course.
/// Admin only.
pub async fn stats(
    State(pool): State<SqlitePool>,
    Query(params): Query<CourseQuery>,
) -> Result<impl IntoResponse, AppError> {
    let report = group_stats(&pool, params.course_id, params.target_attempt, None).await?;
    Ok(Json(report))
}

/// Attempt numbers that have at least one live result.
pub async fn list_attempts(
    State(pool): State<SqlitePool>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    load_course(&pool, course_id).await?;
    let attempts = load_attempts(&pool, course_id).await?;
    Ok(Json(json!({ "attempts": attempts })))
}

async fn efficiency_report(
    pool: &SqlitePool,
    params: &CourseQuery,
    with_plots: bool,
) -> Result<Outcome<efficiency::EfficiencyReport>, AppError> {
    let data = load_course_data(pool, params.course_id, params.target_attempt).await?;
    let table = MetricTable::build(&data.course, &data.results, &data.enrollments);
    if table.is_empty() {
        return Ok(Outcome::unavailable(NO_DATA));
    }
    let report = blocking(move || efficiency::analyze_sections(&table, with_plots)).await?;
    Ok(Outcome::Ready(report))
}

/// Paas efficiency per section, without images.
pub async fn efficiency_analysis(
    State(pool): State<SqlitePool>,
    Query(params): Query<CourseQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(efficiency_report(&pool, &params, false).await?))
}

/// Paas efficiency per section with the quadrant and score panels.
pub async fn efficiency_plot(
    State(pool): State<SqlitePool>,
    Query(params): Query<CourseQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(efficiency_report(&pool, &params, true).await?))
}

pub async fn user_efficiency_plot(
    State(pool): State<SqlitePool>,
    Query(params): Query<UserEfficiencyQuery>,
) -> Result<impl IntoResponse, AppError> {
    let view = user_efficiency(&pool, params.course_id, params.user_id, params.target_attempt).await?;
    Ok(Json(view))
}

async fn engagement_report(
    pool: &SqlitePool,
    course_id: i64,
    with_plot: bool,
) -> Result<Outcome<engagement::EngagementReport>, AppError> {
    load_course(pool, course_id).await?;
    let interactions = load_interactions(pool, Some(course_id)).await?;
    let enrollments = load_enrollment_groups(pool, course_id).await?;
    blocking(move || engagement::analyze(&interactions, &enrollments, with_plot)).await
}

pub async fn engagement_analysis(
    State(pool): State<SqlitePool>,
    Query(params): Query<EngagementQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engagement_report(&pool, params.course_id, false).await?))
}

pub async fn engagement_plot(
    State(pool): State<SqlitePool>,
    Query(params): Query<EngagementQuery>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(engagement_report(&pool, params.course_id, true).await?))
}

/// Likes, dislikes and views per image, with the linked vocabulary word.
pub async fn image_analytics(
    State(pool): State<SqlitePool>,
    Query(params): Query<ImageQuery>,
) -> Result<impl IntoResponse, AppError> {
    let interactions = load_interactions(&pool, params.course_id).await?;
    let mut images = aggregate_images(&interactions);

    let mut vocab_ids: Vec<i64> = images.iter().filter_map(|i| i.vocab_id).collect();
    vocab_ids.sort_unstable();
    vocab_ids.dedup();

    if !vocab_ids.is_empty() {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, word, chinese_meaning FROM vocabulary WHERE id IN (");
        let mut separated = qb.separated(",");
        for id in &vocab_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let words: HashMap<i64, VocabularyWord> = qb
            .build_query_as::<VocabularyWord>()
            .fetch_all(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to load vocabulary: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?
            .into_iter()
            .map(|w| (w.id, w))
            .collect();

        for image in &mut images {
            if let Some(w) = image.vocab_id.and_then(|id| words.get(&id)) {
                image.word = w.word.clone();
                image.chinese = Some(w.chinese_meaning.clone());
            }
        }
    }

    Ok(Json(json!({ "analytics": images })))
}

/// Repeated-measures comparison across the selected attempts.
pub async fn admin_time_series(
    State(pool): State<SqlitePool>,
    Query(params): Query<TimeSeriesQuery>,
) -> Result<impl IntoResponse, AppError> {
    let report = time_series(
        &pool,
        params.course_id,
        parse_attempts(params.attempts.as_deref()),
    )
    .await?;
    Ok(Json(report))
}
