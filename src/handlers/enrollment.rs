// src/handlers/enrollment.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::SqlitePool;

use crate::{
    analytics::source::load_course,
    error::AppError,
    models::{course::least_populated_group, enrollment::Enrollment},
    utils::jwt::Claims,
};

/// Enrolls the caller in a course.
///
/// * Returns the existing enrollment unchanged when there is one.
/// * Otherwise assigns the configured group with the fewest learners,
///   ties going to the first group in configured order.
pub async fn join_course(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let course = load_course(&pool, course_id).await?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let existing = sqlx::query_as::<_, Enrollment>(
        "SELECT id, user_id, course_id, group_name FROM enrollments WHERE user_id = ? AND course_id = ?",
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    if let Some(enrollment) = existing {
        return Ok((StatusCode::OK, Json(enrollment)));
    }

    let counts: Vec<(String, i64)> = sqlx::query_as(
        "SELECT group_name, COUNT(*) FROM enrollments WHERE course_id = ? GROUP BY group_name",
    )
    .bind(course_id)
    .fetch_all(&mut *tx)
    .await
    .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    let counts: HashMap<String, i64> = counts.into_iter().collect();

    let group = least_populated_group(&course.groups(), &counts).ok_or_else(|| {
        AppError::InternalServerError(format!("Course {} has no groups", course_id))
    })?;

    let enrollment = sqlx::query_as::<_, Enrollment>(
        r#"
        INSERT INTO enrollments (user_id, course_id, group_name)
        VALUES (?, ?, ?)
        RETURNING id, user_id, course_id, group_name
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .bind(&group)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to enroll user {} in course {}: {:?}", user_id, course_id, e);
        AppError::from(e)
    })?;

    tx.commit()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    tracing::info!("User {} joined course {} as group {}", user_id, course_id, group);

    Ok((StatusCode::CREATED, Json(enrollment)))
}
