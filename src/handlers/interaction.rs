// src/handlers/interaction.rs

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    analytics::source::load_course,
    error::AppError,
    models::interaction::CreateInteractionRequest,
    utils::jwt::Claims,
};

/// Records a like, dislike or view on a vocabulary image.
///
/// A learner holds at most one vote per image: a new like or dislike
/// replaces the previous one. Views always append.
pub async fn record_interaction(
    State(pool): State<SqlitePool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateInteractionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id()?;
    load_course(&pool, payload.course_id).await?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    if payload.action.is_vote() {
        sqlx::query(
            "DELETE FROM image_interactions \
             WHERE user_id = ? AND image_url = ? AND action IN ('like', 'dislike')",
        )
        .bind(user_id)
        .bind(&payload.image_url)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    }

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO image_interactions (user_id, course_id, image_url, vocab_id, action, context)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(payload.course_id)
    .bind(&payload.image_url)
    .bind(payload.vocab_id)
    .bind(payload.action.as_str())
    .bind(&payload.context)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::error!("Failed to record interaction: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    tx.commit()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "action": payload.action })),
    ))
}
