// src/models/interaction.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;
use validator::Validate;

/// Represents the 'image_interactions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImageInteraction {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub image_url: String,
    pub vocab_id: Option<i64>,
    pub action: String,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionAction {
    Like,
    Dislike,
    View,
}

impl InteractionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionAction::Like => "like",
            InteractionAction::Dislike => "dislike",
            InteractionAction::View => "view",
        }
    }

    /// Likes and dislikes are a single vote per image; views accumulate.
    pub fn is_vote(&self) -> bool {
        !matches!(self, InteractionAction::View)
    }
}

/// DTO for recording an image interaction.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateInteractionRequest {
    #[validate(length(min = 1, max = 500), custom(function = validate_image_url))]
    pub image_url: String,
    pub action: InteractionAction,
    pub course_id: i64,
    pub vocab_id: Option<i64>,
    #[validate(length(max = 50))]
    pub context: Option<String>,
}

/// Accepts absolute URLs and root-relative paths into the static directory.
fn validate_image_url(url: &str) -> Result<(), validator::ValidationError> {
    if url.starts_with('/') && !url.starts_with("//") {
        return Ok(());
    }
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}

/// Per-image aggregate for the admin image analytics view.
#[derive(Debug, Serialize, PartialEq)]
pub struct ImageStats {
    pub image_url: String,
    pub vocab_id: Option<i64>,
    pub course_id: i64,
    pub word: String,
    pub chinese: Option<String>,
    pub likes: u32,
    pub dislikes: u32,
    pub views: u32,
    pub unique_viewers: usize,
}
