// src/models/vocabulary.rs

use serde::Serialize;
use sqlx::FromRow;

/// The subset of the 'vocabulary' table the analytics views read.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VocabularyWord {
    pub id: i64,
    pub word: String,
    pub chinese_meaning: String,
}
