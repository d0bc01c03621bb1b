// src/models/submission.rs

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::quiz_result::NasaTlx;

/// A learner's answer: one option, or several for checkbox questions.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    One(String),
    Many(Vec<String>),
}

impl AnswerValue {
    pub fn values(&self) -> Vec<String> {
        match self {
            AnswerValue::One(v) => vec![v.clone()],
            AnswerValue::Many(vs) => vs.clone(),
        }
    }

    pub fn display(&self) -> String {
        self.values().join(", ")
    }
}

/// NASA-TLX ratings as submitted by the questionnaire.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct NasaRatings {
    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(default)]
    pub mental: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(default)]
    pub physical: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(default)]
    pub temporal: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(default)]
    pub performance: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(default)]
    pub effort: f64,
    #[validate(range(min = 0.0, max = 100.0))]
    #[serde(default)]
    pub frustration: f64,
}

impl From<&NasaRatings> for NasaTlx {
    fn from(r: &NasaRatings) -> Self {
        NasaTlx {
            mental: Some(r.mental),
            physical: Some(r.physical),
            temporal: Some(r.temporal),
            performance: Some(r.performance),
            effort: Some(r.effort),
            frustration: Some(r.frustration),
        }
    }
}

/// DTO for submitting a quiz attempt.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitQuizRequest {
    /// Key: question id. Value: selected option(s) or written sentence.
    #[serde(default)]
    pub answers: HashMap<String, AnswerValue>,

    #[validate(nested)]
    #[serde(default)]
    pub nasa: NasaRatings,

    /// Total seconds spent in the course before submitting.
    #[validate(range(min = 0.0))]
    #[serde(default)]
    pub learning_duration: f64,

    /// Raw per-stage timings as recorded by the client. Keys are stage
    /// indices ("0", "1", ...), "Quiz", "test_intro" or stage names.
    #[serde(default)]
    pub stage_timing: BTreeMap<String, f64>,

    /// Admins may take the quiz as a specific group.
    #[validate(length(min = 1, max = 50))]
    pub preview_group: Option<String>,
}

/// Per-question record kept with the result.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionLog {
    pub section: String,
    pub question: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub score: f64,
}

#[derive(Debug, Serialize)]
pub struct SubmitQuizResponse {
    pub id: i64,
    pub attempt: i64,
    pub group: String,
    pub score: i64,
    pub section_stats: BTreeMap<String, i64>,
}
