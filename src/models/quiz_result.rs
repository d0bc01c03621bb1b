// src/models/quiz_result.rs

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sqlx::FromRow;

/// Represents the 'quiz_results' table in the database.
/// One row per quiz submission.
///
/// The three JSON columns are kept raw here; use the typed accessors
/// (`sections`, `timings`, `nasa`) to read them.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuizResult {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,

    /// Monotonically increasing per (user, course).
    pub attempt: i64,

    /// Group snapshotted at submission time. Legacy rows may lack it.
    pub group_name: Option<String>,

    /// Overall percentage (dynamic quizzes) or correct-translation count (legacy).
    pub translation_score: f64,
    pub sentence_score: f64,

    /// Mean of the six NASA-TLX ratings.
    pub nasa_tlx_score: f64,
    pub nasa_details_json: Option<String>,

    pub learning_duration_seconds: f64,
    pub stage_timing_json: Option<String>,
    pub section_stats: Option<String>,

    pub is_deleted: bool,
}

/// Column list matching `QuizResult`, shared by every query that loads results.
pub const QUIZ_RESULT_COLUMNS: &str = "id, user_id, course_id, attempt, group_name, \
    translation_score, sentence_score, nasa_tlx_score, nasa_details_json, \
    learning_duration_seconds, stage_timing_json, section_stats, is_deleted";

impl QuizResult {
    pub fn sections(&self) -> Result<SectionScores, ParseError> {
        parse_json_field("section_stats", self.section_stats.as_deref())
    }

    pub fn timings(&self) -> Result<StageTimings, ParseError> {
        parse_json_field("stage_timing_json", self.stage_timing_json.as_deref())
    }

    pub fn nasa(&self) -> Result<NasaTlx, ParseError> {
        parse_json_field("nasa_details_json", self.nasa_details_json.as_deref())
    }
}

/// Failure to read one of the JSON sub-records stored on a quiz result or course.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The column holds text that is not the expected JSON shape.
    Malformed { field: &'static str, message: String },

    /// The column holds a pre-migration representation.
    LegacyFormat { field: &'static str },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Malformed { field, message } => {
                write!(f, "malformed {}: {}", field, message)
            }
            ParseError::LegacyFormat { field } => {
                write!(f, "{} is stored in a legacy format", field)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses an optional JSON column. Missing or blank text yields the default value.
pub fn parse_json_field<T: DeserializeOwned + Default>(
    field: &'static str,
    raw: Option<&str>,
) -> Result<T, ParseError> {
    match raw.map(str::trim) {
        None | Some("") | Some("null") => Ok(T::default()),
        Some(text) => serde_json::from_str(text).map_err(|e| ParseError::Malformed {
            field,
            message: e.to_string(),
        }),
    }
}

/// Per-section percentage scores, e.g. `{"Translation": 80, "Part A": 100}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionScores(pub BTreeMap<String, f64>);

impl SectionScores {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, section: &str) -> Option<f64> {
        self.0.get(section).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }
}

/// Elapsed seconds per stage name, e.g. `{"Stage 1": 120, "Quiz": 300}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageTimings(pub BTreeMap<String, f64>);

impl StageTimings {
    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }
}

/// The six NASA-TLX workload ratings, each on a 0-100 scale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NasaTlx {
    #[serde(default, alias = "Mental")]
    pub mental: Option<f64>,
    #[serde(default, alias = "Physical")]
    pub physical: Option<f64>,
    #[serde(default, alias = "Temporal")]
    pub temporal: Option<f64>,
    #[serde(default, alias = "Performance")]
    pub performance: Option<f64>,
    #[serde(default, alias = "Effort")]
    pub effort: Option<f64>,
    #[serde(default, alias = "Frustration")]
    pub frustration: Option<f64>,
}

impl NasaTlx {
    /// Dimension labels in instrument order.
    pub const DIMENSIONS: [&'static str; 6] = [
        "Mental",
        "Physical",
        "Temporal",
        "Performance",
        "Effort",
        "Frustration",
    ];

    /// Present ratings as `(label, value)` pairs in instrument order.
    pub fn ratings(&self) -> Vec<(&'static str, f64)> {
        let values = [
            self.mental,
            self.physical,
            self.temporal,
            self.performance,
            self.effort,
            self.frustration,
        ];
        Self::DIMENSIONS
            .iter()
            .zip(values)
            .filter_map(|(label, v)| v.map(|v| (*label, v)))
            .collect()
    }

    /// Mean of the six ratings, missing ones counted as 0.
    pub fn overall(&self) -> f64 {
        self.ratings().iter().map(|(_, v)| v).sum::<f64>() / 6.0
    }
}

/// Metric name under which a NASA dimension is analysed.
pub fn nasa_metric_name(dimension: &str) -> String {
    format!("NASA: {}", dimension)
}

/// DTO for the learner NASA radar chart.
#[derive(Debug, Serialize)]
pub struct NasaRadar {
    pub mental: f64,
    pub physical: f64,
    pub temporal: f64,
    pub performance: f64,
    pub effort: f64,
    pub frustration: f64,
}

impl From<&NasaTlx> for NasaRadar {
    fn from(n: &NasaTlx) -> Self {
        Self {
            mental: n.mental.unwrap_or(0.0),
            physical: n.physical.unwrap_or(0.0),
            temporal: n.temporal.unwrap_or(0.0),
            performance: n.performance.unwrap_or(0.0),
            effort: n.effort.unwrap_or(0.0),
            frustration: n.frustration.unwrap_or(0.0),
        }
    }
}
