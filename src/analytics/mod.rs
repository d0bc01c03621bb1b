// src/analytics/mod.rs

//! Group comparisons, teaching efficiency and repeated-measures analysis over
//! quiz results. Every call re-reads its inputs; nothing is cached.

pub mod compare;
pub mod efficiency;
pub mod engagement;
pub mod extract;
pub mod longitudinal;
pub mod source;
pub mod stats;

use serde::Serialize;

/// Label used when neither the result nor the enrollment names a group.
pub const UNKNOWN_GROUP: &str = "Unknown";

/// An analysis that either ran or could not run for lack of data.
/// Serializes as the payload itself or as `{"error": "..."}`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Outcome<T> {
    Ready(T),
    Unavailable { error: String },
}

impl<T> Outcome<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Outcome::Unavailable {
            error: reason.into(),
        }
    }
}

/// One-line summary shown next to each plot.
pub fn interpretation(test: &str, p_value: f64) -> String {
    let verdict = if p_value < stats::ALPHA {
        "Significant difference"
    } else {
        "No significant difference"
    };
    format!("Method: {}. Result: {} (p={:.4}).", test, verdict, p_value)
}

/// Rounds for presentation, matching the precision reported to researchers.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
