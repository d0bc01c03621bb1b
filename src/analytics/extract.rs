// src/analytics/extract.rs

//! Flattens quiz results into per-metric values keyed by experimental group.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use super::UNKNOWN_GROUP;
use crate::{
    models::{
        course::{Course, QUIZ_STAGE_KEYS, StageConfig},
        quiz_result::{NasaTlx, QuizResult, SectionScores, nasa_metric_name},
    },
    utils::natural::natural_cmp,
};

pub const QUIZ_DURATION: &str = "Quiz Duration";
pub const TOTAL_DURATION: &str = "Total Duration";
pub const LEARNING_DURATION: &str = "Learning Duration";

/// Fixed duration metrics, always reported first.
pub const DURATION_METRICS: [&str; 3] = [QUIZ_DURATION, TOTAL_DURATION, LEARNING_DURATION];

/// Group of a result: its own snapshot, else the enrollment, else `Unknown`.
pub fn resolve_group(
    snapshot: Option<&str>,
    user_id: i64,
    enrollments: &HashMap<i64, String>,
) -> String {
    match snapshot.map(str::trim) {
        Some(g) if !g.is_empty() && g != UNKNOWN_GROUP => g.to_string(),
        _ => enrollments
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_GROUP.to_string()),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Durations {
    pub learning: f64,
    pub quiz: f64,
    pub total: f64,
}

/// One quiz result with its sub-records decoded.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub result_id: i64,
    pub user_id: i64,
    pub attempt: i64,
    pub group: String,
    pub durations: Durations,
    pub sections: SectionScores,
    pub nasa: NasaTlx,
    pub nasa_tlx_score: f64,
}

impl ResultRow {
    pub fn metric(&self, name: &str) -> Option<f64> {
        let value = match name {
            QUIZ_DURATION => Some(self.durations.quiz),
            TOTAL_DURATION => Some(self.durations.total),
            LEARNING_DURATION => Some(self.durations.learning),
            _ => match name.strip_prefix("NASA: ") {
                Some(dim) => self
                    .nasa
                    .ratings()
                    .into_iter()
                    .find(|(label, _)| *label == dim)
                    .map(|(_, v)| v),
                None => self.sections.get(name),
            },
        };
        value.filter(|v| v.is_finite())
    }
}

/// One (result, metric) cell. `value` is `None` when the result has no value
/// for a metric another result reported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    pub result_id: i64,
    pub user_id: i64,
    pub group: String,
    pub metric: String,
    pub value: Option<f64>,
}

/// Decoded rows plus the metric names discovered across them.
#[derive(Debug, Clone, Default)]
pub struct MetricTable {
    pub rows: Vec<ResultRow>,
    pub metrics: Vec<String>,
    /// Parse problems met while decoding, one line each.
    pub warnings: Vec<String>,
}

impl MetricTable {
    pub fn build(
        course: &Course,
        results: &[QuizResult],
        enrollments: &HashMap<i64, String>,
    ) -> Self {
        let mut warnings = Vec::new();

        let stages = match course.stages() {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Course {} stage config unreadable: {}", course.id, e);
                warnings.push(format!("course {}: {}", course.id, e));
                StageConfig::default()
            }
        };

        let mut section_names = BTreeSet::new();
        let mut has_nasa = [false; 6];
        let mut rows = Vec::with_capacity(results.len());

        for r in results.iter().filter(|r| !r.is_deleted) {
            let group = resolve_group(r.group_name.as_deref(), r.user_id, enrollments);
            let durations = durations_for(r, &stages, &group, &mut warnings);

            let (mut sections, sections_ok) = match r.sections() {
                Ok(s) => (s, true),
                Err(e) => {
                    tracing::warn!("Quiz result {}: {}", r.id, e);
                    warnings.push(format!("result {}: {}", r.id, e));
                    (SectionScores::default(), false)
                }
            };
            if sections.is_empty() && sections_ok && r.translation_score != 0.0 {
                sections.0.insert("Translation".to_string(), r.translation_score);
            }
            section_names.extend(sections.0.keys().cloned());

            let nasa = match r.nasa() {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("Quiz result {}: {}", r.id, e);
                    warnings.push(format!("result {}: {}", r.id, e));
                    NasaTlx::default()
                }
            };
            for (label, _) in nasa.ratings() {
                if let Some(i) = NasaTlx::DIMENSIONS.iter().position(|d| *d == label) {
                    has_nasa[i] = true;
                }
            }

            rows.push(ResultRow {
                result_id: r.id,
                user_id: r.user_id,
                attempt: r.attempt,
                group,
                durations,
                sections,
                nasa,
                nasa_tlx_score: r.nasa_tlx_score,
            });
        }

        let metrics = if rows.is_empty() {
            Vec::new()
        } else {
            let mut sections: Vec<String> = section_names.into_iter().collect();
            sections.sort_by(|a, b| natural_cmp(a, b));
            DURATION_METRICS
                .iter()
                .map(|m| m.to_string())
                .chain(sections)
                .chain(
                    NasaTlx::DIMENSIONS
                        .iter()
                        .zip(has_nasa)
                        .filter(|(_, present)| *present)
                        .map(|(d, _)| nasa_metric_name(d)),
                )
                .collect()
        };

        Self {
            rows,
            metrics,
            warnings,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every (result, metric) pair, including empty cells.
    pub fn records(&self) -> Vec<MetricRecord> {
        self.rows
            .iter()
            .flat_map(|row| {
                self.metrics.iter().map(move |m| MetricRecord {
                    result_id: row.result_id,
                    user_id: row.user_id,
                    group: row.group.clone(),
                    metric: m.clone(),
                    value: row.metric(m),
                })
            })
            .collect()
    }

    /// Present values per metric and group, as (user_id, value), built from
    /// [`records`](Self::records).
    pub fn grouped_points(&self) -> BTreeMap<String, BTreeMap<String, Vec<(i64, f64)>>> {
        let mut out: BTreeMap<String, BTreeMap<String, Vec<(i64, f64)>>> = BTreeMap::new();
        for record in self.records() {
            if let Some(v) = record.value {
                out.entry(record.metric)
                    .or_default()
                    .entry(record.group)
                    .or_default()
                    .push((record.user_id, v));
            }
        }
        out
    }

    /// Section names present in the table, in display order.
    pub fn section_metrics(&self) -> Vec<&str> {
        self.metrics
            .iter()
            .map(String::as_str)
            .filter(|m| !DURATION_METRICS.contains(m) && !m.starts_with("NASA: "))
            .collect()
    }
}

/// Learning and quiz time per the course stage list; unknown keys are dropped.
fn durations_for(
    r: &QuizResult,
    stages: &StageConfig,
    group: &str,
    warnings: &mut Vec<String>,
) -> Durations {
    match r.timings() {
        Ok(timings) => {
            let active = stages.active_stage_names(group);
            let mut d = Durations::default();
            for (key, secs) in timings.iter() {
                if active.contains(key.as_str()) {
                    d.learning += secs;
                } else if QUIZ_STAGE_KEYS.contains(&key.as_str()) {
                    d.quiz += secs;
                }
            }
            d.total = d.learning + d.quiz;
            d
        }
        Err(e) => {
            tracing::warn!("Quiz result {}: {}; using recorded learning duration", r.id, e);
            warnings.push(format!("result {}: {}", r.id, e));
            Durations {
                learning: r.learning_duration_seconds,
                quiz: 0.0,
                total: r.learning_duration_seconds,
            }
        }
    }
}
