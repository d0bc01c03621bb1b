// src/analytics/longitudinal.rs

//! Repeated-measures analysis of one metric across quiz attempts.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::{
    extract::MetricTable,
    stats::{
        self, ALPHA, PairwiseComparison, StatsError, TestOutcome, bonferroni, describe,
    },
};
use crate::{
    plot::{
        self,
        trend::{Bracket, TrendPlot, TrendPoint},
    },
    utils::natural::natural_cmp,
};

/// Display label of an attempt.
pub fn time_label(attempt: i64) -> String {
    format!("Test {}", attempt)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub subject: i64,
    pub time: String,
    pub value: f64,
}

/// Subject x time matrix holding only complete cases.
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    /// Time labels in natural order.
    pub times: Vec<String>,
    pub subjects: Vec<i64>,
    /// `rows[s][t]` is subject `s` at time `t`.
    pub rows: Vec<Vec<f64>>,
}

impl Pivot {
    pub fn column(&self, t: usize) -> Vec<f64> {
        self.rows.iter().map(|r| r[t]).collect()
    }
}

/// Reshapes observations; a repeated (subject, time) pair is an error.
/// Subjects missing any time point are dropped.
pub fn pivot(observations: &[Observation]) -> Result<Pivot, StatsError> {
    let mut cells: HashMap<(i64, &str), f64> = HashMap::new();
    let mut times: Vec<String> = Vec::new();
    for o in observations {
        if cells.insert((o.subject, o.time.as_str()), o.value).is_some() {
            return Err(StatsError::NotRectangular(format!(
                "subject {} has more than one value at {}",
                o.subject, o.time
            )));
        }
        if !times.contains(&o.time) {
            times.push(o.time.clone());
        }
    }
    times.sort_by(|a, b| natural_cmp(a, b));

    let mut subjects: Vec<i64> = observations.iter().map(|o| o.subject).collect();
    subjects.sort_unstable();
    subjects.dedup();

    let mut kept = Vec::new();
    let mut rows = Vec::new();
    for s in subjects {
        let row: Option<Vec<f64>> = times
            .iter()
            .map(|t| cells.get(&(s, t.as_str())).copied())
            .collect();
        if let Some(row) = row {
            kept.push(s);
            rows.push(row);
        }
    }
    Ok(Pivot {
        times,
        subjects: kept,
        rows,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RepeatedTest {
    #[serde(rename = "Wilcoxon Signed-Rank")]
    SignedRank,
    #[serde(rename = "Friedman")]
    Friedman,
}

impl RepeatedTest {
    pub fn name(&self) -> &'static str {
        match self {
            RepeatedTest::SignedRank => "Wilcoxon Signed-Rank",
            RepeatedTest::Friedman => "Friedman",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepeatedMeasures {
    pub test: RepeatedTest,
    pub stat: f64,
    pub p_value: f64,
    pub significant: bool,
    pub n_subjects: usize,
    pub time_points: Vec<String>,
    /// Pairwise signed-rank tests, present when the omnibus test is significant.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub posthoc: Vec<PairwiseComparison>,
    /// Post-hoc failure, reported without discarding the omnibus result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posthoc_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimePointSummary {
    pub time: String,
    pub n: usize,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LongitudinalResult {
    pub stats: RepeatedMeasures,
    pub table: Vec<TimePointSummary>,
}

pub fn analyze(observations: &[Observation]) -> Result<LongitudinalResult, StatsError> {
    let p = pivot(observations)?;
    let k = p.times.len();
    if k < 2 {
        return Err(StatsError::InsufficientData(
            "need at least two time points".to_string(),
        ));
    }
    if p.rows.len() < 2 {
        return Err(StatsError::InsufficientData(
            "need at least two subjects with every time point".to_string(),
        ));
    }

    let (test, outcome): (RepeatedTest, TestOutcome) = if k == 2 {
        (
            RepeatedTest::SignedRank,
            stats::wilcoxon_signed_rank(&p.column(0), &p.column(1))?,
        )
    } else {
        (RepeatedTest::Friedman, stats::friedman(&p.rows)?)
    };

    let (posthoc, posthoc_error) = if outcome.significant() {
        posthoc(&p)
    } else {
        (Vec::new(), None)
    };

    let table = (0..k)
        .filter_map(|t| {
            describe(&p.column(t)).map(|d| TimePointSummary {
                time: p.times[t].clone(),
                n: d.n,
                median: d.median,
                q1: d.q1,
                q3: d.q3,
                mean: d.mean,
            })
        })
        .collect();

    Ok(LongitudinalResult {
        stats: RepeatedMeasures {
            test,
            stat: outcome.statistic,
            p_value: outcome.p_value,
            significant: outcome.significant(),
            n_subjects: p.rows.len(),
            time_points: p.times.clone(),
            posthoc,
            posthoc_error,
        },
        table,
    })
}

fn posthoc(p: &Pivot) -> (Vec<PairwiseComparison>, Option<String>) {
    match pairwise(p) {
        Ok(pairs) => (pairs, None),
        Err(e) => {
            tracing::warn!("Pairwise signed-rank post-hoc failed: {}", e);
            (Vec::new(), Some(e.to_string()))
        }
    }
}

/// Signed-rank test for every pair of time points, Bonferroni-adjusted when
/// there are three or more.
fn pairwise(p: &Pivot) -> Result<Vec<PairwiseComparison>, StatsError> {
    let k = p.times.len();
    let m = if k >= 3 { k * (k - 1) / 2 } else { 1 };
    let mut out = Vec::new();
    for i in 0..k {
        for j in (i + 1)..k {
            let raw = stats::wilcoxon_signed_rank(&p.column(i), &p.column(j))?.p_value;
            let adjusted = bonferroni(raw, m);
            out.push(PairwiseComparison {
                group1: p.times[i].clone(),
                group2: p.times[j].clone(),
                p_raw: raw,
                p_value: adjusted,
                significant: adjusted < ALPHA,
            });
        }
    }
    Ok(out)
}

impl LongitudinalResult {
    pub fn trend_plot(&self, heading: &str) -> TrendPlot {
        let index = |label: &str| self.stats.time_points.iter().position(|t| t == label);
        TrendPlot {
            heading: heading.to_string(),
            subtitle: Some(format!(
                "({} p={:.4})",
                self.stats.test.name(),
                self.stats.p_value
            )),
            significant: self.stats.significant,
            points: self
                .table
                .iter()
                .map(|s| TrendPoint {
                    label: s.time.clone(),
                    median: s.median,
                    q1: s.q1,
                    q3: s.q3,
                })
                .collect(),
            brackets: self
                .stats
                .posthoc
                .iter()
                .filter(|c| c.significant)
                .filter_map(|c| {
                    Some(Bracket {
                        from: index(&c.group1)?,
                        to: index(&c.group2)?,
                        p_value: c.p_value,
                    })
                })
                .collect(),
        }
    }
}

/// One metric of the time-series view.
#[derive(Debug, Serialize)]
pub struct SeriesSection {
    pub name: String,
    pub plot: String,
    pub stats: RepeatedMeasures,
    pub table_data: Vec<TimePointSummary>,
}

#[derive(Debug, Serialize)]
pub struct TimeSeriesReport {
    pub sections: Vec<SeriesSection>,
    pub available_attempts: Vec<i64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

fn heading_for(metric: &str) -> String {
    if metric.contains("Duration") || metric.contains("Time") {
        format!("Time Comparison: {}", metric)
    } else {
        format!("Score Comparison: {}", metric)
    }
}

/// Runs the repeated-measures analysis for every metric of `table`, keeping
/// only rows whose attempt is in `attempts` (all when empty).
pub fn analyze_table(table: &MetricTable, attempts: &[i64], available_attempts: Vec<i64>) -> TimeSeriesReport {
    let mut report = TimeSeriesReport {
        sections: Vec::new(),
        available_attempts,
        errors: BTreeMap::new(),
        warnings: table.warnings.clone(),
    };

    for metric in &table.metrics {
        let observations: Vec<Observation> = table
            .rows
            .iter()
            .filter(|r| attempts.is_empty() || attempts.contains(&r.attempt))
            .filter_map(|r| {
                r.metric(metric).map(|value| Observation {
                    subject: r.user_id,
                    time: time_label(r.attempt),
                    value,
                })
            })
            .collect();

        let result = match analyze(&observations) {
            Ok(r) => r,
            Err(e) => {
                tracing::debug!("Time series skipped for '{}': {}", metric, e);
                report.errors.insert(metric.clone(), e.to_string());
                continue;
            }
        };

        match plot::trend::render(&result.trend_plot(&heading_for(metric))) {
            Ok(png) => report.sections.push(SeriesSection {
                name: metric.clone(),
                plot: plot::to_base64(&png),
                stats: result.stats,
                table_data: result.table,
            }),
            Err(e) => {
                tracing::warn!("Trend plot failed for '{}': {}", metric, e);
                report.errors.insert(metric.clone(), e.to_string());
            }
        }
    }
    report
}
