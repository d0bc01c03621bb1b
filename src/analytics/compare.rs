// src/analytics/compare.rs

//! Between-group comparison: test selection, post-hoc, and the per-metric report.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{
    extract::MetricTable,
    interpretation,
    stats::{self, PairwiseComparison, StatsError, describe},
};
use crate::plot::{
    self,
    boxplot::{BoxGroup, BoxPlot},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupTest {
    #[serde(rename = "Wilcoxon Rank-Sum")]
    RankSum,
    #[serde(rename = "Kruskal-Wallis")]
    KruskalWallis,
}

impl GroupTest {
    pub fn name(&self) -> &'static str {
        match self {
            GroupTest::RankSum => "Wilcoxon Rank-Sum",
            GroupTest::KruskalWallis => "Kruskal-Wallis",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub group: String,
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub std: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupComparison {
    pub test: GroupTest,
    pub stat: f64,
    pub p_value: f64,
    pub significant: bool,
    pub groups: Vec<GroupSummary>,
    /// Present only for Kruskal-Wallis with p < 0.05.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dunn: Option<Vec<PairwiseComparison>>,
    /// Post-hoc failure, reported without discarding the omnibus result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dunn_error: Option<String>,
}

/// Compares value lists by group label. Empty groups are ignored; a group
/// with a single value still takes part.
pub fn compare_groups(groups: &BTreeMap<String, Vec<f64>>) -> Result<GroupComparison, StatsError> {
    let valid: Vec<(String, Vec<f64>)> = groups
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(g, v)| (g.clone(), v.clone()))
        .collect();

    if valid.len() < 2 {
        return Err(StatsError::InsufficientData(
            "fewer than two groups with data".to_string(),
        ));
    }

    let summaries = valid
        .iter()
        .filter_map(|(g, v)| {
            describe(v).map(|d| GroupSummary {
                group: g.clone(),
                count: d.n,
                mean: d.mean,
                median: d.median,
                std: d.std,
            })
        })
        .collect();

    if valid.len() == 2 {
        let out = stats::rank_sum(&valid[0].1, &valid[1].1)?;
        return Ok(GroupComparison {
            test: GroupTest::RankSum,
            stat: out.statistic,
            p_value: out.p_value,
            significant: out.significant(),
            groups: summaries,
            dunn: None,
            dunn_error: None,
        });
    }

    let samples: Vec<&[f64]> = valid.iter().map(|(_, v)| v.as_slice()).collect();
    let out = stats::kruskal_wallis(&samples)?;
    let (dunn, dunn_error) = if out.significant() {
        match stats::dunn_bonferroni(&valid) {
            Ok(pairs) => (Some(pairs), None),
            Err(e) => {
                tracing::warn!("Dunn post-hoc failed: {}", e);
                (None, Some(e.to_string()))
            }
        }
    } else {
        (None, None)
    };

    Ok(GroupComparison {
        test: GroupTest::KruskalWallis,
        stat: out.statistic,
        p_value: out.p_value,
        significant: out.significant(),
        groups: summaries,
        dunn,
        dunn_error,
    })
}

/// Box plot of `groups` titled with the comparison result.
pub fn comparison_plot(
    heading: &str,
    y_label: &str,
    groups: &BTreeMap<String, Vec<(i64, f64)>>,
    comparison: &GroupComparison,
    highlight_user: Option<i64>,
) -> BoxPlot {
    let groups = groups
        .iter()
        .filter(|(_, pts)| !pts.is_empty())
        .map(|(name, pts)| {
            let mut g = BoxGroup::with_summary(name.clone(), pts.iter().map(|(_, v)| *v).collect());
            if let Some(user) = highlight_user {
                g.highlight = pts.iter().filter(|(u, _)| *u == user).map(|(_, v)| *v).collect();
            }
            g
        })
        .collect();
    BoxPlot {
        heading: heading.to_string(),
        subtitle: Some(format!(
            "({} p={:.3})",
            comparison.test.name(),
            comparison.p_value
        )),
        significant: comparison.significant,
        y_label: y_label.to_string(),
        groups,
    }
}

/// `{stats, plots, interpretations}` over every metric of a table.
#[derive(Debug, Default, Serialize)]
pub struct AnalysisReport {
    pub stats: BTreeMap<String, GroupComparison>,
    pub plots: BTreeMap<String, String>,
    pub interpretations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Runs the comparison on every metric of `table`. Failures stay scoped to
/// their metric. `highlight_user` marks that learner's values in the plots.
pub fn analyze_metrics(table: &MetricTable, highlight_user: Option<i64>) -> AnalysisReport {
    let mut report = AnalysisReport {
        warnings: table.warnings.clone(),
        ..Default::default()
    };

    let mut grouped = table.grouped_points();
    for metric in &table.metrics {
        let points = grouped.remove(metric).unwrap_or_default();
        let values: BTreeMap<String, Vec<f64>> = points
            .iter()
            .map(|(g, pts)| (g.clone(), pts.iter().map(|(_, v)| *v).collect()))
            .collect();

        let comparison = match compare_groups(&values) {
            Ok(c) => c,
            Err(StatsError::InsufficientData(reason)) => {
                report.interpretations.insert(
                    metric.clone(),
                    format!(
                        "Unable to perform analysis: Insufficient data ({}; only one group or insufficient samples)",
                        reason
                    ),
                );
                continue;
            }
            Err(e) => {
                tracing::warn!("Comparison failed for metric '{}': {}", metric, e);
                report.errors.insert(metric.clone(), e.to_string());
                continue;
            }
        };

        let figure = comparison_plot(
            &format!("Analysis: {}", metric),
            metric,
            &points,
            &comparison,
            highlight_user,
        );
        match plot::boxplot::render(&figure) {
            Ok(png) => {
                report.plots.insert(metric.clone(), plot::to_base64(&png));
            }
            Err(e) => {
                tracing::warn!("Plot failed for metric '{}': {}", metric, e);
                report.errors.insert(metric.clone(), e.to_string());
            }
        }

        report.interpretations.insert(
            metric.clone(),
            interpretation(comparison.test.name(), comparison.p_value),
        );
        report.stats.insert(metric.clone(), comparison);
    }
    report
}
