// src/analytics/efficiency.rs

//! Teaching efficiency after Paas (1993): performance and mental effort are
//! standardized over the whole scope and combined as E = (Z_P - Z_R) / sqrt(2).

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::{
    compare::{GroupComparison, compare_groups, comparison_plot},
    extract::{MetricTable, ResultRow},
    stats::{StatsError, mean, sample_std},
};
use crate::plot::{
    self, PlotError,
    boxplot::{BoxGroup, BoxPlot},
    quadrant::{QuadrantPlot, QuadrantPoint},
};

/// Synthetic section combining every section score of a result.
pub const OVERALL: &str = "Overall";

/// Label for a real section that happens to be called "Overall".
pub const OVERALL_SECTION_LABEL: &str = "Overall (section)";

/// Effort assumed when a result carries no workload rating at all.
pub const DEFAULT_EFFORT: f64 = 50.0;

/// Raw (performance, effort) pair for one result.
#[derive(Debug, Clone, PartialEq)]
pub struct EfficiencyInput {
    pub result_id: i64,
    pub user_id: i64,
    pub attempt: i64,
    pub group: String,
    pub performance: f64,
    pub effort: f64,
}

/// NASA mental demand, else the overall workload score, else the default.
fn effort_of(row: &ResultRow) -> f64 {
    row.nasa
        .mental
        .filter(|v| v.is_finite())
        .or_else(|| (row.nasa_tlx_score > 0.0).then_some(row.nasa_tlx_score))
        .unwrap_or(DEFAULT_EFFORT)
}

/// Which score counts as performance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope<'a> {
    /// Mean of every section score of a result.
    Overall,
    Section(&'a str),
}

fn performance_of(row: &ResultRow, scope: Scope<'_>) -> Option<f64> {
    match scope {
        Scope::Overall => {
            let scores: Vec<f64> =
                row.sections.iter().map(|(_, v)| *v).filter(|v| v.is_finite()).collect();
            (!scores.is_empty()).then(|| mean(&scores))
        }
        Scope::Section(name) => row.sections.get(name).filter(|v| v.is_finite()),
    }
}

/// Results that have a score in `scope`.
pub fn inputs_for(table: &MetricTable, scope: Scope<'_>) -> Vec<EfficiencyInput> {
    table
        .rows
        .iter()
        .filter_map(|row| {
            performance_of(row, scope).map(|performance| EfficiencyInput {
                result_id: row.result_id,
                user_id: row.user_id,
                attempt: row.attempt,
                group: row.group.clone(),
                performance,
                effort: effort_of(row),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EfficiencyPoint {
    pub user_id: i64,
    pub result_id: i64,
    pub attempt: i64,
    pub group: String,
    pub quiz_score: f64,
    pub nasa_mental: f64,
    #[serde(rename = "Z_P")]
    pub z_p: f64,
    #[serde(rename = "Z_R")]
    pub z_r: f64,
    #[serde(rename = "E")]
    pub e: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupAverage {
    pub group: String,
    #[serde(rename = "Z_P_mean")]
    pub z_p_mean: f64,
    #[serde(rename = "Z_R_mean")]
    pub z_r_mean: f64,
    #[serde(rename = "E_mean")]
    pub e_mean: f64,
    pub count: usize,
    pub quiz_score_mean: f64,
    pub nasa_mental_mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Descriptive {
    #[serde(rename = "M_performance")]
    pub m_performance: f64,
    #[serde(rename = "SD_performance")]
    pub sd_performance: f64,
    #[serde(rename = "M_effort")]
    pub m_effort: f64,
    #[serde(rename = "SD_effort")]
    pub sd_effort: f64,
    pub total_students: usize,
    pub num_groups: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EfficiencyStatistics {
    pub descriptive: Descriptive,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<GroupComparison>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Caveats about the standardization, e.g. a floored standard deviation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EfficiencyAnalysis {
    pub individual_points: Vec<EfficiencyPoint>,
    pub group_averages: Vec<GroupAverage>,
    pub statistics: EfficiencyStatistics,
}

/// Mean and the standard deviation actually used for z-scores. A zero
/// spread is replaced by 1.0; the flag reports whether that happened.
pub fn standardizer(values: &[f64]) -> Result<(f64, f64, bool), StatsError> {
    let sd = sample_std(values).ok_or_else(|| {
        StatsError::InsufficientData("Need at least 2 quiz results".to_string())
    })?;
    if sd == 0.0 {
        Ok((mean(values), 1.0, true))
    } else {
        Ok((mean(values), sd, false))
    }
}

pub fn analyze(inputs: &[EfficiencyInput]) -> Result<EfficiencyAnalysis, StatsError> {
    if inputs.len() < 2 {
        return Err(StatsError::InsufficientData(
            "Need at least 2 quiz results".to_string(),
        ));
    }

    let performance: Vec<f64> = inputs.iter().map(|i| i.performance).collect();
    let effort: Vec<f64> = inputs.iter().map(|i| i.effort).collect();
    let (m_p, sd_p, floored_p) = standardizer(&performance)?;
    let (m_r, sd_r, floored_r) = standardizer(&effort)?;

    let mut notes = Vec::new();
    if floored_p {
        notes.push("performance has zero variance; standard deviation set to 1.0".to_string());
    }
    if floored_r {
        notes.push("mental effort has zero variance; standard deviation set to 1.0".to_string());
    }

    let points: Vec<EfficiencyPoint> = inputs
        .iter()
        .map(|i| {
            let z_p = (i.performance - m_p) / sd_p;
            let z_r = (i.effort - m_r) / sd_r;
            EfficiencyPoint {
                user_id: i.user_id,
                result_id: i.result_id,
                attempt: i.attempt,
                group: i.group.clone(),
                quiz_score: i.performance,
                nasa_mental: i.effort,
                z_p,
                z_r,
                e: (z_p - z_r) / std::f64::consts::SQRT_2,
            }
        })
        .collect();

    let mut by_group: BTreeMap<&str, Vec<&EfficiencyPoint>> = BTreeMap::new();
    for p in &points {
        by_group.entry(p.group.as_str()).or_default().push(p);
    }

    let group_averages = by_group
        .iter()
        .map(|(group, pts)| {
            let avg = |f: fn(&EfficiencyPoint) -> f64| mean(&pts.iter().map(|p| f(p)).collect::<Vec<_>>());
            GroupAverage {
                group: group.to_string(),
                z_p_mean: avg(|p| p.z_p),
                z_r_mean: avg(|p| p.z_r),
                e_mean: avg(|p| p.e),
                count: pts.len(),
                quiz_score_mean: avg(|p| p.quiz_score),
                nasa_mental_mean: avg(|p| p.nasa_mental),
            }
        })
        .collect();

    let e_by_group: BTreeMap<String, Vec<f64>> = by_group
        .iter()
        .map(|(g, pts)| (g.to_string(), pts.iter().map(|p| p.e).collect()))
        .collect();
    let (comparison, error) = match compare_groups(&e_by_group) {
        Ok(c) => (Some(c), None),
        Err(e) => (None, Some(e.to_string())),
    };

    Ok(EfficiencyAnalysis {
        statistics: EfficiencyStatistics {
            descriptive: Descriptive {
                m_performance: m_p,
                sd_performance: sd_p,
                m_effort: m_r,
                sd_effort: sd_r,
                total_students: points.len(),
                num_groups: by_group.len(),
            },
            comparison,
            error,
            notes,
        },
        group_averages,
        individual_points: points,
    })
}

impl EfficiencyAnalysis {
    pub fn quadrant(&self, heading: &str, highlight: Option<&EfficiencyPoint>) -> QuadrantPlot {
        QuadrantPlot {
            heading: heading.to_string(),
            groups: self.group_averages.iter().map(|g| g.group.clone()).collect(),
            points: self
                .individual_points
                .iter()
                .map(|p| QuadrantPoint {
                    group: p.group.clone(),
                    z_r: p.z_r,
                    z_p: p.z_p,
                })
                .collect(),
            means: self
                .group_averages
                .iter()
                .map(|g| (g.z_r_mean, g.z_p_mean))
                .collect(),
            highlight: highlight.map(|p| (p.z_r, p.z_p)),
        }
    }

    /// Quadrant plus a box plot of E per group.
    pub fn figure(&self, section: &str) -> Result<Vec<u8>, PlotError> {
        let quadrant = self.quadrant(&format!("Teaching Efficiency: {}", section), None);
        let mut points: BTreeMap<String, Vec<(i64, f64)>> = BTreeMap::new();
        for p in &self.individual_points {
            points.entry(p.group.clone()).or_default().push((p.user_id, p.e));
        }
        let heading = "Efficiency (E) by Group";
        let scores = match &self.statistics.comparison {
            Some(c) => comparison_plot(heading, "E", &points, c, None),
            None => BoxPlot {
                heading: heading.to_string(),
                subtitle: None,
                significant: false,
                y_label: "E".to_string(),
                groups: points
                    .into_iter()
                    .map(|(g, pts)| BoxGroup::with_summary(g, pts.into_iter().map(|(_, e)| e).collect()))
                    .collect(),
            },
        };
        plot::quadrant::render_with_boxplot(&quadrant, &scores)
    }
}

/// One section of the per-section breakdown.
#[derive(Debug, Serialize)]
pub struct SectionEfficiency {
    pub section: String,
    #[serde(flatten)]
    pub analysis: Option<EfficiencyAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EfficiencyReport {
    pub sections: Vec<SectionEfficiency>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

fn section_efficiency(label: &str, inputs: &[EfficiencyInput], with_plots: bool) -> SectionEfficiency {
    let analysis = match analyze(inputs) {
        Ok(analysis) => analysis,
        Err(e) => {
            return SectionEfficiency {
                section: label.to_string(),
                analysis: None,
                plot: None,
                error: Some(e.to_string()),
            };
        }
    };
    let (plot, error) = if with_plots {
        match analysis.figure(label) {
            Ok(png) => (Some(plot::to_data_uri(&png)), None),
            Err(e) => {
                tracing::warn!("Efficiency plot failed for '{}': {}", label, e);
                (None, Some(e.to_string()))
            }
        }
    } else {
        (None, None)
    };
    SectionEfficiency {
        section: label.to_string(),
        analysis: Some(analysis),
        plot,
        error,
    }
}

/// Overall first, then every section, each standardized on its own.
/// A real section named "Overall" is reported as [`OVERALL_SECTION_LABEL`].
pub fn analyze_sections(table: &MetricTable, with_plots: bool) -> EfficiencyReport {
    let mut warnings = table.warnings.clone();
    let mut sections = vec![section_efficiency(
        OVERALL,
        &inputs_for(table, Scope::Overall),
        with_plots,
    )];
    for name in table.section_metrics() {
        let label = if name == OVERALL {
            warnings.push(format!(
                "section '{}' is reported as '{}'",
                OVERALL, OVERALL_SECTION_LABEL
            ));
            OVERALL_SECTION_LABEL
        } else {
            name
        };
        sections.push(section_efficiency(
            label,
            &inputs_for(table, Scope::Section(name)),
            with_plots,
        ));
    }
    EfficiencyReport { sections, warnings }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quadrant {
    #[serde(rename = "High Efficiency")]
    HighEfficiency,
    #[serde(rename = "High Performance")]
    HighPerformance,
    #[serde(rename = "Low Efficiency")]
    LowEfficiency,
    #[serde(rename = "Low Performance")]
    LowPerformance,
}

impl Quadrant {
    pub fn classify(e: f64, z_r: f64) -> Self {
        if e > 0.0 {
            if z_r < 0.0 {
                Quadrant::HighEfficiency
            } else {
                Quadrant::HighPerformance
            }
        } else if z_r > 0.0 {
            Quadrant::LowEfficiency
        } else {
            Quadrant::LowPerformance
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Quadrant::HighEfficiency => {
                "You are in the high-efficiency quadrant: good results with relatively low mental effort."
            }
            Quadrant::HighPerformance => {
                "Your performance is good, but it took relatively high mental effort."
            }
            Quadrant::LowEfficiency => {
                "You invested high mental effort for lower results. Consider adjusting your study strategy."
            }
            Quadrant::LowPerformance => {
                "Both your mental effort and your performance were low. More practice may help."
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserEfficiency {
    pub image: String,
    pub user_data: EfficiencyPoint,
    pub quadrant: Quadrant,
    pub message: &'static str,
    pub statistics: EfficiencyStatistics,
}

#[derive(Debug)]
pub enum UserViewError {
    Stats(StatsError),
    /// The learner has no result in scope.
    NotFound,
    Plot(PlotError),
}

impl fmt::Display for UserViewError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserViewError::Stats(e) => write!(f, "{}", e),
            UserViewError::NotFound => write!(f, "User data not found in this course"),
            UserViewError::Plot(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for UserViewError {}

/// Overall quadrant with one learner's latest point highlighted.
pub fn user_view(table: &MetricTable, user_id: i64) -> Result<UserEfficiency, UserViewError> {
    let analysis = analyze(&inputs_for(table, Scope::Overall)).map_err(UserViewError::Stats)?;
    let user_data = analysis
        .individual_points
        .iter()
        .filter(|p| p.user_id == user_id)
        .max_by_key(|p| (p.attempt, p.result_id))
        .cloned()
        .ok_or(UserViewError::NotFound)?;

    let figure = analysis.quadrant("Your Teaching Efficiency Position", Some(&user_data));
    let png = plot::quadrant::render(&figure).map_err(UserViewError::Plot)?;
    let quadrant = Quadrant::classify(user_data.e, user_data.z_r);

    Ok(UserEfficiency {
        image: plot::to_data_uri(&png),
        quadrant,
        message: quadrant.message(),
        user_data,
        statistics: analysis.statistics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz_result::{NasaTlx, SectionScores};

    fn input(user_id: i64, group: &str, performance: f64, effort: f64) -> EfficiencyInput {
        EfficiencyInput {
            result_id: user_id,
            user_id,
            attempt: 1,
            group: group.to_string(),
            performance,
            effort,
        }
    }

    /// Performance mean 60 / sd 10, effort mean 50 / sd 10; the first
    /// learner scored 40 with mental effort 80.
    fn reference_cohort() -> Vec<EfficiencyInput> {
        let performance = [40.0, 76.0, 48.0, 70.0, 54.0, 66.0, 58.0, 64.0, 60.0, 62.0, 62.0];
        let effort = [80.0, 48.0, 46.0, 48.0, 46.0, 48.0, 46.0, 48.0, 46.0, 48.0, 46.0];
        performance
            .iter()
            .zip(effort)
            .enumerate()
            .map(|(i, (p, r))| input(i as i64 + 1, if i % 2 == 0 { "A" } else { "B" }, *p, r))
            .collect()
    }

    #[test]
    fn reference_cohort_has_expected_moments() {
        let inputs = reference_cohort();
        let perf: Vec<f64> = inputs.iter().map(|i| i.performance).collect();
        let effort: Vec<f64> = inputs.iter().map(|i| i.effort).collect();
        assert!((mean(&perf) - 60.0).abs() < 1e-12);
        assert!((sample_std(&perf).unwrap() - 10.0).abs() < 1e-12);
        assert!((mean(&effort) - 50.0).abs() < 1e-12);
        assert!((sample_std(&effort).unwrap() - 10.0).abs() < 1e-12);
    }

    #[test]
    fn struggling_learner_gets_negative_efficiency() {
        let a = analyze(&reference_cohort()).unwrap();
        let p = &a.individual_points[0];
        assert!((p.z_p + 2.0).abs() < 1e-9);
        assert!((p.z_r - 3.0).abs() < 1e-9);
        assert!((p.e + 3.5355).abs() < 1e-4);
    }

    #[test]
    fn z_scores_are_centered() {
        let a = analyze(&reference_cohort()).unwrap();
        let sum_zp: f64 = a.individual_points.iter().map(|p| p.z_p).sum();
        let sum_zr: f64 = a.individual_points.iter().map(|p| p.z_r).sum();
        assert!(sum_zp.abs() < 1e-9);
        assert!(sum_zr.abs() < 1e-9);
        for p in &a.individual_points {
            assert!((p.z_p - (p.quiz_score - 60.0) / 10.0).abs() < 1e-9);
        }
    }

    #[test]
    fn paas_example_student() {
        let z_p: f64 = (40.0 - 60.0) / 10.0;
        let z_r: f64 = (80.0 - 50.0) / 10.0;
        let e = (z_p - z_r) / std::f64::consts::SQRT_2;
        assert_eq!(z_p, -2.0);
        assert_eq!(z_r, 3.0);
        assert!((e + 3.5355).abs() < 1e-4);
        assert_eq!(Quadrant::classify(e, z_r), Quadrant::LowEfficiency);
    }

    #[test]
    fn zero_variance_is_floored_and_noted() {
        let inputs = vec![input(1, "A", 50.0, 40.0), input(2, "B", 50.0, 60.0)];
        let a = analyze(&inputs).unwrap();
        assert_eq!(a.statistics.descriptive.sd_performance, 1.0);
        assert!(a.individual_points.iter().all(|p| p.z_p == 0.0));
        assert_eq!(a.statistics.notes.len(), 1);
    }

    #[test]
    fn fewer_than_two_points_is_insufficient() {
        let err = analyze(&[input(1, "A", 50.0, 40.0)]).unwrap_err();
        assert!(matches!(err, StatsError::InsufficientData(_)));
    }

    #[test]
    fn group_averages_and_comparison() {
        let inputs = vec![
            input(1, "A", 90.0, 20.0),
            input(2, "A", 85.0, 30.0),
            input(3, "B", 50.0, 70.0),
            input(4, "B", 40.0, 80.0),
        ];
        let a = analyze(&inputs).unwrap();
        assert_eq!(a.group_averages.len(), 2);
        assert_eq!(a.group_averages[0].group, "A");
        assert!(a.group_averages[0].e_mean > 0.0);
        assert!(a.group_averages[1].e_mean < 0.0);
        let c = a.statistics.comparison.as_ref().unwrap();
        assert_eq!(c.test, crate::analytics::compare::GroupTest::RankSum);
    }

    fn row(user_id: i64, group: &str, mental: f64, sections: &[(&str, f64)]) -> ResultRow {
        ResultRow {
            result_id: user_id,
            user_id,
            attempt: 1,
            group: group.to_string(),
            durations: Default::default(),
            sections: SectionScores(sections.iter().map(|(k, v)| (k.to_string(), *v)).collect()),
            nasa: NasaTlx {
                mental: Some(mental),
                ..Default::default()
            },
            nasa_tlx_score: mental,
        }
    }

    /// Learner 5 only has a score for X.
    fn two_section_table() -> MetricTable {
        MetricTable {
            rows: vec![
                row(1, "A", 40.0, &[("X", 80.0), ("Y", 70.0)]),
                row(2, "A", 50.0, &[("X", 90.0), ("Y", 60.0)]),
                row(3, "B", 60.0, &[("X", 60.0), ("Y", 90.0)]),
                row(4, "B", 70.0, &[("X", 70.0), ("Y", 80.0)]),
                row(5, "B", 80.0, &[("X", 50.0)]),
            ],
            metrics: vec!["X".to_string(), "Y".to_string()],
            warnings: Vec::new(),
        }
    }

    fn section<'a>(report: &'a EfficiencyReport, name: &str) -> &'a EfficiencyAnalysis {
        report
            .sections
            .iter()
            .find(|s| s.section == name)
            .and_then(|s| s.analysis.as_ref())
            .unwrap()
    }

    fn users(a: &EfficiencyAnalysis) -> Vec<i64> {
        a.individual_points.iter().map(|p| p.user_id).collect()
    }

    #[test]
    fn partial_learner_counts_only_where_scored() {
        let report = analyze_sections(&two_section_table(), false);
        let names: Vec<&str> = report.sections.iter().map(|s| s.section.as_str()).collect();
        assert_eq!(names, vec!["Overall", "X", "Y"]);

        assert_eq!(users(section(&report, "Overall")), vec![1, 2, 3, 4, 5]);
        assert_eq!(users(section(&report, "X")), vec![1, 2, 3, 4, 5]);
        assert_eq!(users(section(&report, "Y")), vec![1, 2, 3, 4]);

        let overall = section(&report, "Overall");
        assert_eq!(overall.individual_points[0].quiz_score, 75.0);
        assert_eq!(overall.individual_points[4].quiz_score, 50.0);
    }

    #[test]
    fn each_section_is_standardized_on_its_own() {
        let report = analyze_sections(&two_section_table(), false);
        let x = section(&report, "X");
        let y = section(&report, "Y");
        assert_eq!(x.statistics.descriptive.m_performance, 70.0);
        assert_eq!(y.statistics.descriptive.m_performance, 75.0);
        // Effort moments follow the learners present in the section.
        assert_eq!(x.statistics.descriptive.m_effort, 60.0);
        assert_eq!(y.statistics.descriptive.m_effort, 55.0);
        for a in [x, y] {
            let sum: f64 = a.individual_points.iter().map(|p| p.z_p).sum();
            assert!(sum.abs() < 1e-9);
        }
        // Same raw score, different z in each section.
        let x_score_80 = x.individual_points.iter().find(|p| p.user_id == 1).unwrap();
        let y_score_80 = y.individual_points.iter().find(|p| p.user_id == 4).unwrap();
        assert_ne!(x_score_80.z_p, y_score_80.z_p);
    }

    #[test]
    fn plots_are_attached_per_section() {
        let report = analyze_sections(&two_section_table(), true);
        assert_eq!(report.sections.len(), 3);
        for s in &report.sections {
            let uri = s.plot.as_deref().unwrap();
            assert!(uri.starts_with("data:image/png;base64,iVBOR"), "{}", s.section);
            assert!(s.error.is_none());
        }
    }

    #[test]
    fn real_overall_section_does_not_collide() {
        let mut table = two_section_table();
        for r in &mut table.rows {
            r.sections.0.insert(OVERALL.to_string(), 10.0 * r.user_id as f64);
        }
        table.metrics.insert(0, OVERALL.to_string());

        let report = analyze_sections(&table, false);
        let names: Vec<&str> = report.sections.iter().map(|s| s.section.as_str()).collect();
        assert_eq!(names, vec![OVERALL, OVERALL_SECTION_LABEL, "X", "Y"]);

        let real = section(&report, OVERALL_SECTION_LABEL);
        let scores: Vec<f64> = real.individual_points.iter().map(|p| p.quiz_score).collect();
        assert_eq!(scores, vec![10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn quadrant_classification() {
        assert_eq!(Quadrant::classify(1.0, -0.5), Quadrant::HighEfficiency);
        assert_eq!(Quadrant::classify(1.0, 0.5), Quadrant::HighPerformance);
        assert_eq!(Quadrant::classify(-1.0, 0.5), Quadrant::LowEfficiency);
        assert_eq!(Quadrant::classify(-1.0, -0.5), Quadrant::LowPerformance);
    }
}
