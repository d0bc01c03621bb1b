//! Rank-based hypothesis tests and descriptive statistics.
//!
//! Conventions follow the usual scientific-Python defaults so numbers line up
//! with results researchers already have: average ranks for ties, two-sided
//! p-values, tie correction where the classic test defines one.

use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

/// Fixed significance level used everywhere.
pub const ALPHA: f64 = 0.05;

/// Largest sample for which the signed-rank test uses the exact distribution.
const EXACT_SIGNED_RANK_MAX_N: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub enum StatsError {
    /// Not enough groups, subjects or observations to run a test.
    InsufficientData(String),
    /// Input is well-formed but the statistic is undefined (e.g. all values tied).
    Degenerate(String),
    /// Repeated-measures data could not be reshaped into subject x time.
    NotRectangular(String),
    /// The reference distribution could not be constructed.
    Distribution(String),
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatsError::InsufficientData(msg) => write!(f, "Insufficient data: {}", msg),
            StatsError::Degenerate(msg) => write!(f, "Degenerate input: {}", msg),
            StatsError::NotRectangular(msg) => write!(f, "Cannot pivot data: {}", msg),
            StatsError::Distribution(msg) => write!(f, "Distribution error: {}", msg),
        }
    }
}

impl std::error::Error for StatsError {}

/// Statistic and two-sided p-value of a single test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TestOutcome {
    pub statistic: f64,
    pub p_value: f64,
}

impl TestOutcome {
    pub fn significant(&self) -> bool {
        self.p_value < ALPHA
    }
}

/// Summary of one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Descriptive {
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; `None` below two observations.
    pub std: Option<f64>,
    pub q1: f64,
    pub q3: f64,
    pub min: f64,
    pub max: f64,
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Percentile of already sorted data with linear interpolation, `q` in [0, 1].
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

pub fn describe(values: &[f64]) -> Option<Descriptive> {
    if values.is_empty() {
        return None;
    }
    let sorted = sorted_copy(values);
    Some(Descriptive {
        n: values.len(),
        mean: mean(values),
        median: percentile_sorted(&sorted, 0.5),
        std: sample_std(values),
        q1: percentile_sorted(&sorted, 0.25),
        q3: percentile_sorted(&sorted, 0.75),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
    })
}

/// Average ranks (1-based) plus the sizes of every tie block.
pub fn average_ranks(values: &[f64]) -> (Vec<f64>, Vec<usize>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut ties = Vec::new();
    let mut i = 0;
    while i < order.len() {
        let mut j = i + 1;
        while j < order.len() && values[order[j]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = rank;
        }
        if j - i > 1 {
            ties.push(j - i);
        }
        i = j;
    }
    (ranks, ties)
}

/// Sum of t^3 - t over tie blocks.
fn tie_term(ties: &[usize]) -> f64 {
    ties.iter().map(|&t| (t as f64).powi(3) - t as f64).sum()
}

fn standard_normal() -> Result<Normal, StatsError> {
    Normal::new(0.0, 1.0).map_err(|e| StatsError::Distribution(format!("{:?}", e)))
}

/// Two-sided p-value of a standard normal z.
pub fn normal_two_sided(z: f64) -> Result<f64, StatsError> {
    let p = 2.0 * standard_normal()?.sf(z.abs());
    Ok(p.min(1.0))
}

pub fn chi_squared_sf(x: f64, df: f64) -> Result<f64, StatsError> {
    let dist = ChiSquared::new(df).map_err(|e| StatsError::Distribution(format!("{:?}", e)))?;
    Ok(dist.sf(x.max(0.0)))
}

/// Bonferroni adjustment for `m` comparisons.
pub fn bonferroni(p: f64, m: usize) -> f64 {
    (p * m.max(1) as f64).min(1.0)
}

/// Wilcoxon rank-sum test (normal approximation, no tie correction).
/// The statistic is the z score of the first sample's rank sum.
pub fn rank_sum(a: &[f64], b: &[f64]) -> Result<TestOutcome, StatsError> {
    if a.is_empty() || b.is_empty() {
        return Err(StatsError::InsufficientData(
            "rank-sum test needs two non-empty samples".to_string(),
        ));
    }
    let n1 = a.len() as f64;
    let n2 = b.len() as f64;
    let combined: Vec<f64> = a.iter().chain(b.iter()).copied().collect();
    let (ranks, _) = average_ranks(&combined);
    let s: f64 = ranks[..a.len()].iter().sum();
    let expected = n1 * (n1 + n2 + 1.0) / 2.0;
    let z = (s - expected) / (n1 * n2 * (n1 + n2 + 1.0) / 12.0).sqrt();
    Ok(TestOutcome {
        statistic: z,
        p_value: normal_two_sided(z)?,
    })
}

/// Kruskal-Wallis H test with tie correction.
pub fn kruskal_wallis(groups: &[&[f64]]) -> Result<TestOutcome, StatsError> {
    let non_empty: Vec<&[f64]> = groups.iter().copied().filter(|g| !g.is_empty()).collect();
    if non_empty.len() < 2 {
        return Err(StatsError::InsufficientData(
            "Kruskal-Wallis needs at least two non-empty groups".to_string(),
        ));
    }
    let combined: Vec<f64> = non_empty.iter().flat_map(|g| g.iter().copied()).collect();
    let n = combined.len() as f64;
    let (ranks, ties) = average_ranks(&combined);

    let mut offset = 0;
    let mut sum_term = 0.0;
    for g in &non_empty {
        let r: f64 = ranks[offset..offset + g.len()].iter().sum();
        sum_term += r * r / g.len() as f64;
        offset += g.len();
    }
    let h = 12.0 / (n * (n + 1.0)) * sum_term - 3.0 * (n + 1.0);
    let correction = 1.0 - tie_term(&ties) / (n.powi(3) - n);
    if correction <= 0.0 {
        return Err(StatsError::Degenerate("all numbers are identical".to_string()));
    }
    let h = h / correction;
    Ok(TestOutcome {
        statistic: h,
        p_value: chi_squared_sf(h, (non_empty.len() - 1) as f64)?,
    })
}

/// One pairwise post-hoc comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairwiseComparison {
    pub group1: String,
    pub group2: String,
    /// Unadjusted two-sided p-value.
    pub p_raw: f64,
    /// Bonferroni-adjusted p-value.
    pub p_value: f64,
    pub significant: bool,
}

/// Dunn's all-pairs test on joint ranks with tie adjustment, Bonferroni-corrected.
pub fn dunn_bonferroni(groups: &[(String, Vec<f64>)]) -> Result<Vec<PairwiseComparison>, StatsError> {
    let groups: Vec<&(String, Vec<f64>)> = groups.iter().filter(|(_, v)| !v.is_empty()).collect();
    if groups.len() < 2 {
        return Err(StatsError::InsufficientData(
            "Dunn's test needs at least two non-empty groups".to_string(),
        ));
    }
    let combined: Vec<f64> = groups.iter().flat_map(|(_, v)| v.iter().copied()).collect();
    let n = combined.len() as f64;
    if n < 2.0 {
        return Err(StatsError::InsufficientData("Dunn's test needs two observations".to_string()));
    }
    let (ranks, ties) = average_ranks(&combined);

    let mut mean_ranks = Vec::with_capacity(groups.len());
    let mut offset = 0;
    for (_, v) in &groups {
        mean_ranks.push(mean(&ranks[offset..offset + v.len()]));
        offset += v.len();
    }

    let x_ties = tie_term(&ties) / (12.0 * (n - 1.0));
    let base_variance = n * (n + 1.0) / 12.0 - x_ties;
    if base_variance <= 0.0 {
        return Err(StatsError::Degenerate("all numbers are identical".to_string()));
    }

    let m = groups.len() * (groups.len() - 1) / 2;
    let mut out = Vec::with_capacity(m);
    for i in 0..groups.len() {
        for j in (i + 1)..groups.len() {
            let b = 1.0 / groups[i].1.len() as f64 + 1.0 / groups[j].1.len() as f64;
            let z = (mean_ranks[i] - mean_ranks[j]).abs() / (base_variance * b).sqrt();
            let p_raw = normal_two_sided(z)?;
            let p_value = bonferroni(p_raw, m);
            out.push(PairwiseComparison {
                group1: groups[i].0.clone(),
                group2: groups[j].0.clone(),
                p_raw,
                p_value,
                significant: p_value < ALPHA,
            });
        }
    }
    Ok(out)
}

/// Number of sign assignments of ranks 1..=n whose positive sum is `s`.
fn signed_rank_counts(n: usize) -> Vec<f64> {
    let max = n * (n + 1) / 2;
    let mut counts = vec![0.0; max + 1];
    counts[0] = 1.0;
    for k in 1..=n {
        for s in (k..=max).rev() {
            counts[s] += counts[s - k];
        }
    }
    counts
}

/// Wilcoxon signed-rank test on paired samples.
///
/// Zero differences are dropped. The statistic is min(W+, W-). Exact
/// distribution when the reduced sample is small and untied, otherwise a
/// tie-corrected normal approximation. When every difference is zero the
/// samples are indistinguishable and p = 1.
pub fn wilcoxon_signed_rank(x: &[f64], y: &[f64]) -> Result<TestOutcome, StatsError> {
    if x.len() != y.len() {
        return Err(StatsError::NotRectangular(format!(
            "paired samples differ in length ({} vs {})",
            x.len(),
            y.len()
        )));
    }
    if x.is_empty() {
        return Err(StatsError::InsufficientData("signed-rank test needs paired observations".to_string()));
    }
    let all_diffs: Vec<f64> = x.iter().zip(y).map(|(a, b)| a - b).collect();
    let diffs: Vec<f64> = all_diffs.iter().copied().filter(|d| *d != 0.0).collect();
    if diffs.is_empty() {
        return Ok(TestOutcome {
            statistic: 0.0,
            p_value: 1.0,
        });
    }

    let abs: Vec<f64> = diffs.iter().map(|d| d.abs()).collect();
    let (ranks, ties) = average_ranks(&abs);
    let r_plus: f64 = diffs
        .iter()
        .zip(&ranks)
        .filter(|(d, _)| **d > 0.0)
        .map(|(_, r)| r)
        .sum();
    let n = diffs.len();
    let total = (n * (n + 1)) as f64 / 2.0;
    let t = r_plus.min(total - r_plus);
    let had_zeros = diffs.len() != all_diffs.len();

    let p_value = if n <= EXACT_SIGNED_RANK_MAX_N && ties.is_empty() && !had_zeros {
        let counts = signed_rank_counts(n);
        let denom = 2f64.powi(n as i32);
        let upto = t.floor() as usize;
        let cdf: f64 = counts[..=upto.min(counts.len() - 1)].iter().sum::<f64>() / denom;
        (2.0 * cdf).min(1.0)
    } else {
        let nf = n as f64;
        let mn = nf * (nf + 1.0) / 4.0;
        let var = nf * (nf + 1.0) * (2.0 * nf + 1.0) / 24.0 - tie_term(&ties) / 48.0;
        if var <= 0.0 {
            return Err(StatsError::Degenerate("signed-rank variance is zero".to_string()));
        }
        normal_two_sided((t - mn) / var.sqrt())?
    };

    Ok(TestOutcome {
        statistic: t,
        p_value,
    })
}

/// Friedman chi-square test. `rows` are subjects, columns are conditions.
/// Subjects tied across every condition carry no information; if all of them
/// are, the conditions are indistinguishable and p = 1.
pub fn friedman(rows: &[Vec<f64>]) -> Result<TestOutcome, StatsError> {
    let n = rows.len();
    let k = rows.first().map(Vec::len).unwrap_or(0);
    if k < 3 {
        return Err(StatsError::InsufficientData(
            "Friedman test needs at least three conditions".to_string(),
        ));
    }
    if n < 2 {
        return Err(StatsError::InsufficientData(
            "Friedman test needs at least two subjects".to_string(),
        ));
    }
    if rows.iter().any(|r| r.len() != k) {
        return Err(StatsError::NotRectangular("rows differ in length".to_string()));
    }

    let mut rank_sums = vec![0.0; k];
    let mut ties_total = 0.0;
    for row in rows {
        let (ranks, ties) = average_ranks(row);
        for (sum, r) in rank_sums.iter_mut().zip(ranks) {
            *sum += r;
        }
        ties_total += tie_term(&ties);
    }

    let nf = n as f64;
    let kf = k as f64;
    let correction = 1.0 - ties_total / (nf * kf * (kf * kf - 1.0));
    if correction <= 0.0 {
        return Ok(TestOutcome {
            statistic: 0.0,
            p_value: 1.0,
        });
    }
    let ssr: f64 = rank_sums.iter().map(|r| r * r).sum();
    let chi2 = (12.0 / (nf * kf * (kf + 1.0)) * ssr - 3.0 * nf * (kf + 1.0)) / correction;
    Ok(TestOutcome {
        statistic: chi2,
        p_value: chi_squared_sf(chi2, kf - 1.0)?,
    })
}
