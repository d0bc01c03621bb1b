// src/analytics/engagement.rs

//! Image engagement: per-image tallies and per-learner engagement rates
//! compared across groups.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use sqlx::SqlitePool;

use super::{
    Outcome, UNKNOWN_GROUP,
    compare::{GroupComparison, compare_groups, comparison_plot},
    interpretation, round_to,
    stats::StatsError,
};
use crate::{
    error::AppError,
    models::interaction::{ImageInteraction, ImageStats},
    plot,
};

pub async fn load_interactions(
    pool: &SqlitePool,
    course_id: Option<i64>,
) -> Result<Vec<ImageInteraction>, AppError> {
    let rows = match course_id {
        Some(id) => {
            sqlx::query_as::<_, ImageInteraction>(
                "SELECT id, user_id, course_id, image_url, vocab_id, action, context \
                 FROM image_interactions WHERE course_id = ? ORDER BY id",
            )
            .bind(id)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, ImageInteraction>(
                "SELECT id, user_id, course_id, image_url, vocab_id, action, context \
                 FROM image_interactions ORDER BY id",
            )
            .fetch_all(pool)
            .await
        }
    };
    rows.map_err(|e| {
        tracing::error!("Failed to load image interactions: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })
}

/// Likes, dislikes, views and distinct viewers per image, in first-seen order.
/// Words are filled in by the caller.
pub fn aggregate_images(interactions: &[ImageInteraction]) -> Vec<ImageStats> {
    let mut order: Vec<&str> = Vec::new();
    let mut stats: HashMap<&str, (ImageStats, HashSet<i64>)> = HashMap::new();
    for i in interactions {
        let (entry, viewers) = stats.entry(i.image_url.as_str()).or_insert_with(|| {
            order.push(i.image_url.as_str());
            (
                ImageStats {
                    image_url: i.image_url.clone(),
                    vocab_id: i.vocab_id,
                    course_id: i.course_id,
                    word: "N/A".to_string(),
                    chinese: None,
                    likes: 0,
                    dislikes: 0,
                    views: 0,
                    unique_viewers: 0,
                },
                HashSet::new(),
            )
        });
        match i.action.as_str() {
            "like" => entry.likes += 1,
            "dislike" => entry.dislikes += 1,
            "view" => {
                entry.views += 1;
                viewers.insert(i.user_id);
            }
            _ => {}
        }
    }
    order
        .into_iter()
        .filter_map(|url| stats.remove(url))
        .map(|(mut s, viewers)| {
            s.unique_viewers = viewers.len();
            s
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnerEngagement {
    pub user_id: i64,
    pub group: String,
    /// (likes + dislikes) / views, as a percentage.
    pub engagement_rate: f64,
    pub likes: u32,
    pub dislikes: u32,
    pub views: u32,
}

/// Learners with at least one view, grouped by enrollment.
pub fn learner_engagement(
    interactions: &[ImageInteraction],
    enrollments: &HashMap<i64, String>,
) -> Vec<LearnerEngagement> {
    let mut tallies: BTreeMap<i64, (u32, u32, u32)> = BTreeMap::new();
    for i in interactions {
        let t = tallies.entry(i.user_id).or_default();
        match i.action.as_str() {
            "like" => t.0 += 1,
            "dislike" => t.1 += 1,
            "view" => t.2 += 1,
            _ => {}
        }
    }
    tallies
        .into_iter()
        .filter(|(_, (_, _, views))| *views > 0)
        .map(|(user_id, (likes, dislikes, views))| LearnerEngagement {
            user_id,
            group: enrollments
                .get(&user_id)
                .cloned()
                .unwrap_or_else(|| UNKNOWN_GROUP.to_string()),
            engagement_rate: round_to(f64::from(likes + dislikes) / f64::from(views) * 100.0, 2),
            likes,
            dislikes,
            views,
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct EngagementReport {
    pub individual_data: Vec<LearnerEngagement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<GroupComparison>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
    /// Why the group comparison could not run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Compares engagement rates between known groups; learners in `Unknown`
/// are listed but not tested.
pub fn analyze(
    interactions: &[ImageInteraction],
    enrollments: &HashMap<i64, String>,
    with_plot: bool,
) -> Outcome<EngagementReport> {
    if interactions.is_empty() {
        return Outcome::unavailable("No interaction data found for this course");
    }
    let learners = learner_engagement(interactions, enrollments);
    if learners.len() < 2 {
        return Outcome::unavailable("Insufficient data for statistical analysis");
    }

    let mut points: BTreeMap<String, Vec<(i64, f64)>> = BTreeMap::new();
    for l in learners.iter().filter(|l| l.group != UNKNOWN_GROUP) {
        points.entry(l.group.clone()).or_default().push((l.user_id, l.engagement_rate));
    }
    let values: BTreeMap<String, Vec<f64>> = points
        .iter()
        .map(|(g, pts)| (g.clone(), pts.iter().map(|(_, v)| *v).collect()))
        .collect();

    let mut report = EngagementReport {
        individual_data: learners,
        statistics: None,
        interpretation: None,
        comparison_error: None,
        image: None,
    };

    match compare_groups(&values) {
        Ok(c) => {
            if with_plot {
                let figure = comparison_plot(
                    "Image Engagement Rate Distribution",
                    "Engagement Rate (%)",
                    &points,
                    &c,
                    None,
                );
                match plot::boxplot::render(&figure) {
                    Ok(png) => report.image = Some(plot::to_data_uri(&png)),
                    Err(e) => tracing::warn!("Engagement plot failed: {}", e),
                }
            }
            report.interpretation = Some(interpretation(c.test.name(), c.p_value));
            report.statistics = Some(c);
        }
        Err(e @ StatsError::InsufficientData(_)) => {
            report.comparison_error = Some(e.to_string());
        }
        Err(e) => {
            tracing::warn!("Engagement comparison failed: {}", e);
            report.comparison_error = Some(e.to_string());
        }
    }
    Outcome::Ready(report)
}
