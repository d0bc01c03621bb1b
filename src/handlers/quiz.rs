// src/handlers/quiz.rs

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::SqlitePool;
use validator::Validate;

use crate::{
    analytics::source::load_course,
    error::AppError,
    models::{
        course::{QuestionBlock, QuestionKind, QuizBlock, StageConfig},
        quiz_result::NasaTlx,
        submission::{AnswerValue, QuestionLog, SubmitQuizRequest, SubmitQuizResponse},
    },
    scoring::{PASS_SCORE, RubricScore, ScoreRequest, SentenceScorer, score_sentence},
    utils::jwt::Claims,
};

const DEFAULT_SECTION: &str = "General";

/// Group an admin falls into when taking a quiz without enrolling.
const ADMIN_FALLBACK_GROUP: &str = "A";

/// Outcome of grading one submission.
#[derive(Debug, Default)]
struct Grading {
    score: i64,
    section_stats: BTreeMap<String, i64>,
    sentence_total: f64,
    logs: Vec<QuestionLog>,
    rubrics: BTreeMap<String, RubricScore>,
}

#[derive(Default)]
struct SectionTally {
    total: usize,
    earned: f64,
}

fn percent(earned: f64, total: usize) -> i64 {
    if total == 0 {
        0
    } else {
        (earned / total as f64 * 100.0) as i64
    }
}

/// Grades the answers against the quiz blocks in order. Header blocks open
/// a section; questions before the first header land in "General".
async fn grade(
    blocks: &[QuizBlock],
    answers: &std::collections::HashMap<String, AnswerValue>,
    scorer: &dyn SentenceScorer,
) -> Grading {
    let mut grading = Grading::default();
    let mut section = DEFAULT_SECTION.to_string();
    let mut order: Vec<String> = Vec::new();
    let mut tallies: BTreeMap<String, SectionTally> = BTreeMap::new();
    let mut total_questions = 0usize;
    let mut total_earned = 0.0;

    for block in blocks {
        if let Some(title) = block.section_title() {
            section = title;
            continue;
        }
        let QuizBlock::Question(q) = block else {
            continue;
        };

        if !tallies.contains_key(&section) {
            order.push(section.clone());
        }
        let tally = tallies.entry(section.clone()).or_default();
        tally.total += 1;
        total_questions += 1;

        let answer = answers.get(&q.key());
        let (earned, log) = match q.kind {
            QuestionKind::Sentence => {
                let (earned, log, rubric) = grade_sentence(q, answer, &section, scorer).await;
                if let Some(rubric) = rubric {
                    grading.sentence_total += rubric.total_average;
                    grading.rubrics.insert(format!("q_{}", q.key()), rubric);
                }
                (earned, log)
            }
            kind => grade_closed(q, kind, answer, &section),
        };
        tally.earned += earned;
        total_earned += earned;
        grading.logs.push(log);
    }

    grading.score = percent(total_earned, total_questions);
    grading.section_stats = order
        .into_iter()
        .filter_map(|name| {
            tallies
                .get(&name)
                .map(|t| (name.clone(), percent(t.earned, t.total)))
        })
        .collect();
    grading
}

fn grade_closed(
    q: &QuestionBlock,
    kind: QuestionKind,
    answer: Option<&AnswerValue>,
    section: &str,
) -> (f64, QuestionLog) {
    let corrects = q.corrects();
    let given = answer.map(AnswerValue::values).unwrap_or_default();
    let is_correct = !corrects.is_empty()
        && match kind {
            QuestionKind::Checkboxes => {
                let given: HashSet<&str> = given.iter().map(|v| v.trim()).collect();
                let expected: HashSet<&str> = corrects.iter().map(|v| v.trim()).collect();
                given == expected
            }
            _ => given
                .first()
                .is_some_and(|g| corrects.iter().any(|c| c.trim() == g.trim())),
        };
    let earned = if is_correct { 1.0 } else { 0.0 };
    (
        earned,
        QuestionLog {
            section: section.to_string(),
            question: q.prompt(),
            user_answer: answer.map(AnswerValue::display).unwrap_or_default(),
            correct_answer: corrects.join(", "),
            is_correct,
            score: earned,
        },
    )
}

async fn grade_sentence(
    q: &QuestionBlock,
    answer: Option<&AnswerValue>,
    section: &str,
    scorer: &dyn SentenceScorer,
) -> (f64, QuestionLog, Option<RubricScore>) {
    let sentence = answer.map(AnswerValue::display).unwrap_or_default();
    let mut log = QuestionLog {
        section: section.to_string(),
        question: q.prompt(),
        user_answer: sentence.clone(),
        correct_answer: String::new(),
        is_correct: false,
        score: 0.0,
    };
    if sentence.trim().is_empty() {
        return (0.0, log, None);
    }

    let request = ScoreRequest {
        word: q.word.clone().unwrap_or_default(),
        sentence,
        meaning: q.meaning.clone(),
        story: q.story.clone(),
        image_url: q.image_url.clone(),
    };
    let rubric = score_sentence(scorer, &request).await;
    log.score = rubric.total_average;
    log.is_correct = rubric.total_average >= PASS_SCORE;
    log.correct_answer = format!("AI Comment: {}", rubric.comment);
    (rubric.total_average / 5.0, log, Some(rubric))
}

/// Renames raw client timing keys to stage names. Numeric keys index the
/// group's stage list and are dropped when out of range.
fn map_stage_timings(
    raw: &BTreeMap<String, f64>,
    stages: &StageConfig,
    group: &str,
) -> BTreeMap<String, f64> {
    let list = stages.stages_for(group);
    raw.iter()
        .filter_map(|(key, seconds)| {
            let name = match key.as_str() {
                "Quiz" => "Quiz".to_string(),
                "test_intro" => "Test Intro".to_string(),
                k if !k.is_empty() && k.chars().all(|c| c.is_ascii_digit()) => {
                    let index: usize = k.parse().ok()?;
                    list.get(index)?.name.clone()
                }
                k => k.to_string(),
            };
            Some((name, *seconds))
        })
        .collect()
}

/// Submits a quiz attempt.
///
/// * Resolves the learner's group (admins may preview any group).
/// * Grades closed questions locally and sentence questions via the scorer.
/// * Stores the result under the next attempt number for (user, course).
pub async fn submit_quiz(
    State(pool): State<SqlitePool>,
    State(scorer): State<Arc<dyn SentenceScorer>>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
    Json(payload): Json<SubmitQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id()?;
    let course = load_course(&pool, course_id).await?;

    let enrolled: Option<(String,)> =
        sqlx::query_as("SELECT group_name FROM enrollments WHERE user_id = ? AND course_id = ?")
            .bind(user_id)
            .bind(course_id)
            .fetch_optional(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to load enrollment: {:?}", e);
                AppError::InternalServerError(e.to_string())
            })?;

    let group = match (claims.is_admin(), payload.preview_group.clone(), enrolled) {
        (true, Some(preview), _) => preview,
        (_, _, Some((group,))) => group,
        (true, None, None) => ADMIN_FALLBACK_GROUP.to_string(),
        (false, _, None) => {
            return Err(AppError::Forbidden("Not enrolled in this course".to_string()));
        }
    };

    let blocks = course.quiz_blocks().map_err(|e| {
        tracing::error!("Course {} quiz config unreadable: {}", course_id, e);
        AppError::InternalServerError(e.to_string())
    })?;
    let grading = grade(&blocks, &payload.answers, scorer.as_ref()).await;

    let stages = course.stages().unwrap_or_else(|e| {
        tracing::warn!("Course {} stage config unreadable: {}", course_id, e);
        StageConfig::default()
    });
    let timings = map_stage_timings(&payload.stage_timing, &stages, &group);
    let nasa = NasaTlx::from(&payload.nasa);

    let section_stats_json = serde_json::to_string(&grading.section_stats)?;
    let timing_json = serde_json::to_string(&timings)?;
    let nasa_json = serde_json::to_string(&nasa)?;
    let rubrics_json = serde_json::to_string(&grading.rubrics)?;
    let log_json = serde_json::to_string(&grading.logs)?;

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    // Soft-deleted attempts keep their numbers.
    let (last_attempt,): (Option<i64>,) =
        sqlx::query_as("SELECT MAX(attempt) FROM quiz_results WHERE user_id = ? AND course_id = ?")
            .bind(user_id)
            .bind(course_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    let attempt = last_attempt.unwrap_or(0) + 1;

    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO quiz_results (
            user_id, course_id, attempt, group_name,
            translation_score, sentence_score, nasa_tlx_score, nasa_details_json,
            learning_duration_seconds, stage_timing_json, section_stats,
            ai_scoring_json, quiz_log_json
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .bind(attempt)
    .bind(&group)
    .bind(grading.score as f64)
    .bind(grading.sentence_total)
    .bind(nasa.overall())
    .bind(&nasa_json)
    .bind(payload.learning_duration)
    .bind(&timing_json)
    .bind(&section_stats_json)
    .bind(&rubrics_json)
    .bind(&log_json)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| {
        tracing::warn!("Failed to store quiz result: {:?}", e);
        AppError::from(e)
    })?;

    tx.commit()
        .await
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    tracing::info!(
        "User {} submitted attempt {} for course {} (group {}, score {})",
        user_id,
        attempt,
        course_id,
        group,
        grading.score
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitQuizResponse {
            id,
            attempt,
            group,
            score: grading.score,
            section_stats: grading.section_stats,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::scoring::FixedScorer;

    fn blocks(json: &str) -> Vec<QuizBlock> {
        serde_json::from_str(json).unwrap()
    }

    fn answers(pairs: &[(&str, AnswerValue)]) -> HashMap<String, AnswerValue> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn sections_and_overall_are_truncated_percentages() {
        let quiz = blocks(
            r#"[
                {"block_type": "question", "id": 1, "type": "choice", "correct_answer": "cat"},
                {"block_type": "header", "title": "Part B"},
                {"block_type": "question", "id": 2, "type": "choice", "correct_answers": ["dog"]},
                {"block_type": "question", "id": 3, "type": "checkboxes", "correct_answers": ["a", "b"]},
                {"block_type": "question", "id": 4, "type": "choice", "correct_answer": "x"}
            ]"#,
        );
        let given = answers(&[
            ("1", AnswerValue::One("cat".to_string())),
            ("2", AnswerValue::One("dog".to_string())),
            ("3", AnswerValue::Many(vec!["b".to_string(), "a".to_string()])),
            ("4", AnswerValue::One("y".to_string())),
        ]);
        let g = grade(&quiz, &given, &FixedScorer::uniform(0.0)).await;
        assert_eq!(g.section_stats.get("General"), Some(&100));
        assert_eq!(g.section_stats.get("Part B"), Some(&66));
        assert_eq!(g.score, 75);
        assert_eq!(g.logs.len(), 4);
        assert!(!g.logs[3].is_correct);
    }

    #[tokio::test]
    async fn sentences_contribute_a_fifth_of_their_rubric() {
        let quiz = blocks(
            r#"[
                {"block_type": "header", "title": "Writing"},
                {"block_type": "question", "id": "s1", "type": "sentence", "word": "lament"},
                {"block_type": "question", "id": "s2", "type": "sentence", "word": "lament"}
            ]"#,
        );
        let given = answers(&[("s1", AnswerValue::One("We lament the old days.".to_string()))]);
        let g = grade(&quiz, &given, &FixedScorer::uniform(4.0)).await;
        // 4/5 on one question, nothing on the unanswered one.
        assert_eq!(g.section_stats.get("Writing"), Some(&40));
        assert!(g.logs[0].is_correct);
        assert!(g.rubrics.contains_key("q_s1"));
        assert!(!g.rubrics.contains_key("q_s2"));
        assert_eq!(g.sentence_total, 4.0);
    }

    #[test]
    fn stage_timings_are_renamed_and_out_of_range_dropped() {
        let stages = StageConfig::parse(Some(
            r#"{"Common": [{"name": "Intro"}, {"name": "Practice"}], "B": [{"name": "Story"}]}"#,
        ))
        .unwrap();
        let raw: BTreeMap<String, f64> = [
            ("0", 30.0),
            ("1", 60.0),
            ("5", 99.0),
            ("Quiz", 120.0),
            ("test_intro", 10.0),
            ("Review", 15.0),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();

        let a = map_stage_timings(&raw, &stages, "A");
        assert_eq!(a.get("Intro"), Some(&30.0));
        assert_eq!(a.get("Practice"), Some(&60.0));
        assert_eq!(a.get("Quiz"), Some(&120.0));
        assert_eq!(a.get("Test Intro"), Some(&10.0));
        assert_eq!(a.get("Review"), Some(&15.0));
        assert_eq!(a.len(), 5);

        let b = map_stage_timings(&raw, &stages, "B");
        assert_eq!(b.get("Story"), Some(&30.0));
        assert!(!b.contains_key("Practice"));
    }
}
