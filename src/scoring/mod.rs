// src/scoring/mod.rs

//! Sentence scoring for `sentence` quiz questions.
//!
//! The LLM only ever sees sentences that pass the local checks; its reply is
//! parsed leniently and every rubric value is clamped to 0–5.

pub mod extract;
pub mod openai;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::analytics::round_to;
pub use extract::{RawRubric, extract_rubric};
pub use openai::OpenAiScorer;

pub const MAX_SCORE: f64 = 5.0;

/// Rubric score at or above which a sentence counts as correct.
pub const PASS_SCORE: f64 = 3.0;

#[derive(Debug)]
pub enum ScoringError {
    /// No LLM endpoint is configured.
    Disabled,
    Transport(String),
    Api { status: u16, message: String },
    /// The reply could not be read as a rubric.
    Format(String),
}

impl std::fmt::Display for ScoringError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoringError::Disabled => write!(f, "sentence scoring is not configured"),
            ScoringError::Transport(msg) => write!(f, "transport error: {}", msg),
            ScoringError::Api { status, message } => {
                write!(f, "scoring API returned {}: {}", status, message)
            }
            ScoringError::Format(msg) => write!(f, "invalid scoring reply: {}", msg),
        }
    }
}

impl std::error::Error for ScoringError {}

/// What the scorer needs to know about one written sentence.
#[derive(Debug, Clone, Default)]
pub struct ScoreRequest {
    pub word: String,
    pub sentence: String,
    pub meaning: Option<String>,
    pub story: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RubricScore {
    pub semantic_depth: f64,
    pub collocation: f64,
    pub grammar: f64,
    pub image_relevance: f64,
    pub total_average: f64,
    pub comment: String,
}

impl RubricScore {
    pub fn zero(comment: impl Into<String>) -> Self {
        Self {
            comment: comment.into(),
            ..Default::default()
        }
    }

    fn from_raw(raw: RawRubric) -> Self {
        let clamp = |v: Option<f64>| v.unwrap_or(0.0).clamp(0.0, MAX_SCORE);
        let mut score = Self {
            semantic_depth: clamp(raw.semantic_depth),
            collocation: clamp(raw.collocation),
            grammar: clamp(raw.grammar),
            image_relevance: clamp(raw.image_relevance),
            total_average: 0.0,
            comment: raw
                .comment
                .unwrap_or_else(|| "No comment was returned by the scorer.".to_string()),
        };
        score.total_average = round_to(
            (score.semantic_depth + score.collocation + score.grammar + score.image_relevance) / 4.0,
            2,
        );
        score
    }

    fn has_points(&self) -> bool {
        self.semantic_depth > 0.0
            || self.collocation > 0.0
            || self.grammar > 0.0
            || self.image_relevance > 0.0
    }
}

/// The remote half of scoring: asks a model to grade one sentence and
/// returns its raw reply.
#[async_trait]
pub trait SentenceScorer: Send + Sync {
    async fn request_rubric(&self, request: &ScoreRequest) -> Result<String, ScoringError>;
}

/// Scorer used when no LLM endpoint is configured.
pub struct DisabledScorer;

#[async_trait]
impl SentenceScorer for DisabledScorer {
    async fn request_rubric(&self, _request: &ScoreRequest) -> Result<String, ScoringError> {
        Err(ScoringError::Disabled)
    }
}

/// Always answers with the same reply. Handy for offline runs and tests.
pub struct FixedScorer {
    reply: String,
}

impl FixedScorer {
    pub fn new(reply: impl Into<String>) -> Self {
        Self { reply: reply.into() }
    }

    /// A reply awarding `score` on every rubric dimension.
    pub fn uniform(score: f64) -> Self {
        Self::new(format!(
            r#"{{"semantic_depth": {s}, "collocation": {s}, "grammar": {s}, "image_relevance": {s}, "comment": "Fixed score."}}"#,
            s = score
        ))
    }
}

#[async_trait]
impl SentenceScorer for FixedScorer {
    async fn request_rubric(&self, _request: &ScoreRequest) -> Result<String, ScoringError> {
        Ok(self.reply.clone())
    }
}

/// Scores one sentence. Never fails: local rejections, transport errors and
/// unreadable replies all come back as a zero rubric with a comment.
pub async fn score_sentence(scorer: &dyn SentenceScorer, request: &ScoreRequest) -> RubricScore {
    if let Some(rejection) = precheck(&request.word, &request.sentence) {
        return RubricScore::zero(rejection);
    }

    let reply = match scorer.request_rubric(request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!("Sentence scoring failed for '{}': {}", request.word, e);
            return RubricScore::zero(format!("Scoring failed: {}", e));
        }
    };

    let Some(raw) = extract_rubric(&reply) else {
        tracing::warn!("Unreadable scoring reply for '{}': {}", request.word, reply);
        return RubricScore::zero(format!(
            "Scoring failed: {}",
            ScoringError::Format("no rubric fields found".to_string())
        ));
    };

    let score = RubricScore::from_raw(raw);
    if score.has_points() && !contains_target(&request.word, &request.sentence) {
        return RubricScore::zero(format!(
            "The sentence does not use the target word '{}'.",
            request.word
        ));
    }
    score
}

fn letters_and_digits(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect()
}

fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Local rejections that need no model call. Returns the comment to show.
pub fn precheck(word: &str, sentence: &str) -> Option<String> {
    let trimmed = sentence.trim();
    if trimmed.is_empty() {
        return Some("No sentence was submitted.".to_string());
    }

    let has_latin = trimmed.chars().any(|c| c.is_ascii_alphabetic());
    if !has_latin && trimmed.chars().any(is_cjk) {
        return Some("The sentence is written only in Chinese; please write it in English.".to_string());
    }

    let lowered = trimmed.to_lowercase();
    let target = word.trim().to_lowercase();
    if letters_and_digits(&lowered) == letters_and_digits(&target) {
        return Some(
            "Please write a complete sentence instead of repeating the word.".to_string(),
        );
    }

    if is_placeholder(&lowered, &target) {
        return Some(
            "Template sentence detected (asking what the word means or how to use it). \
             Please use the word in a meaningful sentence."
                .to_string(),
        );
    }
    None
}

/// Requests for help instead of an answer. An empty `word` group marks where
/// the target word has to follow for the pattern to count.
static PLACEHOLDER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"i (don't|do not|don't really) know",
        r"i (cannot|can't|am unable to) (make|write|use|create|do)",
        r"(what|how) (is|does|to|means|meaning) (?P<word>)",
        r"meaning of (this word|the word|(?P<word>))",
        r"definition of (this word|the word|(?P<word>))",
        r"how to (use|make|write|say) (?P<word>)",
        r"tell me (about|the|how|what) (?P<word>)",
        r"give me a sentence",
        r"can you (figure out|tell me|show me|help me|explain)",
        r"do you (know|understand|have)",
        r"i (don't|do not|don't really) understand",
        r"is (a|the) (hard|difficult|new|word)",
        r"usage (of|for) (?P<word>)",
        r"please (tell|show|give|help|describe|explain)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

fn is_placeholder(lowered: &str, word: &str) -> bool {
    PLACEHOLDER_PATTERNS.iter().any(|re| {
        re.captures_iter(lowered).any(|caps| match caps.name("word") {
            Some(at) => lowered[at.end()..].starts_with(word),
            None => true,
        })
    })
}

/// Whether `candidate` is `target` or a regular inflection of it.
fn is_inflection(target: &str, candidate: &str) -> bool {
    if target.is_empty() {
        return false;
    }
    if target == candidate {
        return true;
    }
    if let Some(suffix) = candidate.strip_prefix(target) {
        if ["s", "es", "ed", "d", "ing", "ies", "ied"].contains(&suffix) {
            return true;
        }
        if target.chars().count() > 2 {
            if let Some(last) = target.chars().last() {
                let doubled = [format!("{}ing", last), format!("{}ed", last)];
                if doubled.iter().any(|d| d == suffix) {
                    return true;
                }
            }
        }
    }
    if let Some(stem) = target.strip_suffix('y') {
        if let Some(suffix) = candidate.strip_prefix(stem) {
            return ["ies", "ied", "ying"].contains(&suffix);
        }
    }
    false
}

/// Whether the sentence uses the target word in some regular form.
pub fn contains_target(word: &str, sentence: &str) -> bool {
    let target = letters_and_digits(&word.to_lowercase());
    sentence
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .any(|w| is_inflection(&target, w))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(word: &str, sentence: &str) -> ScoreRequest {
        ScoreRequest {
            word: word.to_string(),
            sentence: sentence.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn precheck_rejects_trivial_answers() {
        assert!(precheck("apple", "   ").is_some());
        assert!(precheck("apple", "我喜歡蘋果").is_some());
        assert!(precheck("apple", " Apple. ").is_some());
        assert!(precheck("lament", "I don't know what lament means").is_some());
        assert!(precheck("lament", "What is lament?").is_some());
        assert!(precheck("lament", "She began to lament the loss of her garden.").is_none());
    }

    #[test]
    fn placeholders_need_the_target_word_where_marked() {
        assert!(is_placeholder("what does lament mean?", "lament"));
        assert!(is_placeholder("the meaning of the word escapes me", "lament"));
        assert!(is_placeholder("usage of laments", "lament"));
        assert!(!is_placeholder("what is the time? i lament it", "lament"));
        assert!(!is_placeholder("the meaning of life is to lament", "lament"));
        assert!(is_placeholder("please explain", "lament"));
        assert_eq!(PLACEHOLDER_PATTERNS.len(), 14);
    }

    #[test]
    fn inflections_count_as_the_word() {
        assert!(contains_target("study", "She studies every night."));
        assert!(contains_target("study", "He was studying."));
        assert!(contains_target("slam", "The door slammed shut."));
        assert!(contains_target("walk", "We walked home."));
        assert!(contains_target("Box", "two boxes"));
        assert!(!contains_target("lament", "She cried all night."));
    }

    #[tokio::test]
    async fn scores_are_clamped_and_averaged() {
        let scorer = FixedScorer::new(
            r#"{"semantic_depth": 7, "collocation": 4, "grammar": 3, "image_relevance": -1, "comment": "ok"}"#,
        );
        let score = score_sentence(&scorer, &request("lament", "They lament the old days.")).await;
        assert_eq!(score.semantic_depth, 5.0);
        assert_eq!(score.image_relevance, 0.0);
        assert_eq!(score.total_average, 3.0);
        assert_eq!(score.comment, "ok");
    }

    #[tokio::test]
    async fn missing_target_word_zeroes_the_rubric() {
        let scorer = FixedScorer::uniform(4.0);
        let score = score_sentence(&scorer, &request("lament", "They mourn the old days.")).await;
        assert_eq!(score.total_average, 0.0);
        assert!(score.comment.contains("lament"));
    }

    #[tokio::test]
    async fn failures_become_zero_scores() {
        let score = score_sentence(&DisabledScorer, &request("lament", "They lament it.")).await;
        assert_eq!(score.total_average, 0.0);
        assert!(score.comment.starts_with("Scoring failed"));

        let garbled = FixedScorer::new("I refuse to grade this.");
        let score = score_sentence(&garbled, &request("lament", "They lament it.")).await;
        assert_eq!(score.total_average, 0.0);
    }

    #[tokio::test]
    async fn local_rejection_skips_the_model() {
        let scorer = FixedScorer::uniform(5.0);
        let score = score_sentence(&scorer, &request("apple", "apple")).await;
        assert_eq!(score.total_average, 0.0);
    }
}
