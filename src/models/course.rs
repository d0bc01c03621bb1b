// src/models/course.rs

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::quiz_result::{ParseError, parse_json_field};

/// Group whose stages apply when a group has no stage list of its own.
pub const COMMON_GROUP: &str = "Common";

/// Stage-timing keys that count as quiz time rather than learning time.
pub const QUIZ_STAGE_KEYS: [&str; 3] = ["Quiz", "Test Intro", "Quiz Intro"];

/// Represents the 'courses' table in the database.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Course {
    pub id: i64,
    pub name: String,

    /// Comma-separated experimental group labels, e.g. "A,B" or "Red,Blue,Green".
    pub group_names: String,

    /// JSON map of group -> ordered stage list.
    pub stage_config: Option<String>,

    /// JSON list of quiz blocks.
    pub quiz_config: Option<String>,

    pub is_deleted: bool,
}

impl Course {
    /// Configured group labels. Falls back to `A,B` when none are set.
    pub fn groups(&self) -> Vec<String> {
        let groups: Vec<String> = self
            .group_names
            .split(',')
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect();
        if groups.is_empty() {
            vec!["A".to_string(), "B".to_string()]
        } else {
            groups
        }
    }

    pub fn stages(&self) -> Result<StageConfig, ParseError> {
        StageConfig::parse(self.stage_config.as_deref())
    }

    pub fn quiz_blocks(&self) -> Result<Vec<QuizBlock>, ParseError> {
        parse_json_field("quiz_config", self.quiz_config.as_deref())
    }
}

/// One named stage of learning content. Stored either as a bare name or
/// as `{"name": ..., "count": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawStageEntry")]
pub struct StageEntry {
    pub name: String,
    pub count: Option<u32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStageEntry {
    Name(String),
    Full {
        #[serde(alias = "title")]
        name: String,
        #[serde(default)]
        count: Option<u32>,
    },
}

impl From<RawStageEntry> for StageEntry {
    fn from(raw: RawStageEntry) -> Self {
        match raw {
            RawStageEntry::Name(name) => Self { name, count: None },
            RawStageEntry::Full { name, count } => Self { name, count },
        }
    }
}

/// Per-group ordered stage lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageConfig(pub BTreeMap<String, Vec<StageEntry>>);

impl StageConfig {
    /// Reads the canonical map form. The flat list form is rewritten by
    /// migration `0002_stage_config_map` and is rejected here.
    pub fn parse(raw: Option<&str>) -> Result<Self, ParseError> {
        let value: serde_json::Value = parse_json_field("stage_config", raw)?;
        match value {
            serde_json::Value::Null => Ok(Self::default()),
            serde_json::Value::Array(_) => Err(ParseError::LegacyFormat {
                field: "stage_config",
            }),
            other => serde_json::from_value(other).map_err(|e| ParseError::Malformed {
                field: "stage_config",
                message: e.to_string(),
            }),
        }
    }

    /// Stage list for `group`, falling back to the common list.
    pub fn stages_for(&self, group: &str) -> &[StageEntry] {
        self.0
            .get(group)
            .or_else(|| self.0.get(COMMON_GROUP))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn active_stage_names(&self, group: &str) -> HashSet<&str> {
        self.stages_for(group).iter().map(|s| s.name.as_str()).collect()
    }
}

/// One block of a course quiz, in the order the learner sees them.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "block_type", rename_all = "snake_case")]
pub enum QuizBlock {
    /// Opens a new scoring section.
    #[serde(alias = "section_header", alias = "section")]
    Header {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },
    Question(QuestionBlock),
    #[serde(other)]
    Other,
}

impl QuizBlock {
    /// Section name opened by a header block.
    pub fn section_title(&self) -> Option<String> {
        match self {
            QuizBlock::Header { title, content } => Some(
                title
                    .clone()
                    .filter(|t| !t.is_empty())
                    .or_else(|| content.clone().filter(|c| !c.is_empty()))
                    .unwrap_or_else(|| "Section".to_string()),
            ),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    Checkboxes,
    Sentence,
    #[default]
    #[serde(other)]
    Choice,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestionBlock {
    /// Question ids are numbers in some configs and strings in others.
    pub id: serde_json::Value,
    #[serde(rename = "type", default)]
    pub kind: QuestionKind,
    #[serde(default, alias = "title", alias = "text", alias = "label")]
    pub content: Option<String>,
    #[serde(default)]
    pub correct_answers: Vec<String>,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub word: Option<String>,
    #[serde(default)]
    pub story: Option<String>,
    #[serde(default)]
    pub meaning: Option<String>,
    #[serde(default, alias = "image")]
    pub image_url: Option<String>,
}

impl QuestionBlock {
    /// Answer key used by the submission form.
    pub fn key(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn corrects(&self) -> Vec<String> {
        if self.correct_answers.is_empty() {
            self.correct_answer.iter().cloned().collect()
        } else {
            self.correct_answers.clone()
        }
    }

    pub fn prompt(&self) -> String {
        self.content.clone().unwrap_or_else(|| "Question".to_string())
    }
}

/// Enrollment counts per configured group, used for auto-balancing.
pub fn least_populated_group(groups: &[String], counts: &HashMap<String, i64>) -> Option<String> {
    let min = groups
        .iter()
        .map(|g| counts.get(g).copied().unwrap_or(0))
        .min()?;
    groups
        .iter()
        .find(|g| counts.get(*g).copied().unwrap_or(0) == min)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_lookup_falls_back_to_common() {
        let cfg = StageConfig::parse(Some(
            r#"{"A": [{"name": "Warmup"}], "Common": [{"name": "Stage 1", "count": 10}]}"#,
        ))
        .unwrap();
        assert!(cfg.active_stage_names("A").contains("Warmup"));
        assert!(cfg.active_stage_names("B").contains("Stage 1"));
        assert!(!cfg.active_stage_names("B").contains("Warmup"));
    }

    #[test]
    fn stages_may_be_bare_names() {
        let cfg = StageConfig::parse(Some(
            r#"{"A": ["Warmup", {"title": "Stage 1", "count": 5}, 3]}"#,
        ));
        assert!(matches!(cfg, Err(ParseError::Malformed { .. })));

        let cfg = StageConfig::parse(Some(r#"{"A": ["Warmup", {"title": "Stage 1", "count": 5}]}"#))
            .unwrap();
        assert_eq!(
            cfg.stages_for("A"),
            &[
                StageEntry { name: "Warmup".to_string(), count: None },
                StageEntry { name: "Stage 1".to_string(), count: Some(5) },
            ]
        );
    }

    #[test]
    fn legacy_list_form_is_flagged() {
        let err = StageConfig::parse(Some(r#"[{"name": "Stage 1"}]"#)).unwrap_err();
        assert_eq!(err, ParseError::LegacyFormat { field: "stage_config" });
    }

    #[test]
    fn quiz_blocks_accept_header_aliases_and_unknown_blocks() {
        let blocks: Vec<QuizBlock> = serde_json::from_str(
            r#"[
                {"block_type": "section_header", "title": "Part A"},
                {"block_type": "question", "id": 7, "type": "multiple_choice", "correct_answer": "cat"},
                {"block_type": "image"}
            ]"#,
        )
        .unwrap();
        assert_eq!(blocks[0].section_title().as_deref(), Some("Part A"));
        match &blocks[1] {
            QuizBlock::Question(q) => {
                assert_eq!(q.key(), "7");
                assert_eq!(q.kind, QuestionKind::Choice);
                assert_eq!(q.corrects(), vec!["cat".to_string()]);
            }
            other => panic!("unexpected block {:?}", other),
        }
        assert!(matches!(blocks[2], QuizBlock::Other));
    }

    #[test]
    fn balancing_prefers_emptiest_then_configured_order() {
        let groups = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let mut counts = HashMap::new();
        counts.insert("A".to_string(), 2);
        counts.insert("B".to_string(), 1);
        assert_eq!(least_populated_group(&groups, &counts).as_deref(), Some("C"));
        counts.insert("C".to_string(), 1);
        assert_eq!(least_populated_group(&groups, &counts).as_deref(), Some("B"));
    }
}
