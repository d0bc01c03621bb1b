// src/scoring/openai.rs

//! OpenAI-compatible chat-completions client for sentence scoring.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{ScoreRequest, ScoringError, SentenceScorer};

const TIMEOUT_SECS: u64 = 60;
const MAX_TOKENS: u32 = 600;
const TEMPERATURE: f64 = 0.1;

pub struct OpenAiScorer {
    api_key: String,
    base_url: String,
    model: String,
    static_dir: PathBuf,
    client: reqwest::Client,
}

impl OpenAiScorer {
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        static_dir: impl Into<PathBuf>,
    ) -> Result<Self, ScoringError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(TIMEOUT_SECS))
            .build()
            .map_err(|e| ScoringError::Transport(e.to_string()))?;

        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            static_dir: static_dir.into(),
            client,
        })
    }

    /// Remote images are passed by URL; files under the static directory are
    /// inlined as data URIs so the model can see them without public hosting.
    async fn image_reference(&self, image_url: &str) -> Option<String> {
        if image_url.starts_with("http://") || image_url.starts_with("https://") {
            return Some(image_url.to_string());
        }
        let path = static_path(&self.static_dir, image_url)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Some(format!(
                "data:{};base64,{}",
                mime_for(&path),
                general_purpose::STANDARD.encode(bytes)
            )),
            Err(e) => {
                tracing::warn!("Could not read image {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Maps `/static/uploads/x.png` (or `uploads/x.png`) into `static_dir`,
/// refusing paths that climb out of it.
fn static_path(static_dir: &Path, url: &str) -> Option<PathBuf> {
    let relative = url
        .trim_start_matches('/')
        .trim_start_matches("static/");
    if relative.is_empty() || relative.split('/').any(|part| part == "..") {
        return None;
    }
    Some(static_dir.join(relative))
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

fn prompt(request: &ScoreRequest) -> String {
    format!(
        r#"Act as a very strict English examiner.

Target word: {word} (meaning: {meaning})
Context: {story}
Student sentence: {sentence}

Score each dimension from 0.0 to 5.0 (never above 5):
- 5.0: native-like, rich, and closely tied to the picture.
- 3.0: correct but plain, or only loosely tied to the picture.
- 1.0: major grammar or meaning problems.
- 0.0: nonsense, the word is missing, or the word was pasted on its own.

Rules:
1. image_relevance is 0 when the sentence describes things that are not in the picture.
   Without a picture, judge relevance against the context.
2. Sentences that only ask what the word means or how to use it score 0 overall.
3. Very short sentences such as "He felt {word}." score at most 2.0.
4. The comment must give a concrete suggestion about the sentence and the picture.

Reply with JSON only:
{{"semantic_depth": 0-5, "collocation": 0-5, "grammar": 0-5, "image_relevance": 0-5, "comment": "one line"}}"#,
        word = request.word,
        meaning = request.meaning.as_deref().unwrap_or("-"),
        story = request.story.as_deref().unwrap_or("-"),
        sentence = request.sentence,
    )
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl SentenceScorer for OpenAiScorer {
    #[instrument(skip(self, request), fields(model = %self.model, word = %request.word))]
    async fn request_rubric(&self, request: &ScoreRequest) -> Result<String, ScoringError> {
        let mut content = vec![ContentPart::Text {
            text: prompt(request),
        }];
        if let Some(url) = request.image_url.as_deref() {
            if let Some(url) = self.image_reference(url).await {
                content.push(ContentPart::ImageUrl {
                    image_url: ImageUrl { url },
                });
            }
        }

        let body = ChatRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ScoringError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ScoringError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ScoringError::Format(e.to_string()))?;

        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        tracing::debug!("Scoring reply: {}", reply);
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_urls_map_into_the_static_dir() {
        let dir = Path::new("/srv/static");
        assert_eq!(
            static_path(dir, "/static/uploads/cat.png"),
            Some(PathBuf::from("/srv/static/uploads/cat.png"))
        );
        assert_eq!(
            static_path(dir, "uploads/cat.png"),
            Some(PathBuf::from("/srv/static/uploads/cat.png"))
        );
        assert_eq!(static_path(dir, "/static/../secret.txt"), None);
    }

    #[test]
    fn request_body_carries_text_and_image_parts() {
        let body = ChatRequest {
            model: "m".to_string(),
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: "hi".to_string() },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: "https://x/y.png".to_string() },
                    },
                ],
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert_eq!(json["messages"][0]["content"][1]["type"], "image_url");
        assert_eq!(json["messages"][0]["content"][1]["image_url"]["url"], "https://x/y.png");
    }

    #[test]
    fn prompt_names_word_and_sentence() {
        let p = prompt(&ScoreRequest {
            word: "lament".to_string(),
            sentence: "They lament the old days.".to_string(),
            ..Default::default()
        });
        assert!(p.contains("Target word: lament"));
        assert!(p.contains("They lament the old days."));
    }
}
