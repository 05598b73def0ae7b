use async_trait::async_trait;
use log::info;
use reqwest::{ Client as HttpClient, header::HeaderMap };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ build_http_client, truncate_body, AttemptError, ChatProvider, ChatRequest, FailureKind };
use crate::llm::{ resolve_model, LlmConfig, LlmType };
use crate::models::chat::{ ChatMessage, Role };

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Debug, PartialEq)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: Option<GoogleContent>,
}

#[derive(Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    text: Option<String>,
}

/// Splits off a leading system message and converts the rest to Gemini turns.
fn to_gemini_contents(messages: &[ChatMessage]) -> (Option<GeminiContent>, Vec<GeminiContent>) {
    let (system, rest) = match messages.split_first() {
        Some((first, rest)) if first.role == Role::System => (Some(first), rest),
        _ => (None, messages),
    };

    let system_instruction = system.map(|msg| GeminiContent {
        role: None,
        parts: vec![GeminiPart::Text { text: msg.content.clone() }],
    });

    let contents = rest
        .iter()
        .map(|msg| {
            let role = match msg.role {
                Role::Assistant => "model",
                Role::User | Role::System => "user",
            };
            let mut parts = Vec::with_capacity(1 + msg.images.len());
            if !msg.content.is_empty() || msg.images.is_empty() {
                parts.push(GeminiPart::Text { text: msg.content.clone() });
            }
            for image in &msg.images {
                parts.push(GeminiPart::Inline {
                    inline_data: InlineData {
                        mime_type: image.mime_type.clone(),
                        data: image.data.clone(),
                    },
                });
            }
            GeminiContent { role: Some(role), parts }
        })
        .collect();

    (system_instruction, contents)
}

fn is_quota_signal(status: u16, body: &str) -> bool {
    if status == 429 || status == 403 {
        return true;
    }
    let lowered = body.to_lowercase();
    lowered.contains("resource_exhausted") || lowered.contains("quota")
}

fn first_candidate_text(body: &str) -> Option<String> {
    serde_json
        ::from_str::<GoogleResponse>(body)
        .ok()?
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .next()?
        .text
        .filter(|t| !t.trim().is_empty())
}

/// Primary provider. One instance per configured API key.
pub struct GeminiChatClient {
    http: HttpClient,
    api_key: String,
    base_url: String,
}

impl GeminiChatClient {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        timeout_secs: u64
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let base_url = base_url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self {
            http: build_http_client(timeout_secs, HeaderMap::new())?,
            api_key,
            base_url,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| "Gemini API key is required for GeminiChatClient".to_string())?;
        Self::new(api_key, config.base_url.clone(), config.timeout_secs)
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url.trim_end_matches('/'), model)
    }
}

#[async_trait]
impl ChatProvider for GeminiChatClient {
    fn llm_type(&self) -> LlmType {
        LlmType::Gemini
    }

    async fn attempt(&self, request: &ChatRequest) -> Result<String, AttemptError> {
        let model = resolve_model(&request.model);
        let (system_instruction, contents) = to_gemini_contents(&request.messages);
        let payload = GeminiRequest {
            system_instruction,
            contents,
            generation_config: request.temperature.map(|temperature| GenerationConfig {
                temperature,
            }),
        };

        info!("GeminiChatClient::attempt() → model={} base_url={}", model, self.base_url);

        let resp = self.http
            .post(self.endpoint(model))
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send().await
            .map_err(|e| AttemptError::transport(e.without_url().to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .text().await
            .map_err(|e| AttemptError::transport(e.without_url().to_string()))?;

        if !(200..300).contains(&status) {
            let kind = if is_quota_signal(status, &body) {
                FailureKind::Quota
            } else if status == 401 {
                FailureKind::Auth
            } else {
                FailureKind::Http
            };
            return Err(AttemptError::new(kind, Some(status), truncate_body(&body)));
        }

        first_candidate_text(&body).ok_or_else(AttemptError::empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::stub;
    use crate::models::chat::InlineImage;

    #[test]
    fn leading_system_message_becomes_instruction() {
        let messages = vec![
            ChatMessage::system("be nice"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hey there")
        ];
        let (system, contents) = to_gemini_contents(&messages);
        assert_eq!(
            system,
            Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart::Text { text: "be nice".into() }],
            })
        );
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].role, Some("user"));
        assert_eq!(contents[1].role, Some("model"));
    }

    #[test]
    fn no_system_message_keeps_all_turns() {
        let messages = vec![ChatMessage::user("hi")];
        let (system, contents) = to_gemini_contents(&messages);
        assert!(system.is_none());
        assert_eq!(contents.len(), 1);
    }

    #[test]
    fn images_become_inline_parts() {
        let image = InlineImage { mime_type: "image/png".into(), data: "AAAA".into() };
        let messages = vec![ChatMessage::user("read this").with_image(image)];
        let (_, contents) = to_gemini_contents(&messages);
        let json = serde_json::to_value(&contents[0]).unwrap();
        assert_eq!(json["parts"][0]["text"], "read this");
        assert_eq!(json["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(json["parts"][1]["inlineData"]["data"], "AAAA");
    }

    #[test]
    fn quota_signals_are_detected() {
        assert!(is_quota_signal(429, ""));
        assert!(is_quota_signal(403, ""));
        assert!(is_quota_signal(400, r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#));
        assert!(is_quota_signal(500, "You exceeded your current quota"));
        assert!(!is_quota_signal(500, "internal"));
    }

    #[test]
    fn extracts_first_part_of_first_candidate() {
        let body =
            r#"{"candidates":[{"content":{"parts":[{"text":"first"},{"text":"second"}]}},{"content":{"parts":[{"text":"other"}]}}]}"#;
        assert_eq!(first_candidate_text(body), Some("first".to_string()));
    }

    #[test]
    fn missing_text_is_none() {
        assert_eq!(first_candidate_text(r#"{"candidates":[]}"#), None);
        assert_eq!(first_candidate_text(r#"{"candidates":[{"content":{"parts":[]}}]}"#), None);
        assert_eq!(first_candidate_text(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#), None);
        assert_eq!(first_candidate_text("not json"), None);
    }

    fn client(base_url: String) -> GeminiChatClient {
        GeminiChatClient::new("k-secret".into(), Some(base_url), 5).unwrap()
    }

    fn request() -> ChatRequest {
        ChatRequest::new("gemini-pro", vec![ChatMessage::system("be nice"), ChatMessage::user("hi")])
    }

    async fn failure_for(status: u16, body: &str) -> AttemptError {
        let (base, _) = stub::spawn(status, body).await;
        client(base).attempt(&request()).await.unwrap_err()
    }

    #[tokio::test]
    async fn attempt_posts_to_generate_content_with_key_query() {
        let (base, seen) = stub::spawn(
            200,
            r#"{"candidates":[{"content":{"parts":[{"text":"hello back"}]}}]}"#
        ).await;
        let text = client(base).attempt(&request().temperature(0.9)).await.unwrap();
        assert_eq!(text, "hello back");

        let seen = seen.lock().unwrap().clone().unwrap();
        assert_eq!(seen.path, "/models/gemini-2.5-pro:generateContent");
        assert_eq!(seen.query.get("key").map(String::as_str), Some("k-secret"));
        assert_eq!(seen.authorization, None);
        assert_eq!(seen.body["systemInstruction"]["parts"][0]["text"], "be nice");
        assert_eq!(seen.body["contents"][0]["role"], "user");
        assert!((seen.body["generationConfig"]["temperature"].as_f64().unwrap() - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn attempt_classifies_upstream_failures() {
        let err = failure_for(429, "slow down").await;
        assert_eq!((err.kind, err.status), (FailureKind::Quota, Some(429)));

        let err = failure_for(403, "forbidden").await;
        assert_eq!(err.kind, FailureKind::Quota);

        let err = failure_for(400, r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#).await;
        assert_eq!((err.kind, err.status), (FailureKind::Quota, Some(400)));

        let err = failure_for(401, "bad key").await;
        assert_eq!(err.kind, FailureKind::Auth);

        let err = failure_for(500, "boom").await;
        assert_eq!((err.kind, err.status), (FailureKind::Http, Some(500)));
        assert_eq!(err.message, "boom");
    }

    #[tokio::test]
    async fn attempt_without_text_is_empty() {
        let err = failure_for(200, r#"{"candidates":[{"finishReason":"SAFETY"}]}"#).await;
        assert_eq!(err.kind, FailureKind::Empty);
    }

    #[tokio::test]
    async fn transport_error_does_not_leak_key() {
        let err = client(stub::closed_port().await).attempt(&request()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::Transport);
        assert!(!err.message.contains("k-secret"));
    }
}
