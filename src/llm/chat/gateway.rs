use async_trait::async_trait;
use log::info;
use reqwest::{ Client as HttpClient, header::{ HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION } };
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;

use super::{ build_http_client, truncate_body, AttemptError, ChatProvider, ChatRequest, FailureKind };
use crate::llm::{ resolve_model, LlmConfig, LlmType };
use crate::models::chat::ChatMessage;

pub const DEFAULT_GATEWAY_URL: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";

#[derive(Serialize, Debug)]
struct GatewayRequest {
    model: String,
    messages: Vec<GatewayMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize, Debug, PartialEq)]
struct GatewayMessage {
    role: &'static str,
    content: GatewayContent,
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(untagged)]
enum GatewayContent {
    Text(String),
    Parts(Vec<GatewayPart>),
}

#[derive(Serialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum GatewayPart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
}

#[derive(Serialize, Debug, PartialEq)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    choices: Vec<GatewayChoice>,
}

#[derive(Deserialize)]
struct GatewayChoice {
    message: Option<GatewayReplyMessage>,
}

#[derive(Deserialize)]
struct GatewayReplyMessage {
    content: Option<String>,
}

/// Roles pass through unchanged; images become `image_url` parts.
fn to_gateway_messages(messages: &[ChatMessage]) -> Vec<GatewayMessage> {
    messages
        .iter()
        .map(|msg| {
            let content = if msg.images.is_empty() {
                GatewayContent::Text(msg.content.clone())
            } else {
                let mut parts = vec![GatewayPart::Text { text: msg.content.clone() }];
                parts.extend(
                    msg.images.iter().map(|image| GatewayPart::ImageUrl {
                        image_url: ImageUrl { url: image.data_url() },
                    })
                );
                GatewayContent::Parts(parts)
            };
            GatewayMessage { role: msg.role.as_str(), content }
        })
        .collect()
}

fn classify_status(status: u16) -> FailureKind {
    match status {
        429 => FailureKind::Quota,
        402 => FailureKind::Payment,
        401 | 403 => FailureKind::Auth,
        _ => FailureKind::Http,
    }
}

fn first_choice_text(body: &str) -> Option<String> {
    serde_json
        ::from_str::<GatewayResponse>(body)
        .ok()?
        .choices
        .into_iter()
        .next()?
        .message?
        .content
        .filter(|t| !t.trim().is_empty())
}

/// Secondary provider: an OpenAI-compatible chat-completions gateway.
pub struct GatewayChatClient {
    http: HttpClient,
    url: String,
}

impl GatewayChatClient {
    pub fn new(
        api_key: String,
        url: Option<String>,
        timeout_secs: u64
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_url = url
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| format!("Invalid API key format: {}", e))?
        );

        Ok(Self { http: build_http_client(timeout_secs, headers)?, url: api_url })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let api_key = config.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| "Gateway API key is required".to_string())?;
        Self::new(api_key, config.base_url.clone(), config.timeout_secs)
    }
}

#[async_trait]
impl ChatProvider for GatewayChatClient {
    fn llm_type(&self) -> LlmType {
        LlmType::Gateway
    }

    async fn attempt(&self, request: &ChatRequest) -> Result<String, AttemptError> {
        let model = format!("google/{}", resolve_model(&request.model));
        info!("GatewayChatClient::attempt() → model={} url={}", model, self.url);

        let payload = GatewayRequest {
            model,
            messages: to_gateway_messages(&request.messages),
            temperature: request.temperature,
        };

        let resp = self.http
            .post(&self.url)
            .json(&payload)
            .send().await
            .map_err(|e| AttemptError::transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| AttemptError::transport(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(
                AttemptError::new(classify_status(status), Some(status), truncate_body(&body))
            );
        }

        first_choice_text(&body).ok_or_else(AttemptError::empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::chat::stub;
    use crate::models::chat::InlineImage;

    #[test]
    fn roles_pass_through_unchanged() {
        let messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello")
        ];
        let out = to_gateway_messages(&messages);
        let roles: Vec<&str> = out
            .iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(out[0].content, GatewayContent::Text("sys".into()));
    }

    #[test]
    fn images_become_image_url_parts() {
        let image = InlineImage { mime_type: "image/jpeg".into(), data: "QUJD".into() };
        let out = to_gateway_messages(&[ChatMessage::user("look").with_image(image)]);
        let json = serde_json::to_value(&out[0]).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"]["url"], "data:image/jpeg;base64,QUJD");
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(429), FailureKind::Quota);
        assert_eq!(classify_status(402), FailureKind::Payment);
        assert_eq!(classify_status(401), FailureKind::Auth);
        assert_eq!(classify_status(500), FailureKind::Http);
    }

    #[test]
    fn extracts_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"hey"}}]}"#;
        assert_eq!(first_choice_text(body), Some("hey".into()));
        assert_eq!(first_choice_text(r#"{"choices":[]}"#), None);
    }

    async fn attempt_against(status: u16, body: &str) -> (Result<String, AttemptError>, stub::Seen) {
        let (url, seen) = stub::spawn(status, body).await;
        let client = GatewayChatClient::new("gw-key".into(), Some(format!("{}/v1/chat/completions", url)), 5).unwrap();
        let request = ChatRequest::new("gemini-flash", vec![ChatMessage::system("sys"), ChatMessage::user("hi")]);
        let result = client.attempt(&request).await;
        let seen = seen.lock().unwrap().clone().unwrap();
        (result, seen)
    }

    #[tokio::test]
    async fn attempt_sends_bearer_and_prefixed_model() {
        let (result, seen) = attempt_against(
            200,
            r#"{"choices":[{"message":{"role":"assistant","content":"from gateway"}}]}"#
        ).await;
        assert_eq!(result.unwrap(), "from gateway");
        assert_eq!(seen.path, "/v1/chat/completions");
        assert_eq!(seen.authorization.as_deref(), Some("Bearer gw-key"));
        assert_eq!(seen.body["model"], "google/gemini-2.5-flash");
        assert_eq!(seen.body["messages"][0]["role"], "system");
        assert_eq!(seen.body["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn attempt_maps_status_to_failure_kind() {
        for (status, kind) in [
            (429, FailureKind::Quota),
            (402, FailureKind::Payment),
            (403, FailureKind::Auth),
            (503, FailureKind::Http),
        ] {
            let (result, _) = attempt_against(status, "nope").await;
            let err = result.unwrap_err();
            assert_eq!(err.kind, kind, "status {}", status);
            assert_eq!(err.status, Some(status));
        }
    }
}
