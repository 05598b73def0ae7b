use serde::{ Serialize, Deserialize };
use serde_json::Value;

use super::chat::ConversationTurn;
use crate::settings::{ SessionSettings, SettingCommand };

pub const DEFAULT_TONE: &str = "flirty";

/// Persona and tone fields the UI attaches to most requests.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Context {
    pub tone: Option<String>,
    pub fan_name: Option<String>,
    pub model_name: Option<String>,
    pub custom_prompt: Option<String>,
    /// `None` defers to the session setting.
    pub is_uncensored: Option<bool>,
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |v| v.trim().is_empty())
}

impl Context {
    pub fn tone(&self) -> &str {
        self.tone
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TONE)
    }

    pub fn fan_name(&self) -> &str {
        self.fan_name.as_deref().map(str::trim).unwrap_or("")
    }

    pub fn model_name(&self) -> &str {
        self.model_name.as_deref().map(str::trim).unwrap_or("")
    }

    pub fn custom_prompt(&self) -> &str {
        self.custom_prompt.as_deref().map(str::trim).unwrap_or("")
    }

    pub fn is_uncensored(&self) -> bool {
        self.is_uncensored.unwrap_or(false)
    }

    /// Fills fields the caller left empty from stored session settings.
    pub fn with_fallback(mut self, settings: &SessionSettings) -> Self {
        if is_blank(self.tone.as_deref()) {
            self.tone = settings.tone.clone();
        }
        if is_blank(self.fan_name.as_deref()) {
            self.fan_name = settings.fan_name.clone();
        }
        if is_blank(self.model_name.as_deref()) {
            self.model_name = settings.model_name.clone();
        }
        if is_blank(self.custom_prompt.as_deref()) {
            self.custom_prompt = settings.custom_prompt.clone();
        }
        self.is_uncensored.get_or_insert(settings.is_uncensored);
        self
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AiChatRequest {
    pub message: String,
    #[serde(default)]
    pub context: Context,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    pub model: Option<String>,
    pub session_id: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AiChatResponse {
    pub response: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteHandlerRequest {
    pub handler_code: String,
    #[serde(default)]
    pub context: Value,
    pub model: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ExecuteHandlerResponse {
    pub result: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerateCaptionRequest {
    pub selfie_image: String,
    pub additional_context: Option<String>,
    #[serde(default)]
    pub is_uncensored: bool,
    pub model: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Caption {
    pub category: String,
    pub caption: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GenerateCaptionResponse {
    pub captions: Vec<Caption>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct GenerateMessagesRequest {
    pub category: String,
    pub count: Option<u32>,
    pub model: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GeneratedMessage {
    pub text: String,
    pub category: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct GenerateMessagesResponse {
    pub messages: Vec<GeneratedMessage>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateReplyRequest {
    pub model_context: String,
    pub fan_notes: String,
    pub fan_name: String,
    pub screenshot_text: Option<String>,
    pub screenshot_image: Option<String>,
    pub custom_prompt: Option<String>,
    pub tone: String,
    pub seed: Option<String>,
    pub is_uncensored: Option<bool>,
    pub model: Option<String>,
    pub model_name: Option<String>,
    pub session_id: Option<String>,
}

impl GenerateReplyRequest {
    /// Same rule as [`Context::with_fallback`]: the request wins unless it is blank.
    pub fn with_fallback(mut self, settings: &SessionSettings) -> Self {
        if self.tone.trim().is_empty() {
            if let Some(tone) = &settings.tone {
                self.tone = tone.clone();
            }
        }
        if self.fan_name.trim().is_empty() {
            if let Some(fan_name) = &settings.fan_name {
                self.fan_name = fan_name.clone();
            }
        }
        if is_blank(self.model_name.as_deref()) && settings.model_name.is_some() {
            self.model_name = settings.model_name.clone();
        }
        if is_blank(self.custom_prompt.as_deref()) && settings.custom_prompt.is_some() {
            self.custom_prompt = settings.custom_prompt.clone();
        }
        self.is_uncensored.get_or_insert(settings.is_uncensored);
        self
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ValidateSignupKeyRequest {
    #[serde(default)]
    pub secret_key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ValidateSignupKeyResponse {
    pub valid: bool,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SettingsChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ConversationTurn>,
    pub session_id: Option<String>,
    pub model: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SettingsChatResponse {
    pub response: String,
    pub settings: SessionSettings,
    pub applied: Vec<SettingCommand>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}
