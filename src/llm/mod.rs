pub mod chat;
pub mod fallback;

use serde::{ Deserialize, Serialize };
use std::fmt;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Logical model name → concrete upstream identifier.
const MODEL_TABLE: &[(&str, &str)] = &[
    ("gemini-flash", "gemini-2.5-flash"),
    ("gemini-pro", "gemini-2.5-pro"),
    ("gemini-flash-lite", "gemini-2.5-flash-lite"),
    ("gemini-2.0-flash", "gemini-2.0-flash"),
];

/// Resolves a caller-facing model name. Unknown names fall back to [`DEFAULT_MODEL`].
pub fn resolve_model(logical: &str) -> &'static str {
    let name = logical.trim().to_lowercase();
    MODEL_TABLE
        .iter()
        .find(|(alias, concrete)| *alias == name || *concrete == name)
        .map(|(_, concrete)| *concrete)
        .unwrap_or(DEFAULT_MODEL)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    Gemini,
    Gateway,
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmType::Gemini => write!(f, "gemini"),
            LlmType::Gateway => write!(f, "gateway"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_aliases_map_to_concrete_models() {
        assert_eq!(resolve_model("gemini-pro"), "gemini-2.5-pro");
        assert_eq!(resolve_model("Gemini-Flash-Lite"), "gemini-2.5-flash-lite");
        assert_eq!(resolve_model("gemini-2.5-pro"), "gemini-2.5-pro");
    }

    #[test]
    fn unknown_model_falls_back_to_default() {
        assert_eq!(resolve_model("gpt-9"), DEFAULT_MODEL);
        assert_eq!(resolve_model(""), DEFAULT_MODEL);
    }

    #[test]
    fn llm_type_displays_as_label() {
        assert_eq!(LlmType::Gemini.to_string(), "gemini");
        assert_eq!(LlmType::Gateway.to_string(), "gateway");
    }
}
