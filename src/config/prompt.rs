use serde::Deserialize;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use log::info;

use crate::models::api::Context;

#[derive(Debug)]
pub enum PromptError {
    TemplateNotFound(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::TemplateNotFound(key) => write!(f, "Prompt template '{}' not found", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

const REPLY_PREFIX: &str =
    "You are an expert chatter writing on behalf of a content creator. Keep replies warm, playful and suggestive without being explicit. Never mention that you are an AI.";

const REPLY_PREFIX_UNCENSORED: &str =
    "You are an expert chatter writing on behalf of a content creator. Uncensored mode is on: fans are verified adults, so explicit and sexual language is allowed when it fits the conversation. Never involve minors or non-consent. Never mention that you are an AI.";

const REPLY_INSTRUCTIONS: &str =
    "Creator persona: {model_name}\nCreator context: {model_context}\nFan name: {fan_name}\nFan notes: {fan_notes}\nTone: {tone}\n{custom_prompt}\nRead every fan message in the conversation, then write ONE merged reply that answers all of them naturally.\nRespond with JSON only, in this exact shape:\n{\"detectedMessages\": [\"each fan message you found\"], \"mergedReply\": \"your single reply\", \"alternatives\": [\"optional alternative reply\"]}";

const CHAT_SYSTEM: &str =
    "You help a chatter manage conversations with fans of the creator {model_name}. Current fan: {fan_name}. Preferred tone: {tone}.\n{custom_prompt}\nGive short, practical suggestions and ready-to-send messages.";

const EXECUTE_HANDLER: &str =
    "You are simulating a message handler written in informal pseudo-code. Do not explain the code. Execute it mentally against the context below and return only the text the handler would produce.\n\nHandler:\n{handler_code}\n\nContext (JSON):\n{context}";

const CAPTION_SYSTEM: &str =
    "You write social media captions for a content creator based on their selfie. Return JSON only: {\"captions\": [{\"category\": \"flirty|cute|teasing|casual|engagement\", \"caption\": \"...\"}]}. Write one caption per category.";

const CAPTION_UNCENSORED: &str =
    "Uncensored mode is on: captions may be explicit and sexually suggestive, for an adults-only audience.";

const GENERATE_MESSAGES: &str =
    "Write {count} distinct mass messages a creator could send to fans for the category \"{category}\". Each message should feel personal and invite a reply. Return JSON only: {\"messages\": [{\"text\": \"...\", \"category\": \"{category}\"}]}";

const SETTINGS_CHAT: &str =
    "You are the settings assistant for a chatter tool. The user describes changes in plain language. Current settings (JSON): {settings}\nAllowed settings: tone, fanName, modelName, prompt, uncensored (true/false).\nRespond with JSON only: {\"reply\": \"short confirmation for the user\", \"settings\": [{\"setting\": \"tone\", \"value\": \"spicy\"}]}. Use an empty settings array when nothing should change.";

fn builtin_templates() -> HashMap<String, String> {
    [
        ("reply_prefix", REPLY_PREFIX),
        ("reply_prefix_uncensored", REPLY_PREFIX_UNCENSORED),
        ("reply_instructions", REPLY_INSTRUCTIONS),
        ("chat_system", CHAT_SYSTEM),
        ("execute_handler", EXECUTE_HANDLER),
        ("caption_system", CAPTION_SYSTEM),
        ("caption_uncensored", CAPTION_UNCENSORED),
        ("generate_messages", GENERATE_MESSAGES),
        ("settings_chat", SETTINGS_CHAT),
    ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Deserialize, Debug, Clone, Default)]
struct PromptFile {
    #[serde(default)]
    templates: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct PromptConfig {
    pub templates: HashMap<String, String>,
    pub last_loaded: Option<SystemTime>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self { templates: builtin_templates(), last_loaded: None }
    }
}

impl PromptConfig {
    fn get_template(&self, key: &str) -> Result<&str, PromptError> {
        self.templates
            .get(key)
            .map(|s| s.as_str())
            .ok_or_else(|| PromptError::TemplateNotFound(key.to_string()))
    }
}

/// Parses a prompt file. Keys it leaves out keep their built-in text.
pub fn load_prompts_from_str(json: &str) -> Result<PromptConfig, PromptError> {
    let file: PromptFile = serde_json::from_str(json)?;
    let mut config = PromptConfig::default();
    config.templates.extend(file.templates);
    config.last_loaded = Some(SystemTime::now());
    Ok(config)
}

pub fn load_prompts(path: Option<&str>) -> Result<Arc<PromptConfig>, PromptError> {
    match path {
        Some(path) => {
            let file_content = fs::read_to_string(path)?;
            let config = load_prompts_from_str(&file_content)?;
            info!("Loaded {} prompt templates from {}", config.templates.len(), path);
            Ok(Arc::new(config))
        }
        None => Ok(Arc::new(PromptConfig::default())),
    }
}

pub fn reload_prompts_if_changed<P: AsRef<Path>>(
    path: P,
    current_config: &Arc<PromptConfig>
) -> Result<Option<Arc<PromptConfig>>, PromptError> {
    let metadata = fs::metadata(&path)?;
    let modified = metadata.modified().ok();
    let stale = match (modified, current_config.last_loaded) {
        (Some(modified), Some(last_loaded)) => modified > last_loaded,
        _ => true,
    };
    if !stale {
        return Ok(None);
    }
    info!("Prompts file changed, reloading...");
    let file_content = fs::read_to_string(&path)?;
    Ok(Some(Arc::new(load_prompts_from_str(&file_content)?)))
}

fn or_placeholder(value: &str) -> &str {
    if value.trim().is_empty() { "not provided" } else { value.trim() }
}

fn custom_block(custom_prompt: &str) -> String {
    if custom_prompt.trim().is_empty() {
        String::new()
    } else {
        format!("Additional instructions from the chatter: {}", custom_prompt.trim())
    }
}

/// Inputs for the reply generator, borrowed from the request.
#[derive(Debug, Default)]
pub struct ReplyPrompt<'a> {
    pub model_context: &'a str,
    pub model_name: &'a str,
    pub fan_notes: &'a str,
    pub fan_name: &'a str,
    pub screenshot_text: Option<&'a str>,
    pub has_screenshot: bool,
    pub custom_prompt: &'a str,
    pub tone: &'a str,
    pub seed: Option<&'a str>,
    pub is_uncensored: bool,
}

/// Returns `(system, user)` prompts for the reply generator.
pub fn get_reply_prompts(
    config: &PromptConfig,
    input: &ReplyPrompt<'_>
) -> Result<(String, String), PromptError> {
    let prefix = if input.is_uncensored {
        config.get_template("reply_prefix_uncensored")?
    } else {
        config.get_template("reply_prefix")?
    };
    let tone = if input.tone.trim().is_empty() { crate::models::api::DEFAULT_TONE } else { input.tone.trim() };
    let instructions = config
        .get_template("reply_instructions")?
        .replace("{model_name}", or_placeholder(input.model_name))
        .replace("{model_context}", or_placeholder(input.model_context))
        .replace("{fan_name}", or_placeholder(input.fan_name))
        .replace("{fan_notes}", or_placeholder(input.fan_notes))
        .replace("{tone}", tone)
        .replace("{custom_prompt}", &custom_block(input.custom_prompt));
    let system = format!("{}\n\n{}", prefix, instructions);

    let mut user = String::new();
    if let Some(text) = input.screenshot_text.map(str::trim).filter(|t| !t.is_empty()) {
        user.push_str("Conversation with the fan:\n");
        user.push_str(text);
        user.push('\n');
    }
    if input.has_screenshot {
        user.push_str(
            "The attached screenshot shows the conversation. Detect every fan message in it.\n"
        );
    }
    if let Some(seed) = input.seed.map(str::trim).filter(|s| !s.is_empty()) {
        user.push_str(&format!("Variation seed: {}\n", seed));
    }
    Ok((system, user.trim_end().to_string()))
}

pub fn get_chat_system_prompt(config: &PromptConfig, context: &Context) -> Result<String, PromptError> {
    let prefix = if context.is_uncensored() {
        config.get_template("reply_prefix_uncensored")?
    } else {
        config.get_template("reply_prefix")?
    };
    let body = config
        .get_template("chat_system")?
        .replace("{model_name}", or_placeholder(context.model_name()))
        .replace("{fan_name}", or_placeholder(context.fan_name()))
        .replace("{tone}", context.tone())
        .replace("{custom_prompt}", &custom_block(context.custom_prompt()));
    Ok(format!("{}\n\n{}", prefix, body))
}

pub fn get_handler_prompt(
    config: &PromptConfig,
    handler_code: &str,
    context_json: &str
) -> Result<String, PromptError> {
    Ok(
        config
            .get_template("execute_handler")?
            .replace("{handler_code}", handler_code)
            .replace("{context}", context_json)
    )
}

/// Returns `(system, user)` prompts for selfie captions.
pub fn get_caption_prompts(
    config: &PromptConfig,
    additional_context: Option<&str>,
    is_uncensored: bool
) -> Result<(String, String), PromptError> {
    let mut system = config.get_template("caption_system")?.to_string();
    if is_uncensored {
        system.push('\n');
        system.push_str(config.get_template("caption_uncensored")?);
    }
    let user = match additional_context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(extra) => format!("Write captions for this selfie. Extra context: {}", extra),
        None => "Write captions for this selfie.".to_string(),
    };
    Ok((system, user))
}

pub fn get_messages_prompt(
    config: &PromptConfig,
    category: &str,
    count: u32
) -> Result<String, PromptError> {
    Ok(
        config
            .get_template("generate_messages")?
            .replace("{count}", &count.to_string())
            .replace("{category}", category.trim())
    )
}

pub fn get_settings_chat_prompt(
    config: &PromptConfig,
    settings_json: &str
) -> Result<String, PromptError> {
    Ok(config.get_template("settings_chat")?.replace("{settings}", settings_json))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_input<'a>() -> ReplyPrompt<'a> {
        ReplyPrompt {
            model_context: "fitness model from Miami",
            model_name: "Mia",
            fan_notes: "likes gym talk",
            fan_name: "Jake",
            screenshot_text: Some("hey gorgeous"),
            tone: "spicy",
            ..Default::default()
        }
    }

    #[test]
    fn reply_prompt_includes_context_fields() {
        let config = PromptConfig::default();
        let (system, user) = get_reply_prompts(&config, &reply_input()).unwrap();
        assert!(system.starts_with(REPLY_PREFIX));
        assert!(system.contains("Fan name: Jake"));
        assert!(system.contains("Tone: spicy"));
        assert!(system.contains("likes gym talk"));
        assert!(user.contains("hey gorgeous"));
        assert!(!user.contains("Variation seed"));
    }

    #[test]
    fn uncensored_swaps_prefix() {
        let config = PromptConfig::default();
        let input = ReplyPrompt { is_uncensored: true, ..reply_input() };
        let (system, _) = get_reply_prompts(&config, &input).unwrap();
        assert!(system.starts_with(REPLY_PREFIX_UNCENSORED));
    }

    #[test]
    fn seed_is_appended() {
        let config = PromptConfig::default();
        let input = ReplyPrompt { seed: Some("k3j2"), ..reply_input() };
        let (_, user) = get_reply_prompts(&config, &input).unwrap();
        assert!(user.ends_with("Variation seed: k3j2"));
    }

    #[test]
    fn empty_fields_get_placeholders_and_default_tone() {
        let config = PromptConfig::default();
        let (system, _) = get_reply_prompts(&config, &ReplyPrompt::default()).unwrap();
        assert!(system.contains("Fan name: not provided"));
        assert!(system.contains("Tone: flirty"));
    }

    #[test]
    fn file_overrides_only_named_templates() {
        let config = load_prompts_from_str(
            r#"{"templates": {"generate_messages": "Give {count} for {category}"}}"#
        ).unwrap();
        assert_eq!(get_messages_prompt(&config, "PPV", 3).unwrap(), "Give 3 for PPV");
        assert!(get_handler_prompt(&config, "x", "{}").unwrap().contains("Handler:"));
        assert!(config.last_loaded.is_some());
    }

    #[test]
    fn missing_template_is_reported() {
        let config = PromptConfig { templates: HashMap::new(), last_loaded: None };
        match get_messages_prompt(&config, "x", 1) {
            Err(PromptError::TemplateNotFound(key)) => assert_eq!(key, "generate_messages"),
            other => panic!("expected TemplateNotFound, got {:?}", other),
        }
    }

    #[test]
    fn caption_uncensored_appends_notice() {
        let config = PromptConfig::default();
        let (plain, _) = get_caption_prompts(&config, None, false).unwrap();
        let (spicy, user) = get_caption_prompts(&config, Some("beach day"), true).unwrap();
        assert!(!plain.contains("Uncensored"));
        assert!(spicy.contains("Uncensored"));
        assert!(user.contains("beach day"));
    }
}
