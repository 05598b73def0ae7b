use serde_json::Value;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;
use log::{ info, warn };

use crate::cli::Args;
use crate::config::prompt::{ self, PromptConfig, PromptError, ReplyPrompt };
use crate::error::AppError;
use crate::llm::chat::{ new_provider, ChatProvider, ChatRequest };
use crate::llm::fallback::FallbackChain;
use crate::llm::{ LlmConfig, LlmType };
use crate::models::api::*;
use crate::models::chat::{ ChatMessage, ConversationTurn, InlineImage, Role };
use crate::response::{ self, ReplyResult };
use crate::session::{ initialize_session_store, Session, SessionStore };
use crate::settings::{ self, SessionSettings };

const DEFAULT_MESSAGE_COUNT: u32 = 5;
const MAX_MESSAGE_COUNT: u32 = 20;
const DEFAULT_INSTRUCTIONS_KEY: &str = "default";

/// Runs each edge-function operation: prompt → fallback chain → shape.
pub struct AIAgent {
    chain: FallbackChain,
    prompt_config: RwLock<Arc<PromptConfig>>,
    prompts_path: Option<String>,
    sessions: Arc<dyn SessionStore>,
    default_model: String,
}

impl AIAgent {
    fn initialize_llm_clients(
        args: &Args
    ) -> Result<FallbackChain, Box<dyn Error + Send + Sync>> {
        let mut primaries: Vec<Arc<dyn ChatProvider>> = Vec::new();
        for key in args.gemini_keys() {
            let config = LlmConfig {
                llm_type: LlmType::Gemini,
                api_key: Some(key),
                base_url: args.gemini_base_url.clone(),
                timeout_secs: args.provider_timeout_secs,
            };
            primaries.push(new_provider(&config)?);
        }

        let secondary = match args.gateway_key() {
            Some(key) => {
                let config = LlmConfig {
                    llm_type: LlmType::Gateway,
                    api_key: Some(key),
                    base_url: args.gateway_url.clone(),
                    timeout_secs: args.provider_timeout_secs,
                };
                Some(new_provider(&config)?)
            }
            None => None,
        };

        info!(
            "Provider chain configured: {} Gemini key(s), gateway {}",
            primaries.len(),
            if secondary.is_some() { "enabled" } else { "disabled" }
        );
        if primaries.is_empty() && secondary.is_none() {
            warn!("No provider credentials configured; AI endpoints will answer 500.");
        }

        Ok(FallbackChain::from_parts(primaries, secondary))
    }

    pub fn new(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let chain = Self::initialize_llm_clients(args)?;
        let prompt_config = prompt::load_prompts(args.prompts_path.as_deref())?;
        let sessions = initialize_session_store(args);
        Ok(Self::with_parts(chain, prompt_config, sessions, args.default_model.clone())
            .prompts_path(args.prompts_path.clone()))
    }

    pub fn with_parts(
        chain: FallbackChain,
        prompt_config: Arc<PromptConfig>,
        sessions: Arc<dyn SessionStore>,
        default_model: String
    ) -> Self {
        Self {
            chain,
            prompt_config: RwLock::new(prompt_config),
            prompts_path: None,
            sessions,
            default_model,
        }
    }

    fn prompts_path(mut self, path: Option<String>) -> Self {
        self.prompts_path = path;
        self
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    async fn prompts(&self) -> Arc<PromptConfig> {
        Arc::clone(&*self.prompt_config.read().await)
    }

    fn model_for(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_model)
            .to_string()
    }

    async fn session_for(&self, session_id: Option<&str>) -> Result<Option<Session>, AppError> {
        match session_id {
            Some(id) =>
                self.sessions
                    .get(id).await
                    .map(Some)
                    .ok_or_else(|| AppError::BadRequest(format!("Unknown session '{}'", id))),
            None => Ok(None),
        }
    }

    /// Reloads templates from the configured file. `Ok(false)` means nothing changed.
    pub async fn reload_prompts_if_changed(&self) -> Result<bool, PromptError> {
        let Some(path) = self.prompts_path.as_deref() else {
            return Ok(false);
        };
        let current = self.prompts().await;
        match prompt::reload_prompts_if_changed(path, &current)? {
            Some(new_config) => {
                *self.prompt_config.write().await = new_config;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn chat(&self, req: AiChatRequest) -> Result<String, AppError> {
        let message = req.message.trim();
        if message.is_empty() {
            return Err(AppError::BadRequest("message is required".into()));
        }
        let session = self.session_for(req.session_id.as_deref()).await?;
        let (context, history) = match &session {
            Some(s) => {
                let history = if req.history.is_empty() { s.turns.clone() } else { req.history };
                (req.context.with_fallback(&s.settings), history)
            }
            None => (req.context, req.history),
        };

        let prompts = self.prompts().await;
        let system = prompt::get_chat_system_prompt(&prompts, &context)?;
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(message));

        let request = ChatRequest::new(self.model_for(req.model.as_deref()), messages);
        let reply = self.chain.complete(&request).await?;

        if let Some(s) = session {
            self.sessions.append_turns(&s.id, vec![
                ConversationTurn { role: Role::User, content: message.to_string() },
                ConversationTurn { role: Role::Assistant, content: reply.clone() }
            ]).await;
        }
        Ok(reply)
    }

    pub async fn execute_handler(&self, req: ExecuteHandlerRequest) -> Result<String, AppError> {
        if req.handler_code.trim().is_empty() {
            return Err(AppError::BadRequest("handlerCode is required".into()));
        }
        let context_json = match &req.context {
            Value::Null => "{}".to_string(),
            other => serde_json::to_string_pretty(other).map_err(|e| AppError::unknown(e.to_string()))?,
        };
        let prompts = self.prompts().await;
        let prompt = prompt::get_handler_prompt(&prompts, &req.handler_code, &context_json)?;
        let request = ChatRequest::new(self.model_for(req.model.as_deref()), vec![
            ChatMessage::user(prompt)
        ]);
        let output = self.chain.complete(&request).await?;
        Ok(response::strip_fences(&output))
    }

    pub async fn generate_captions(&self, req: GenerateCaptionRequest) -> Result<Vec<Caption>, AppError> {
        let image = InlineImage::from_data_url(&req.selfie_image).map_err(AppError::BadRequest)?;
        let prompts = self.prompts().await;
        let (system, user) = prompt::get_caption_prompts(
            &prompts,
            req.additional_context.as_deref(),
            req.is_uncensored
        )?;
        let request = ChatRequest::new(self.model_for(req.model.as_deref()), vec![
            ChatMessage::system(system),
            ChatMessage::user(user).with_image(image)
        ]);
        let output = self.chain.complete(&request).await?;
        Ok(response::normalize_captions(&output))
    }

    pub async fn generate_messages(
        &self,
        req: GenerateMessagesRequest
    ) -> Result<Vec<GeneratedMessage>, AppError> {
        let category = req.category.trim();
        if category.is_empty() {
            return Err(AppError::BadRequest("category is required".into()));
        }
        let count = req.count.unwrap_or(DEFAULT_MESSAGE_COUNT).clamp(1, MAX_MESSAGE_COUNT);
        let prompts = self.prompts().await;
        let prompt = prompt::get_messages_prompt(&prompts, category, count)?;
        let request = ChatRequest::new(self.model_for(req.model.as_deref()), vec![
            ChatMessage::user(prompt)
        ]).temperature(0.9);
        let output = self.chain.complete(&request).await?;
        Ok(response::normalize_messages(&output, category, count as usize))
    }

    pub async fn generate_reply(&self, req: GenerateReplyRequest) -> Result<ReplyResult, AppError> {
        let session = self.session_for(req.session_id.as_deref()).await?;
        let req = match &session {
            Some(s) => req.with_fallback(&s.settings),
            None => req,
        };

        let screenshot_text = req.screenshot_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty());
        let image = match req.screenshot_image.as_deref().map(str::trim).filter(|i| !i.is_empty()) {
            Some(url) => Some(InlineImage::from_data_url(url).map_err(AppError::BadRequest)?),
            None => None,
        };
        if screenshot_text.is_none() && image.is_none() {
            return Err(
                AppError::BadRequest("screenshotText or screenshotImage is required".into())
            );
        }

        let instructions_key = req.model_name
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_INSTRUCTIONS_KEY)
            .to_string();
        let mut model_context = req.model_context.trim().to_string();
        if let Some(s) = &session {
            if model_context.is_empty() {
                model_context = s.instructions.get(&instructions_key).cloned().unwrap_or_default();
            } else {
                self.sessions.remember_instructions(&s.id, &instructions_key, &model_context).await;
            }
        }

        let input = ReplyPrompt {
            model_context: &model_context,
            model_name: req.model_name.as_deref().unwrap_or(""),
            fan_notes: &req.fan_notes,
            fan_name: &req.fan_name,
            screenshot_text,
            has_screenshot: image.is_some(),
            custom_prompt: req.custom_prompt.as_deref().unwrap_or(""),
            tone: &req.tone,
            seed: req.seed.as_deref(),
            is_uncensored: req.is_uncensored.unwrap_or(false),
        };
        let prompts = self.prompts().await;
        let (system, user) = prompt::get_reply_prompts(&prompts, &input)?;

        let mut user_message = ChatMessage::user(user);
        if let Some(image) = image {
            user_message = user_message.with_image(image);
        }
        let mut request = ChatRequest::new(self.model_for(req.model.as_deref()), vec![
            ChatMessage::system(system),
            user_message
        ]);
        if req.seed.is_some() {
            request = request.temperature(1.0);
        }

        let output = self.chain.complete(&request).await?;
        Ok(response::normalize_reply(&output))
    }

    pub async fn settings_chat(&self, req: SettingsChatRequest) -> Result<SettingsChatResponse, AppError> {
        let message = req.message.trim();
        if message.is_empty() {
            return Err(AppError::BadRequest("message is required".into()));
        }
        let session = self.session_for(req.session_id.as_deref()).await?;
        let current = session
            .as_ref()
            .map(|s| s.settings.clone())
            .unwrap_or_default();
        let settings_json = serde_json::to_string(&current).map_err(|e| AppError::unknown(e.to_string()))?;

        let prompts = self.prompts().await;
        let system = prompt::get_settings_chat_prompt(&prompts, &settings_json)?;
        let mut messages = vec![ChatMessage::system(system)];
        messages.extend(req.history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(message));
        let request = ChatRequest::new(self.model_for(req.model.as_deref()), messages);
        let output = self.chain.complete(&request).await?;

        let (applied, reply_text) = match response::extract_json(&output) {
            Some(Value::Object(obj)) => {
                let mut applied = obj
                    .get("settings")
                    .map(settings::parse_structured)
                    .unwrap_or_default();
                let reply = obj
                    .get("reply")
                    .or_else(|| obj.get("response"))
                    .and_then(Value::as_str);
                let reply_text = match reply {
                    Some(reply) if settings::contains_tokens(reply) => {
                        let (tokens, visible) = settings::parse_tokens(reply);
                        applied.extend(tokens);
                        visible
                    }
                    Some(reply) => reply.trim().to_string(),
                    None => response::strip_fences(&output),
                };
                (applied, reply_text)
            }
            _ => {
                let (applied, visible) = settings::parse_tokens(&output);
                (applied, response::strip_fences(&visible))
            }
        };

        let settings = match &session {
            Some(s) =>
                self.sessions
                    .update_settings(&s.id, &applied).await
                    .unwrap_or_else(|| {
                        let mut settings = current.clone();
                        settings.apply_all(&applied);
                        settings
                    }),
            None => {
                let mut settings = SessionSettings::default();
                settings.apply_all(&applied);
                settings
            }
        };
        info!("Settings chat applied {} command(s)", applied.len());

        Ok(SettingsChatResponse { response: reply_text, settings, applied })
    }
}
