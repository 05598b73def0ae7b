use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "127.0.0.1:4000")]
    pub server_addr: String,

    /// Shared secret every request must carry in the `x-secret-key` header.
    #[arg(long, env = "ACCESS_SECRET_KEY")]
    pub access_secret: Option<String>,

    /// Secret checked by `validate-signup-key`. Defaults to ACCESS_SECRET_KEY if not set.
    #[arg(long, env = "SIGNUP_SECRET_KEY")]
    pub signup_secret: Option<String>,

    /// Requests per second accepted across all clients before answering 429.
    #[arg(long, env = "MAX_REQUESTS_PER_SECOND", default_value = "10")]
    pub max_requests_per_second: u32,

    // --- Primary Provider (Gemini) Args ---
    /// First Gemini API key. Keys are tried in order; blank keys are skipped.
    #[arg(long, env = "GEMINI_API_KEY")]
    pub gemini_api_key: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY_2")]
    pub gemini_api_key_2: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY_3")]
    pub gemini_api_key_3: Option<String>,

    #[arg(long, env = "GEMINI_API_KEY_4")]
    pub gemini_api_key_4: Option<String>,

    /// Base URL for the Gemini API (without the /models/... suffix)
    #[arg(long, env = "GEMINI_BASE_URL")]
    pub gemini_base_url: Option<String>,

    // --- Secondary Provider (Gateway) Args ---
    /// API key for the OpenAI-compatible gateway used once every Gemini key is exhausted.
    #[arg(long, env = "GATEWAY_API_KEY")]
    pub gateway_api_key: Option<String>,

    /// Full chat-completions URL of the gateway.
    #[arg(long, env = "GATEWAY_URL")]
    pub gateway_url: Option<String>,

    // --- General App Args ---
    /// Logical model used when a request does not name one (e.g., gemini-flash, gemini-pro)
    #[arg(long, env = "DEFAULT_MODEL", default_value = "gemini-flash")]
    pub default_model: String,

    /// Timeout in seconds for each provider call. 0 keeps the HTTP client default.
    #[arg(long, env = "PROVIDER_TIMEOUT_SECS", default_value = "120")]
    pub provider_timeout_secs: u64,

    /// Optional JSON file overriding the built-in prompt templates.
    #[arg(long, env = "PROMPTS_PATH")]
    pub prompts_path: Option<String>,

    // --- Session Args ---
    /// Idle time in seconds before a session is discarded. 0 disables expiry.
    #[arg(long, env = "SESSION_TTL_SECS", default_value = "3600")]
    pub session_ttl_secs: u64,

    /// Number of conversation turns kept per session.
    #[arg(long, env = "MAX_HISTORY_TURNS", default_value = "40")]
    pub max_history_turns: usize,

    // --- TLS Args ---
    /// Optional path to the TLS certificate file (PEM format) for enabling HTTPS. Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format) for enabling HTTPS. Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    /// Configured Gemini keys in order, with blank entries dropped.
    pub fn gemini_keys(&self) -> Vec<String> {
        [
            &self.gemini_api_key,
            &self.gemini_api_key_2,
            &self.gemini_api_key_3,
            &self.gemini_api_key_4,
        ]
            .into_iter()
            .filter_map(|k| k.as_deref())
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn gateway_key(&self) -> Option<String> {
        self.gateway_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
    }

    pub fn signup_secret(&self) -> Option<String> {
        self.signup_secret
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.access_secret.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_gemini_keys_are_dropped_in_order() {
        let args = Args::parse_from([
            "chatter-assist",
            "--gemini-api-key",
            "k1",
            "--gemini-api-key-2",
            "  ",
            "--gemini-api-key-4",
            "k4",
        ]);
        assert_eq!(args.gemini_keys(), vec!["k1".to_string(), "k4".to_string()]);
    }

    #[test]
    fn signup_secret_falls_back_to_access_secret() {
        let args = Args::parse_from(["chatter-assist", "--access-secret", "shared"]);
        assert_eq!(args.signup_secret().as_deref(), Some("shared"));

        let args = Args::parse_from([
            "chatter-assist",
            "--access-secret",
            "shared",
            "--signup-secret",
            "signup",
        ]);
        assert_eq!(args.signup_secret().as_deref(), Some("signup"));
    }
}
