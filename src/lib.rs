pub mod agent;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod response;
pub mod server;
pub mod session;
pub mod settings;

use agent::AIAgent;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Access Secret: {}", if args.access_secret.is_some() { "configured" } else { "missing" });
    info!("Gemini Keys: {}", args.gemini_keys().len());
    info!("Gemini Base URL: {}", args.gemini_base_url.as_deref().unwrap_or("adapter default"));
    info!("Gateway: {}", if args.gateway_key().is_some() { "configured" } else { "disabled" });
    info!("Gateway URL: {}", args.gateway_url.as_deref().unwrap_or("adapter default"));
    info!("Default Model: {}", args.default_model);
    info!("Provider Timeout: {}s", args.provider_timeout_secs);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("Max Requests/s: {}", args.max_requests_per_second);
    info!("Session TTL: {}s", args.session_ttl_secs);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("-------------------------");

    let agent = Arc::new(AIAgent::new(&args)?);
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, agent, args);
    server.run().await?;

    Ok(())
}
