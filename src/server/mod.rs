pub mod api;

use crate::agent::AIAgent;
use crate::auth::SecretValidator;
use crate::cli::Args;
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use log::{ info, warn };

pub use api::{ router, AppState };

pub struct Server {
    addr: String,
    agent: Arc<AIAgent>,
    args: Args,
}

impl Server {
    pub fn new(addr: String, agent: Arc<AIAgent>, args: Args) -> Self {
        Self { addr, agent, args }
    }

    fn state(&self) -> AppState {
        let access = SecretValidator::new(self.args.access_secret.clone());
        if access.is_configured() {
            info!("Server configured with shared secret authentication.");
        } else {
            warn!("ACCESS_SECRET_KEY is not set. Every protected request will be rejected.");
        }
        let signup = SecretValidator::new(self.args.signup_secret());
        AppState::new(Arc::clone(&self.agent), access, signup, self.args.max_requests_per_second)
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let addr = self.addr.parse::<SocketAddr>()?;
        let app = router(self.state());

        if self.args.enable_tls {
            let (cert_path, key_path) = match (&self.args.tls_cert_path, &self.args.tls_key_path) {
                (Some(cert), Some(key)) => (cert, key),
                _ => {
                    return Err("Both --tls-cert-path and --tls-key-path must be provided to enable TLS.".into());
                }
            };
            info!(
                "TLS enabled. Loading certificate from '{}' and key from '{}'",
                cert_path,
                key_path
            );
            let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                cert_path,
                key_path
            ).await?;
            info!("HTTPS server listening on: https://{}", addr);
            axum_server::bind_rustls(addr, tls_config)
                .serve(app.into_make_service()).await?;
        } else {
            let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
                format!("Failed to bind HTTP server to {}: {}. Try a different port.", addr, e)
            })?;
            info!("HTTP server listening on: http://{}", addr);
            axum::serve(listener, app.into_make_service()).await?;
        }

        Ok(())
    }
}
