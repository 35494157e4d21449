pub mod api;
pub mod api_key;
pub mod auth;
pub mod cli;
pub mod credentials;
pub mod db;
pub mod jwt;
pub mod password;
pub mod session;

use api::create_api_router;
use api_key::ApiKey;
use auth::CookieSettings;
use axum::Router;
use credentials::CredentialStore;
use db::Database;
use jwt::{JwtConfig, TokenPolicy};
use session::SessionService;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub struct ServerConfig {
    /// API root (e.g., "/api/v1"), empty to serve at the root
    pub base: String,
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens, distinct from the access secret
    pub refresh_secret: Vec<u8>,
    /// Access and refresh token lifetimes
    pub token_policy: TokenPolicy,
    /// Shared key expected in the `x-api-key` header
    pub api_key: String,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
}

impl ServerConfig {
    /// Path the refresh cookie is scoped to.
    pub fn cookie_path(&self) -> String {
        if self.base.is_empty() {
            "/".to_string()
        } else {
            self.base.clone()
        }
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::new(
        &config.access_secret,
        &config.refresh_secret,
        config.token_policy,
    ));
    let store: Arc<dyn CredentialStore> = Arc::new(config.db.users());

    let sessions = SessionService::new(store, jwt);
    let cookies = CookieSettings {
        secure: config.secure_cookies,
        path: config.cookie_path(),
    };

    let api_router = create_api_router(sessions, cookies, Arc::new(ApiKey::new(&config.api_key)));

    if config.base.is_empty() {
        api_router
    } else {
        Router::new().nest(&config.base, api_router)
    }
}

/// Run the server on the given listener until a shutdown signal arrives.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping...");
}
