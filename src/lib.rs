pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod clock;
pub mod db;
pub mod jwt;
pub mod password;
pub mod session;

use api::create_api_router;
use axum::Router;
use clock::{Clock, SystemClock};
use db::Database;
use jsonwebtoken::Algorithm;
use jwt::{DEFAULT_ACCESS_TOKEN_TTL_MINUTES, JwtService, JwtSettings};
use session::{RefreshSessionService, RefreshSessionSettings};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Prefix for every API route.
pub const API_PREFIX: &str = "/v1";

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Shared secret for signing access tokens
    pub jwt_secret: Vec<u8>,
    /// HMAC algorithm for access tokens
    pub jwt_algorithm: Algorithm,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
    /// Random bytes per refresh token
    pub refresh_token_nbytes: usize,
    /// Trusted reverse proxies in front of the server (0 = use the socket peer)
    pub num_proxies: usize,
    /// Time source for token and session expiry
    pub clock: Arc<dyn Clock>,
}

impl ServerConfig {
    /// Configuration with default lifetimes and the system clock.
    pub fn new(db: Database, jwt_secret: Vec<u8>) -> Self {
        let sessions = RefreshSessionSettings::default();
        Self {
            db,
            jwt_secret,
            jwt_algorithm: Algorithm::HS256,
            access_token_ttl: chrono::Duration::minutes(DEFAULT_ACCESS_TOKEN_TTL_MINUTES),
            refresh_token_ttl: sessions.refresh_token_ttl,
            refresh_token_nbytes: sessions.refresh_token_nbytes,
            num_proxies: 0,
            clock: Arc::new(SystemClock),
        }
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtService::new(
        &JwtSettings {
            secret: config.jwt_secret.clone(),
            algorithm: config.jwt_algorithm,
            access_token_ttl: config.access_token_ttl,
        },
        config.clock.clone(),
    ));

    let sessions = RefreshSessionService::new(
        config.db.clone(),
        jwt.clone(),
        config.clock.clone(),
        RefreshSessionSettings {
            refresh_token_nbytes: config.refresh_token_nbytes,
            refresh_token_ttl: config.refresh_token_ttl,
        },
    );

    let api_router = create_api_router(config.db.clone(), jwt, sessions, config.num_proxies);

    Router::new().nest(API_PREFIX, api_router)
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    // Run cleanup tasks on startup
    init_cleanup(&config.db).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        run_server(config, listener).await.ok();
    });

    Ok((handle, local_addr))
}
