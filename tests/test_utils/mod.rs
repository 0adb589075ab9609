//! Test utilities shared by the integration suites.
//!
//! Provides an in-memory SQLite database with migrations applied, a static
//! in-test session gateway, and a helper that spawns the full app on a
//! random port with graceful shutdown.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use coach_portal::auth::{GatewayError, SessionGateway, SessionToken, SessionUser};
use coach_portal::config::AppConfig;
use coach_portal::server::{AppState, create_app};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use uuid::Uuid;

/// Session token the static gateway accepts.
pub const TEST_SESSION_TOKEN: &str = "test-session-token";

/// Auth code the static gateway exchanges successfully.
#[allow(dead_code)]
pub const TEST_AUTH_CODE: &str = "test-auth-code";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// In-test session gateway: a fixed token-to-user table plus one valid auth
/// code. Keeps the identity provider out of these tests entirely.
pub struct StaticSessions {
    users: HashMap<String, SessionUser>,
}

impl StaticSessions {
    #[allow(dead_code)]
    pub fn with_user(user: SessionUser) -> Self {
        let mut users = HashMap::new();
        users.insert(TEST_SESSION_TOKEN.to_string(), user);
        Self { users }
    }

    #[allow(dead_code)]
    pub fn empty() -> Self {
        Self {
            users: HashMap::new(),
        }
    }
}

#[async_trait]
impl SessionGateway for StaticSessions {
    async fn resolve_user(
        &self,
        session_token: &str,
    ) -> Result<Option<SessionUser>, GatewayError> {
        Ok(self.users.get(session_token).cloned())
    }

    async fn exchange_code(&self, code: &str) -> Result<SessionToken, GatewayError> {
        if code == TEST_AUTH_CODE {
            Ok(SessionToken {
                access_token: TEST_SESSION_TOKEN.to_string(),
                expires_in: Some(3600),
            })
        } else {
            Err(GatewayError::Upstream {
                status: 400,
                body: "invalid code".to_string(),
            })
        }
    }
}

/// A fixed test user.
pub fn test_user() -> SessionUser {
    SessionUser {
        id: Uuid::parse_str("6fa5b7a0-93f4-4c14-9b7e-31f2d0a3b7f1").unwrap(),
        email: Some("coach@example.com".to_string()),
    }
}

/// Base configuration for integration tests. Provider bases are expected to
/// be overridden with a mock server URL where a test exercises that provider.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.profile = "test".to_string();
    config.site_url = "https://portal.example.com".to_string();
    config.google_client_id = Some("google-client-id".to_string());
    config.google_client_secret = Some("google-client-secret".to_string());
    config.square_app_id = Some("square-app-id".to_string());
    config.square_app_secret = Some("square-app-secret".to_string());
    config.square_webhook_signature_key = Some("test-signature-key".to_string());
    config.stripe_secret_key = Some("sk_test_123".to_string());
    config
}

pub struct TestServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl TestServerHandle {
    fn new(shutdown_tx: oneshot::Sender<()>, join_handle: JoinHandle<Result<()>>) -> Self {
        Self {
            shutdown_tx: Some(shutdown_tx),
            join_handle: Some(join_handle),
        }
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.join_handle.take() {
            handle.await.context("server task join failed")??;
        }

        Ok(())
    }
}

/// Spawns the app on a random port with an in-memory database.
pub async fn spawn_app(
    config: AppConfig,
    sessions: Arc<dyn SessionGateway>,
) -> (String, Arc<DatabaseConnection>, TestServerHandle) {
    let db = Arc::new(setup_test_db().await.unwrap());

    let state = AppState {
        config: Arc::new(config),
        db: db.as_ref().clone(),
        http: reqwest::Client::new(),
        sessions,
    };

    let app = create_app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_url = format!("http://{}", addr);

    let (ready_tx, ready_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let server_task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let _ = ready_tx.send(());

        server.await.context("axum server error")
    });

    ready_rx.await.expect("server task to signal readiness");

    (server_url, db, TestServerHandle::new(shutdown_tx, server_task))
}

/// HTTP client that never follows redirects, so Location headers can be
/// asserted directly.
#[allow(dead_code)]
pub fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Cookie header value for an authenticated request.
#[allow(dead_code)]
pub fn session_cookie() -> String {
    format!("portal_session={}", TEST_SESSION_TOKEN)
}
