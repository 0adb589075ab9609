//! # Server Configuration
//!
//! Application state, router wiring, and server startup for the coach portal.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::auth::{HttpSessionGateway, SessionGateway};
use crate::config::AppConfig;
use crate::handlers;
use crate::providers::{GoogleProvider, SquareProvider, StripeProvider};
use crate::repositories::{ClientRepository, OAuthStateRepository};
use crate::telemetry::{self, TraceContext};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub http: reqwest::Client,
    pub sessions: Arc<dyn SessionGateway>,
}

impl AppState {
    pub fn client_repo(&self) -> ClientRepository {
        ClientRepository::new(Arc::new(self.db.clone()))
    }

    pub fn state_repo(&self) -> OAuthStateRepository {
        OAuthStateRepository::new(Arc::new(self.db.clone()))
    }

    /// Google client, when credentials are configured
    pub fn google(&self) -> Option<GoogleProvider> {
        Some(GoogleProvider::new(
            self.http.clone(),
            self.config.google_client_id.clone()?,
            self.config.google_client_secret.clone()?,
            self.config.google_auth_base.clone(),
            self.config.google_token_base.clone(),
            self.config.google_api_base.clone(),
        ))
    }

    /// Square client, when credentials are configured
    pub fn square(&self) -> Option<SquareProvider> {
        Some(SquareProvider::new(
            self.http.clone(),
            self.config.square_app_id.clone()?,
            self.config.square_app_secret.clone()?,
            self.config.square_base.clone(),
        ))
    }

    /// Stripe client, when credentials are configured
    pub fn stripe(&self) -> Option<StripeProvider> {
        Some(StripeProvider::new(
            self.http.clone(),
            self.config.stripe_secret_key.clone()?,
            self.config.stripe_api_base.clone(),
        ))
    }
}

/// Attach a per-request trace id so errors can be correlated with logs.
async fn trace_context_middleware(request: Request, next: Next) -> Response {
    let trace_id = format!("req-{}", &Uuid::new_v4().to_string()[..8]);
    telemetry::with_trace_context(TraceContext { trace_id }, next.run(request)).await
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/whoami", get(handlers::session::whoami))
        .route("/auth/callback", get(handlers::session::auth_callback))
        .route("/connect/google/start", get(handlers::connect::google_start))
        .route(
            "/connect/google/callback",
            get(handlers::connect::google_callback),
        )
        .route("/connect/square/start", get(handlers::connect::square_start))
        .route(
            "/connect/square/callback",
            get(handlers::connect::square_callback),
        )
        .route("/connect/stripe/start", get(handlers::connect::stripe_start))
        .route(
            "/connect/stripe/callback",
            get(handlers::connect::stripe_callback),
        )
        .route("/webhooks/square", post(handlers::webhooks::square_webhook))
        .route("/api/settings", put(handlers::settings::update_settings))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let http = reqwest::Client::new();
    let sessions: Arc<dyn SessionGateway> = Arc::new(HttpSessionGateway::new(
        http.clone(),
        config.identity_base_url.clone(),
        config.identity_api_key.clone(),
    ));

    let state = AppState {
        config: Arc::clone(&config),
        db,
        http,
        sessions,
    };
    let app = create_app(state);

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::session::whoami,
        crate::handlers::settings::update_settings,
        crate::handlers::webhooks::square_webhook,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::session::WhoamiResponse,
            crate::handlers::settings::SettingsRequest,
            crate::handlers::settings::SettingsResponse,
            crate::handlers::webhooks::WebhookAck,
            crate::error::ApiError,
        )
    ),
    info(
        title = "Coach Portal API",
        description = "Provider connections and webhook relay for the coach portal",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
