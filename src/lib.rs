use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    http::HeaderName,
    middleware,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Server side: gate, generic collection handlers, persistence and the media host.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod storage;

// Public and admin route sets.
pub mod routes;
use routes::{admin, public};

// Client side: token store, gateway client and session/view resolution.
pub mod client;

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::ApiError;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// ApiDoc
///
/// OpenAPI document for every handler, served at `/api-docs/openapi.json` and rendered by the
/// Swagger UI at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::get_session, handlers::list_records,
        handlers::list_past_events_by_club, handlers::get_record, handlers::create_record,
        handlers::update_record, handlers::delete_record
    ),
    // Record implements its schema by hand, so it is registered explicitly.
    components(
        schemas(
            models::Record, models::RecordList, models::RecordEnvelope, models::ErrorBody,
            models::LoginRequest, models::LoginResponse, auth::Principal,
        )
    ),
    tags(
        (name = "iete-portal", description = "Content API for the public site and the admin dashboard")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single shared container for the persistence layer, the media host and the configuration.
/// Cloned into every request; nothing inside it is mutated after startup.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub storage: StorageState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles both route sets, applies the gate to the admin set only, and wraps everything in the
/// observability layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Public Routes: the gate is never consulted.
        .merge(public::public_routes())
        // Admin Routes: `route_layer` runs the gate only for matched admin routes, so unknown
        // paths still fall through to a plain 404.
        .nest(
            "/api/admin",
            admin::admin_routes()
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth::require_admin,
                ))
                .layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
        )
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one HTTP request, tagged with its `x-request-id` so every log line of the request can
/// be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
