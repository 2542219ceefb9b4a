use crate::{
    AppState, handlers,
    models::{Collection, RecordFilter},
};
use axum::{
    Router,
    extract::State,
    routing::{MethodRouter, get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a credential: health checks, login, and read-only access to every
/// collection. These routes never pass through the authorization gate.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        .route("/", get(|| async { "IETE server is running" }))
        // POST /api/auth/login
        // Exchanges username/password for a signed credential.
        .route("/api/auth/login", post(handlers::login))
        // Aliases kept for the public site's existing fetches.
        .route("/api/getpast", fixed_list(Collection::PastEvents))
        .route(
            "/api/getpast/club/{club}",
            get(handlers::list_past_events_by_club),
        )
        .route("/api/getupcomming", fixed_list(Collection::UpcomingEvents))
        .route("/api/getgov", fixed_list(Collection::GoverningTeam))
        .route("/api/get", fixed_list(Collection::Magazines))
        .route(
            "/api/our-team-journey/image",
            fixed_list(Collection::JourneyPhotos),
        )
        // GET /api/{collection}?field=value
        // Lists a collection, optionally filtered on declared fields.
        .route("/api/{collection}", get(handlers::list_records))
        // GET /api/{collection}/{id}
        .route("/api/{collection}/{id}", get(handlers::get_record))
}

/// GET route bound to one collection, unfiltered.
fn fixed_list(collection: Collection) -> MethodRouter<AppState> {
    get(move |State(state): State<AppState>| async move {
        handlers::list_collection(&state, collection, RecordFilter::default()).await
    })
}
