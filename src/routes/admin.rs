use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Admin Router Module
///
/// Routes behind the authorization gate. `create_router` nests this router under `/api/admin` and
/// wraps it with `auth::require_admin`, so none of these handlers run unless the request carries a
/// valid, unexpired credential with an allowed role.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /api/admin/session
        // The dashboard's "am I still signed in" probe.
        .route("/session", get(handlers::get_session))
        // GET /api/admin/{collection}
        // POST /api/admin/{collection} (multipart)
        .route(
            "/{collection}",
            get(handlers::list_records).post(handlers::create_record),
        )
        // POST /api/admin/{collection}/upload
        // Older dashboard forms post here; same semantics as the route above.
        .route("/{collection}/upload", post(handlers::create_record))
        // GET | PUT | DELETE /api/admin/{collection}/{id}
        .route(
            "/{collection}/{id}",
            get(handlers::get_record)
                .put(handlers::update_record)
                .delete(handlers::delete_record),
        )
}
