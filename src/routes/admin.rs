use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Account oversight. Mounted behind the authentication layer; each handler then checks
/// `role == admin` and answers 403 otherwise.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /users
        // Active accounts only, newest first.
        .route("/users", get(handlers::get_users))
        // GET /users/search?q=...
        .route("/users/search", get(handlers::search_users))
}
