use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Endpoints that need a resolved principal. The route layer rejects the request with 401
/// before any handler runs; owner-or-admin checks are made per handler.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /posts
        .route("/posts", post(handlers::create_post))
        // PUT/DELETE /posts/{id}
        // Merged with the public GET on the same path.
        .route(
            "/posts/{id}",
            put(handlers::update_post).delete(handlers::delete_post),
        )
        // POST /posts/{id}/like
        // Toggle: a second call from the same user removes the like.
        .route("/posts/{id}/like", post(handlers::toggle_like))
        // GET/PUT/DELETE /users/{id}
        // DELETE is admin-only and guarded against self-deactivation in the handler.
        .route(
            "/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
}
