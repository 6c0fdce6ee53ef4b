use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Read-only post endpoints. Every listing is restricted to published, public posts by
/// the query layer; single-post retrieval widens that only for the owner or an admin.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /posts?page&limit&status&author&tag&featured
        .route("/posts", get(handlers::list_posts))
        // GET /posts/search?q=...
        // Relevance ordered. Static segments win over `{id}` below.
        .route("/posts/search", get(handlers::search_posts))
        // GET /posts/featured?limit=...
        .route("/posts/featured", get(handlers::get_featured_posts))
        .route(
            "/posts/author/{author_id}",
            get(handlers::get_posts_by_author),
        )
        // GET /posts/{id}
        // Counts a view when the post is externally visible.
        .route("/posts/{id}", get(handlers::get_post))
}
