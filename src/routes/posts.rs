use crate::{AppState, handlers::posts};
use axum::{Router, routing::get};

/// Posts Router Module
///
/// Reads and writes share paths, so they live in one router. Reads resolve the caller
/// through `OptionalAuthUser` (drafts are only visible to administrators); writes take
/// the `AdminUser` extractor and are rejected before the body is read.
pub fn post_routes() -> Router<AppState> {
    Router::new()
        // GET /posts (public), POST /posts (admin)
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        // GET /posts/{id} (public), PUT/DELETE /posts/{id} (admin)
        .route(
            "/posts/{id}",
            get(posts::get_post)
                .put(posts::update_post)
                .delete(posts::delete_post),
        )
        // GET /posts/{id}/download (public, same visibility as GET /posts/{id})
        .route("/posts/{id}/download", get(posts::download_post_file))
}
