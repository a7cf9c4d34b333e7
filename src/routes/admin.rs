use crate::{AppState, handlers::users};
use axum::{Router, routing::get};

/// Admin Router Module
///
/// Account management for administrators. Wrapped in `admin_middleware`, which rejects
/// anonymous callers with 401 and non-administrators with 403.
///
/// Every handler additionally scopes its query by `owner_id = caller`, so an
/// administrator never sees or touches another tenant's accounts; those answer 404.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /users, POST /users
        // List owned accounts (newest first) or create a subordinate `user` account.
        .route("/users", get(users::list_users).post(users::create_user))
        // GET/PUT/DELETE /users/{id}
        // Deleting the caller itself is refused.
        .route(
            "/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        // GET /users/{id}/download
        // Streams the account attachment through the server.
        .route("/users/{id}/download", get(users::download_user_file))
}
