use crate::{AppState, handlers::auth};
use axum::{Router, routing::get};

/// Authenticated Router Module
///
/// Routes available to any account holding a valid token, whatever its role.
/// The `auth_middleware` layer in `create_router` rejects the request before the
/// handler runs when the token is missing, invalid, expired, or names a deleted account.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /auth/me
        // Session restore for the frontend.
        .route("/auth/me", get(auth::me))
}
