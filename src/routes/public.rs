use crate::{AppState, handlers::auth};
use axum::{Router, routing::post};

/// Public Router Module
///
/// Endpoints reachable without a bearer token. Signup always creates a new tenant
/// administrator; there is no anonymous path to a subordinate account.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // POST /auth/signup
        // Multipart or JSON. Returns 201 with a token for the new administrator.
        .route("/auth/signup", post(auth::signup))
        // POST /auth/login
        // JSON only. Unknown email and wrong password share one response.
        .route("/auth/login", post(auth::login))
}
