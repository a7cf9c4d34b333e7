use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRef, Request, State},
    http::{HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    middleware::{self, Next},
    response::Response,
    routing::get,
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

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod media;
pub mod models;
pub mod password;
pub mod repository;
pub mod upload;

// Routing segregated by access level (public, authenticated, admin, posts).
pub mod routes;
use auth::{AdminUser, AuthUser};
use config::Env;
use error::ErrorBody;
use routes::{admin, authenticated, posts, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use media::{MediaState, MockMediaHost, S3MediaHost};
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for every handler annotated with `#[utoipa::path]` and every
/// schema deriving `ToSchema`. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::signup, handlers::auth::login, handlers::auth::me,
        handlers::users::list_users, handlers::users::get_user, handlers::users::create_user,
        handlers::users::update_user, handlers::users::delete_user,
        handlers::users::download_user_file,
        handlers::posts::list_posts, handlers::posts::get_post, handlers::posts::create_post,
        handlers::posts::update_post, handlers::posts::delete_post,
        handlers::posts::download_post_file,
    ),
    components(
        schemas(
            models::Role, models::CreateAccountRequest, models::UpdateAccountRequest,
            models::LoginRequest, models::CreatePostRequest, models::UpdatePostRequest,
            models::AttachmentInfo, models::AccountView, models::PostView,
            models::AuthResponse, models::AccountResponse, models::PostResponse,
            models::MessageResponse, error::ErrorBody,
        )
    ),
    tags(
        (name = "roster-portal", description = "Multi-tenant account and content management API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, immutable container of application services, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    /// Persistence for accounts and posts.
    pub repo: RepositoryState,
    /// The external media host holding attachments.
    pub media: MediaState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// Lets extractors pull individual services out of the shared AppState.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for MediaState {
    fn from_ref(app_state: &AppState) -> MediaState {
        app_state.media.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Route layer for the authenticated group. Extracting `AuthUser` rejects the request
/// with 401 before the handler runs; on success the identity is stored in the request
/// extensions and reused by the handler's own extractor.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// admin_middleware
///
/// Route layer for account management: 401 without a valid token, 403 for
/// non-administrators.
async fn admin_middleware(_admin: AdminUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// security_headers
///
/// Hardening headers on every response. HSTS is only sent in production, where the
/// service sits behind TLS.
async fn security_headers(State(env): State<Env>, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    if env == Env::Production {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }

    response
}

/// Fallback for unmatched routes, answered in the same JSON shape as every other error.
async fn not_found(method: Method, uri: Uri) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: format!("Cannot {} {}", method, uri.path()),
            details: None,
        }),
    )
}

/// Known path, unsupported method. Answered as JSON like every other error.
async fn method_not_allowed(method: Method, uri: Uri) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorBody {
            error: format!("Cannot {} {}", method, uri.path()),
            details: None,
        }),
    )
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware, and registers
/// the application state. Every API route lives under `/api`.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. API Router Assembly
    let api_router = Router::new()
        // Public Routes: signup and login.
        .merge(public::public_routes())
        // Authenticated Routes: any valid token.
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // Admin Routes: account management, administrators only.
        .merge(
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            )),
        )
        // Post Routes: public reads, admin writes (checked per handler by `AdminUser`).
        .merge(posts::post_routes());

    let env = state.config.env;

    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        .nest("/api", api_router)
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        // Attachments up to the upload limit plus room for form fields.
        .layer(DefaultBodyLimit::max(upload::BODY_LIMIT_BYTES))
        .with_state(state);

    // 3. Observability and Correlation Layers (Applied outermost/first)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation: a UUID for every incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing: one span per request, tagged with the request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation: echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(middleware::from_fn_with_state(env, security_headers))
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span for `TraceLayer`, carrying method, URI, and the
/// `x-request-id` so every log line of one request can be correlated.
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
