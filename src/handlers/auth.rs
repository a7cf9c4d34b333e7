use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthUser, issue_token},
    error::{ApiError, ApiResult, ErrorBody},
    handlers::{discard_on_failure, store_upload},
    media::MediaFolder,
    models::{
        AccountView, AuthResponse, CreateAccountRequest, LoginRequest, NewAccount, Role,
        normalize_email,
    },
    password::PasswordHash,
    repository::RepositoryError,
    upload::UploadForm,
};

/// signup
///
/// [Public Route] Registers a new tenant root: the account is an administrator that
/// owns itself. An optional `file` part is uploaded to the `users` folder before the
/// account is persisted.
#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body(content = CreateAccountRequest, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid input, duplicate email, or rejected file", body = ErrorBody)
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    mut form: UploadForm,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let req = CreateAccountRequest::from_form(&form);
    req.validate()?;

    if state.repo.email_exists(&req.email).await? {
        return Err(ApiError::Validation("User already exists".to_string()));
    }

    let password = PasswordHash::new(&req.password)?;
    let file = store_upload(state.media.as_ref(), MediaFolder::Users, form.take_file()).await?;

    let id = Uuid::new_v4();
    let new_account = NewAccount {
        id,
        name: req.name,
        email: req.email,
        password,
        role: Role::Admin,
        owner_id: id,
        phone: req.phone.unwrap_or_default(),
        address: req.address.unwrap_or_default(),
        file: file.clone(),
    };

    let created = state.repo.create_account(new_account).await;
    let account = discard_on_failure(state.media.as_ref(), file.as_ref(), created)
        .await
        .map_err(|e| match e {
            RepositoryError::DuplicateEmail => {
                ApiError::Validation("User already exists".to_string())
            }
            other => other.into(),
        })?;

    let token = issue_token(account.id, &state.config)?;
    tracing::info!(account_id = %account.id, "registered administrator");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user: AccountView::from(&account),
        }),
    ))
}

/// login
///
/// [Public Route] Exchanges email and password for a bearer token. An unknown email and
/// a wrong password produce the same response.
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = AuthResponse),
        (status = 400, description = "Missing fields or invalid credentials", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<AuthResponse>> {
    let missing = || ApiError::Validation("Email and password are required".to_string());

    let Json(req) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection.body_text(), "unreadable login body");
        missing()
    })?;

    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(missing());
    }

    let invalid = || ApiError::Validation("Invalid credentials".to_string());

    let Some((account, hash)) = state.repo.find_credentials(&email).await? else {
        PasswordHash::verify_unknown(&req.password);
        return Err(invalid());
    };

    if !hash.verify(&req.password)? {
        return Err(invalid());
    }

    let token = issue_token(account.id, &state.config)?;

    Ok(Json(AuthResponse {
        token,
        user: AccountView::from(&account),
    }))
}

/// me
///
/// [Authenticated Route] Returns the acting account. Used by the frontend to restore a
/// session from a stored token.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "Current account", body = AccountView),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    )
)]
pub async fn me(AuthUser { account }: AuthUser) -> Json<AccountView> {
    Json(AccountView::from(&account))
}
