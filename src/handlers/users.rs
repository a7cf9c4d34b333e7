use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::Response,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AdminUser,
    error::{ApiError, ApiResult, ErrorBody},
    handlers::{IdPath, discard_on_failure, file_response, release_superseded, store_upload},
    media::{self, MediaFolder},
    models::{
        Account, AccountChanges, AccountResponse, AccountView, CreateAccountRequest,
        MessageResponse, NewAccount, Role, UpdateAccountRequest,
    },
    password::PasswordHash,
    upload::UploadForm,
};

fn user_not_found() -> ApiError {
    ApiError::NotFound("User not found".to_string())
}

/// Loads an account owned by `admin`. Accounts of other tenants are reported as missing.
async fn owned_account(state: &AppState, admin: &Account, id: Uuid) -> ApiResult<Account> {
    state
        .repo
        .get_owned_account(id, admin.id)
        .await?
        .ok_or_else(user_not_found)
}

/// list_users
///
/// [Admin Route] Accounts owned by the caller, newest first. The caller is not listed.
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "Owned accounts", body = [AccountView]),
        (status = 403, description = "Not an administrator", body = ErrorBody)
    )
)]
pub async fn list_users(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<AccountView>>> {
    let accounts = state.repo.list_owned_accounts(admin.id).await?;
    Ok(Json(accounts.iter().map(AccountView::from).collect()))
}

/// get_user
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account", body = AccountView),
        (status = 404, description = "Not found or not owned", body = ErrorBody)
    )
)]
pub async fn get_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<Json<AccountView>> {
    let account = owned_account(&state, &admin, id).await?;
    Ok(Json(AccountView::from(&account)))
}

/// create_user
///
/// [Admin Route] Creates a subordinate account owned by the caller. The new account
/// always has the `user` role.
#[utoipa::path(
    post,
    path = "/api/users",
    request_body(content = CreateAccountRequest, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Account created", body = AccountResponse),
        (status = 400, description = "Invalid input, duplicate email, or rejected file", body = ErrorBody)
    )
)]
pub async fn create_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    mut form: UploadForm,
) -> ApiResult<(StatusCode, Json<AccountResponse>)> {
    let req = CreateAccountRequest::from_form(&form);
    req.validate()?;

    if state.repo.email_exists(&req.email).await? {
        return Err(ApiError::Validation("Email already exists".to_string()));
    }

    let password = PasswordHash::new(&req.password)?;
    let file = store_upload(state.media.as_ref(), MediaFolder::Users, form.take_file()).await?;

    let new_account = NewAccount {
        id: Uuid::new_v4(),
        name: req.name,
        email: req.email,
        password,
        role: Role::User,
        owner_id: admin.id,
        phone: req.phone.unwrap_or_default(),
        address: req.address.unwrap_or_default(),
        file: file.clone(),
    };

    let created = state.repo.create_account(new_account).await;
    let account = discard_on_failure(state.media.as_ref(), file.as_ref(), created).await?;

    tracing::info!(account_id = %account.id, owner_id = %admin.id, "created account");

    Ok((
        StatusCode::CREATED,
        Json(AccountResponse {
            message: "User created successfully".to_string(),
            user: AccountView::from(&account),
        }),
    ))
}

/// update_user
///
/// [Admin Route] Partial update of an owned account.
///
/// * Blank `name`/`email`/`password` are ignored; `phone`/`address` may be cleared.
/// * Email uniqueness is only re-checked when the email actually changes.
/// * A new `file` replaces the attachment; the old binary is released after the row
///   has been updated.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "Account id")),
    request_body(content = UpdateAccountRequest, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Account updated", body = AccountResponse),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 404, description = "Not found or not owned", body = ErrorBody)
    )
)]
pub async fn update_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    IdPath(id): IdPath,
    mut form: UploadForm,
) -> ApiResult<Json<AccountResponse>> {
    let existing = owned_account(&state, &admin, id).await?;

    let req = UpdateAccountRequest::from_form(&form);
    req.validate()?;

    // An unchanged email is not sent to the store at all.
    let email = req.email.filter(|email| *email != existing.email);
    if let Some(email) = &email {
        if state.repo.email_exists(email).await? {
            return Err(ApiError::Validation("Email already exists".to_string()));
        }
    }

    let password = req
        .password
        .as_deref()
        .map(PasswordHash::new)
        .transpose()?;

    let file = store_upload(state.media.as_ref(), MediaFolder::Users, form.take_file()).await?;

    let changes = AccountChanges {
        name: req.name,
        email,
        phone: req.phone,
        address: req.address,
        password,
        file: file.clone(),
    };

    let updated = state
        .repo
        .update_owned_account(id, admin.id, changes)
        .await
        .map_err(ApiError::from)
        .and_then(|account| account.ok_or_else(user_not_found));
    let account = discard_on_failure(state.media.as_ref(), file.as_ref(), updated).await?;

    release_superseded(state.media.as_ref(), existing.file.as_ref(), file.is_some()).await;

    Ok(Json(AccountResponse {
        message: "User updated successfully".to_string(),
        user: AccountView::from(&account),
    }))
}

/// delete_user
///
/// [Admin Route] Deletes an owned account, then releases its attachment. An
/// administrator cannot delete itself, which would orphan its subordinates.
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "Account deleted", body = MessageResponse),
        (status = 400, description = "Attempt to delete the caller", body = ErrorBody),
        (status = 404, description = "Not found or not owned", body = ErrorBody)
    )
)]
pub async fn delete_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<Json<MessageResponse>> {
    if id == admin.id {
        return Err(ApiError::Validation(
            "Cannot delete your own account".to_string(),
        ));
    }

    let removed = state
        .repo
        .delete_owned_account(id, admin.id)
        .await?
        .ok_or_else(user_not_found)?;

    if let Some(attachment) = &removed.file {
        media::release(state.media.as_ref(), attachment).await;
    }

    tracing::info!(account_id = %id, owner_id = %admin.id, "deleted account");

    Ok(Json(MessageResponse::new(
        "User and associated file deleted successfully",
    )))
}

/// download_user_file
///
/// [Admin Route] Streams the attachment of an owned account through the server.
#[utoipa::path(
    get,
    path = "/api/users/{id}/download",
    params(("id" = Uuid, Path, description = "Account id")),
    responses(
        (status = 200, description = "File contents streamed with the stored content type"),
        (status = 404, description = "No such account or no attachment", body = ErrorBody),
        (status = 500, description = "Media host unavailable", body = ErrorBody)
    )
)]
pub async fn download_user_file(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<Response> {
    let account = owned_account(&state, &admin, id).await?;
    let attachment = account
        .file
        .ok_or_else(|| ApiError::NotFound("No file found for this user".to_string()))?;

    let object = state
        .media
        .fetch(&attachment)
        .await
        .map_err(ApiError::Retrieval)?;

    file_response(object, &attachment.filename)
}
