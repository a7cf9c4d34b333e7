use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::Response,
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AdminUser, OptionalAuthUser},
    error::{ApiError, ApiResult, ErrorBody},
    handlers::{IdPath, discard_on_failure, file_response, release_superseded, store_upload},
    media::{self, MediaFolder},
    models::{
        CreatePostRequest, MessageResponse, NewPost, Post, PostChanges, PostResponse, PostView,
        UpdatePostRequest,
    },
    upload::UploadForm,
};

fn post_not_found() -> ApiError {
    ApiError::NotFound("Post not found".to_string())
}

/// Loads a post the caller may read: published posts for everyone, drafts for
/// administrators only. A hidden draft looks exactly like a missing post.
async fn visible_post(state: &AppState, viewer: &OptionalAuthUser, id: Uuid) -> ApiResult<Post> {
    state
        .repo
        .get_post(id)
        .await?
        .filter(|post| post.is_published || viewer.is_admin())
        .ok_or_else(post_not_found)
}

/// list_posts
///
/// [Public Route] Published posts, newest first. Administrators also see drafts.
#[utoipa::path(
    get,
    path = "/api/posts",
    responses((status = 200, description = "Posts", body = [PostView]))
)]
pub async fn list_posts(
    viewer: OptionalAuthUser,
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<PostView>>> {
    let posts = state.repo.list_posts(viewer.is_admin()).await?;
    Ok(Json(posts.iter().map(PostView::from).collect()))
}

/// get_post
#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    params(("id" = Uuid, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post", body = PostView),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn get_post(
    viewer: OptionalAuthUser,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<Json<PostView>> {
    let post = visible_post(&state, &viewer, id).await?;
    Ok(Json(PostView::from(&post)))
}

/// create_post
///
/// [Admin Route] Validation happens before the optional attachment is uploaded to the
/// `posts` folder, so a rejected post never leaves a file behind.
#[utoipa::path(
    post,
    path = "/api/posts",
    request_body(content = CreatePostRequest, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Post created", body = PostResponse),
        (status = 400, description = "Missing title or content, or rejected file", body = ErrorBody),
        (status = 403, description = "Not an administrator", body = ErrorBody)
    )
)]
pub async fn create_post(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    mut form: UploadForm,
) -> ApiResult<(StatusCode, Json<PostResponse>)> {
    let req = CreatePostRequest::from_form(&form)?;
    req.validate()?;

    let file = store_upload(state.media.as_ref(), MediaFolder::Posts, form.take_file()).await?;

    let new_post = NewPost {
        id: Uuid::new_v4(),
        title: req.title,
        content: req.content,
        author_id: admin.id,
        author_name: admin.name.clone(),
        is_published: req.is_published.unwrap_or(true),
        file: file.clone(),
    };

    let created = state.repo.create_post(new_post).await;
    let post = discard_on_failure(state.media.as_ref(), file.as_ref(), created).await?;

    tracing::info!(post_id = %post.id, author_id = %admin.id, "created post");

    Ok((
        StatusCode::CREATED,
        Json(PostResponse {
            message: "Post created successfully".to_string(),
            post: PostView::from(&post),
        }),
    ))
}

/// update_post
///
/// [Admin Route] Partial update. A new `file` replaces the attachment and the old
/// binary is released once the row has been updated.
#[utoipa::path(
    put,
    path = "/api/posts/{id}",
    params(("id" = Uuid, Path, description = "Post id")),
    request_body(content = UpdatePostRequest, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Post updated", body = PostResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn update_post(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    IdPath(id): IdPath,
    mut form: UploadForm,
) -> ApiResult<Json<PostResponse>> {
    let existing = state.repo.get_post(id).await?.ok_or_else(post_not_found)?;
    let req = UpdatePostRequest::from_form(&form)?;

    let file = store_upload(state.media.as_ref(), MediaFolder::Posts, form.take_file()).await?;

    let changes = PostChanges {
        title: req.title,
        content: req.content,
        is_published: req.is_published,
        file: file.clone(),
    };

    let updated = state
        .repo
        .update_post(id, changes)
        .await
        .map_err(ApiError::from)
        .and_then(|post| post.ok_or_else(post_not_found));
    let post = discard_on_failure(state.media.as_ref(), file.as_ref(), updated).await?;

    release_superseded(state.media.as_ref(), existing.file.as_ref(), file.is_some()).await;

    Ok(Json(PostResponse {
        message: "Post updated successfully".to_string(),
        post: PostView::from(&post),
    }))
}

/// delete_post
#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    params(("id" = Uuid, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post deleted", body = MessageResponse),
        (status = 404, description = "Not found", body = ErrorBody)
    )
)]
pub async fn delete_post(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<Json<MessageResponse>> {
    let removed = state.repo.delete_post(id).await?.ok_or_else(post_not_found)?;

    if let Some(attachment) = &removed.file {
        media::release(state.media.as_ref(), attachment).await;
    }

    tracing::info!(post_id = %id, deleted_by = %admin.id, "deleted post");

    Ok(Json(MessageResponse::new("Post deleted successfully")))
}

/// download_post_file
///
/// [Public Route] Streams a post's attachment. Same visibility rule as `get_post`.
#[utoipa::path(
    get,
    path = "/api/posts/{id}/download",
    params(("id" = Uuid, Path, description = "Post id")),
    responses(
        (status = 200, description = "File contents streamed with the stored content type"),
        (status = 404, description = "No such post or no attachment", body = ErrorBody),
        (status = 500, description = "Media host unavailable", body = ErrorBody)
    )
)]
pub async fn download_post_file(
    viewer: OptionalAuthUser,
    State(state): State<AppState>,
    IdPath(id): IdPath,
) -> ApiResult<Response> {
    let post = visible_post(&state, &viewer, id).await?;
    let attachment = post
        .file
        .ok_or_else(|| ApiError::NotFound("No file found for this post".to_string()))?;

    let object = state
        .media
        .fetch(&attachment)
        .await
        .map_err(ApiError::Retrieval)?;

    file_response(object, &attachment.filename)
}
