use crate::{
    AppState,
    access,
    auth::{AuthUser, MaybeAuthUser},
    error::{ApiError, ApiResponse, FieldError},
    models::{
        CreatePostRequest, FeaturedPostsData, LikeData, PostData, PostListData, PostView,
        UpdatePostRequest, UpdateUserRequest, UserData, UserListData,
    },
    query::{
        DEFAULT_FEATURED_LIMIT, DEFAULT_LIMIT, FeaturedParams, ListPostsParams, PageParams,
        PageWindow, Pagination, PostFilter, SearchParams, SortOrder,
    },
    repository::{Repository, UserChanges},
    validation::ValidatedJson,
    visibility::{self, NewPost, PostChanges},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

// --- Shared Helpers ---

/// Path ids arrive as raw strings so a malformed id is a 400 with field detail rather
/// than the extractor's plain-text rejection.
fn parse_id(raw: &str, field: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| ApiError::Validation(vec![FieldError::new(field, format!("{field} must be a valid id"))]))
}

fn required_query(raw: Option<&str>) -> Result<String, ApiError> {
    raw.map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest("Search query is required".to_string()))
}

/// Runs the page query and the count with the same filter.
async fn paginate_posts(
    repo: &dyn Repository,
    filter: &PostFilter,
    sort: SortOrder,
    window: PageWindow,
) -> Result<PostListData, ApiError> {
    let (posts, total) = tokio::try_join!(
        repo.find_posts(filter, sort, window),
        repo.count_posts(filter)
    )?;
    Ok(PostListData {
        posts: posts.into_iter().map(PostView::from).collect(),
        pagination: Pagination::new(window, total),
    })
}

async fn paginate_users(
    repo: &dyn Repository,
    search: Option<&str>,
    window: PageWindow,
) -> Result<UserListData, ApiError> {
    let (users, total) = tokio::try_join!(repo.list_users(search, window), repo.count_users(search))?;
    Ok(UserListData {
        users,
        pagination: Pagination::new(window, total),
    })
}

// --- Health ---

/// health
///
/// [Public Route] Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health() -> Json<ApiResponse<()>> {
    Json(ApiResponse::message("ok"))
}

/// not_found
///
/// Fallback for unknown routes, so clients always receive the JSON envelope.
pub async fn not_found() -> ApiError {
    ApiError::not_found("Route")
}

// --- Post Handlers ---

/// list_posts
///
/// [Public Route] Paginated listing of externally visible posts, newest first.
///
/// *Note*: Authentication is optional here but never widens the result. Drafts, archived
/// and private posts stay out of listings even for their author.
#[utoipa::path(
    get,
    path = "/api/posts",
    params(ListPostsParams),
    responses(
        (status = 200, description = "Posts page", body = PostListData),
        (status = 400, description = "Invalid status or author filter")
    )
)]
pub async fn list_posts(
    _viewer: MaybeAuthUser,
    State(state): State<AppState>,
    Query(params): Query<ListPostsParams>,
) -> ApiResult<PostListData> {
    let filter = PostFilter::from_list_params(&params)?;
    let window = PageWindow::parse(params.page.as_deref(), params.limit.as_deref(), DEFAULT_LIMIT);
    let data = paginate_posts(state.repo.as_ref(), &filter, SortOrder::Newest, window).await?;
    Ok(Json(ApiResponse::ok(data)))
}

/// get_post
///
/// [Public Route] Single post by id. The owner and admins can read every lifecycle state;
/// everyone else gets 404 for anything that is not published and public.
///
/// Views are counted only for externally visible posts.
#[utoipa::path(
    get,
    path = "/api/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post", body = PostData),
        (status = 404, description = "Not found or not visible")
    )
)]
pub async fn get_post(
    MaybeAuthUser(viewer): MaybeAuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<PostData> {
    let id = parse_id(&id, "id")?;
    let post = visibility::ensure_visible(viewer.as_ref(), state.repo.get_post(id).await?)?;

    let post = if visibility::is_externally_visible(&post) {
        state.repo.increment_views(id).await?.unwrap_or(post)
    } else {
        post
    };

    Ok(Json(ApiResponse::ok(PostData { post: post.into() })))
}

/// create_post
///
/// [Authenticated Route] Creates a post owned by the caller. `featured` is honoured only
/// for admins.
#[utoipa::path(
    post,
    path = "/api/posts",
    request_body = CreatePostRequest,
    responses(
        (status = 201, description = "Post created", body = PostData),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn create_post(
    principal: AuthUser,
    State(state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<CreatePostRequest>,
) -> Result<(StatusCode, Json<ApiResponse<PostData>>), ApiError> {
    let post = state
        .repo
        .create_post(NewPost::from_request(payload, &principal)?)
        .await?;
    tracing::info!(post_id = %post.id, author_id = %principal.id, "post created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(PostData { post: post.into() }).with_message("Post created successfully")),
    ))
}

/// update_post
///
/// [Authenticated Route] Partial update by the owner or an admin.
///
/// *Authorization*: a post the caller cannot see is reported as 404 before ownership is
/// checked, so hidden posts are indistinguishable from missing ones.
#[utoipa::path(
    put,
    path = "/api/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    request_body = UpdatePostRequest,
    responses(
        (status = 200, description = "Post updated", body = PostData),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_post(
    principal: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(payload): ValidatedJson<UpdatePostRequest>,
) -> ApiResult<PostData> {
    let id = parse_id(&id, "id")?;
    let existing = visibility::ensure_visible(Some(&principal), state.repo.get_post(id).await?)?;
    access::require_mutate(&principal, existing.author_id, "update this post")?;

    let changes = PostChanges::from_request(payload, &principal)?;
    let post = if changes.is_empty() {
        existing
    } else {
        state
            .repo
            .update_post(id, changes)
            .await?
            .ok_or_else(|| ApiError::not_found("Post"))?
    };
    tracing::info!(post_id = %id, editor_id = %principal.id, "post updated");

    Ok(Json(
        ApiResponse::ok(PostData { post: post.into() }).with_message("Post updated successfully"),
    ))
}

/// delete_post
///
/// [Authenticated Route] Hard delete by the owner or an admin.
#[utoipa::path(
    delete,
    path = "/api/posts/{id}",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Post deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_post(
    principal: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let id = parse_id(&id, "id")?;
    let existing = visibility::ensure_visible(Some(&principal), state.repo.get_post(id).await?)?;
    access::require_mutate(&principal, existing.author_id, "delete this post")?;

    if !state.repo.delete_post(id).await? {
        return Err(ApiError::not_found("Post"));
    }
    tracing::info!(post_id = %id, actor_id = %principal.id, "post deleted");

    Ok(Json(ApiResponse::message("Post deleted successfully")))
}

/// search_posts
///
/// [Public Route] Free-text search over visible posts, ordered by relevance.
#[utoipa::path(
    get,
    path = "/api/posts/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Matching posts", body = PostListData),
        (status = 400, description = "Missing query")
    )
)]
pub async fn search_posts(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<PostListData> {
    let q = required_query(params.q.as_deref())?;
    let window = PageWindow::parse(params.page.as_deref(), params.limit.as_deref(), DEFAULT_LIMIT);
    let filter = PostFilter::visible().with_text(q);
    let data = paginate_posts(state.repo.as_ref(), &filter, SortOrder::Relevance, window).await?;
    Ok(Json(ApiResponse::ok(data)))
}

/// get_posts_by_author
///
/// [Public Route] Visible posts of one author, newest first.
#[utoipa::path(
    get,
    path = "/api/posts/author/{author_id}",
    params(("author_id" = Uuid, Path, description = "Author ID"), PageParams),
    responses(
        (status = 200, description = "Author's posts", body = PostListData),
        (status = 400, description = "Invalid author id")
    )
)]
pub async fn get_posts_by_author(
    State(state): State<AppState>,
    Path(author_id): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult<PostListData> {
    let author_id = parse_id(&author_id, "authorId")?;
    let window = PageWindow::parse(params.page.as_deref(), params.limit.as_deref(), DEFAULT_LIMIT);
    let filter = PostFilter::visible().with_author(author_id);
    let data = paginate_posts(state.repo.as_ref(), &filter, SortOrder::Newest, window).await?;
    Ok(Json(ApiResponse::ok(data)))
}

/// get_featured_posts
///
/// [Public Route] Newest visible featured posts. Unpaginated; `limit` defaults to 5.
#[utoipa::path(
    get,
    path = "/api/posts/featured",
    params(FeaturedParams),
    responses((status = 200, description = "Featured posts", body = FeaturedPostsData))
)]
pub async fn get_featured_posts(
    State(state): State<AppState>,
    Query(params): Query<FeaturedParams>,
) -> ApiResult<FeaturedPostsData> {
    let window = PageWindow::parse(None, params.limit.as_deref(), DEFAULT_FEATURED_LIMIT);
    let filter = PostFilter::visible().with_featured(true);
    let posts = state
        .repo
        .find_posts(&filter, SortOrder::Newest, window)
        .await?;
    Ok(Json(ApiResponse::ok(FeaturedPostsData {
        posts: posts.into_iter().map(PostView::from).collect(),
    })))
}

/// toggle_like
///
/// [Authenticated Route] Adds the caller's like, or removes it if already present.
/// Only externally visible posts can be liked.
#[utoipa::path(
    post,
    path = "/api/posts/{id}/like",
    params(("id" = Uuid, Path, description = "Post ID")),
    responses(
        (status = 200, description = "Like toggled", body = LikeData),
        (status = 404, description = "Not found or not visible")
    )
)]
pub async fn toggle_like(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<LikeData> {
    let id = parse_id(&id, "id")?;
    let likes = state
        .repo
        .toggle_like(id, user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Post"))?;

    Ok(Json(
        ApiResponse::ok(LikeData { likes }).with_message("Like toggled successfully"),
    ))
}

// --- User Handlers ---

/// get_users
///
/// [Admin Route] Paginated listing of active accounts.
#[utoipa::path(
    get,
    path = "/api/users",
    params(PageParams),
    responses(
        (status = 200, description = "Users page", body = UserListData),
        (status = 403, description = "Admin only")
    )
)]
pub async fn get_users(
    principal: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<UserListData> {
    access::require_admin(&principal)?;
    let window = PageWindow::parse(params.page.as_deref(), params.limit.as_deref(), DEFAULT_LIMIT);
    let data = paginate_users(state.repo.as_ref(), None, window).await?;
    Ok(Json(ApiResponse::ok(data)))
}

/// search_users
///
/// [Admin Route] Case-insensitive match on username, email and names of active accounts.
#[utoipa::path(
    get,
    path = "/api/users/search",
    params(SearchParams),
    responses(
        (status = 200, description = "Matching users", body = UserListData),
        (status = 400, description = "Missing query"),
        (status = 403, description = "Admin only")
    )
)]
pub async fn search_users(
    principal: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<UserListData> {
    access::require_admin(&principal)?;
    let q = required_query(params.q.as_deref())?;
    let window = PageWindow::parse(params.page.as_deref(), params.limit.as_deref(), DEFAULT_LIMIT);
    let data = paginate_users(state.repo.as_ref(), Some(q.as_str()), window).await?;
    Ok(Json(ApiResponse::ok(data)))
}

/// get_user
///
/// [Authenticated Route] Public profile of an active account.
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserData),
        (status = 404, description = "Not found or deactivated")
    )
)]
pub async fn get_user(
    _principal: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<UserData> {
    let id = parse_id(&id, "id")?;
    let user = state
        .repo
        .get_user(id)
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(ApiResponse::ok(UserData { user })))
}

/// update_user
///
/// [Authenticated Route] Self-service or admin update. `role` and `isActive` are dropped
/// for non-admin callers; username and email must stay unique.
#[utoipa::path(
    put,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserData),
        (status = 400, description = "Validation failed or value already taken"),
        (status = 403, description = "Not the account owner"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_user(
    principal: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
    ValidatedJson(payload): ValidatedJson<UpdateUserRequest>,
) -> ApiResult<UserData> {
    let id = parse_id(&id, "id")?;
    state
        .repo
        .get_user(id)
        .await?
        .filter(|user| user.is_active || principal.is_admin())
        .ok_or_else(|| ApiError::not_found("User"))?;
    access::require_mutate(&principal, id, "update this user")?;

    let changes = UserChanges::from_request(payload, &principal);
    if let Some(username) = changes.username.as_deref() {
        if let Some(other) = state.repo.find_user_by_username(username).await? {
            if other.id != id {
                return Err(ApiError::Conflict("Username already taken".to_string()));
            }
        }
    }
    if let Some(email) = changes.email.as_deref() {
        if let Some(other) = state.repo.find_user_by_email(email).await? {
            if other.id != id {
                return Err(ApiError::Conflict("Email already registered".to_string()));
            }
        }
    }

    let user = state
        .repo
        .update_user(id, changes)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    tracing::info!(user_id = %id, editor_id = %principal.id, "user updated");

    Ok(Json(
        ApiResponse::ok(UserData { user }).with_message("User updated successfully"),
    ))
}

/// delete_user
///
/// [Admin Route] Soft delete: the account is deactivated, its data kept.
///
/// *Note*: The self-deletion guard runs before the admin check, so every caller targeting
/// their own account receives 400.
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User deactivated"),
        (status = 400, description = "Cannot delete own account"),
        (status = 403, description = "Admin only"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_user(
    principal: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let id = parse_id(&id, "id")?;
    access::guard_self_deactivation(&principal, id)?;
    access::require_admin(&principal)?;

    if !state.repo.deactivate_user(id).await? {
        return Err(ApiError::not_found("User"));
    }
    tracing::info!(user_id = %id, actor_id = %principal.id, "user deactivated");

    Ok(Json(ApiResponse::message("User deactivated successfully")))
}
