//! HTTP request handlers.

use crate::db::{
    self, BookAuthor, BookComment, BookGroupArt, BookGroupSummary, ChapterListEntry, Image,
    LatestChapter, Role, Stats, UserSearchHit,
};
use crate::error::{AppError, Result};
use crate::library::{
    author::{self, AuthorInput},
    chapter::{
        self, ChapterContent, CreateHypertextChapter, CreateImagesChapter,
        UpdateHypertextChapter,
    },
    group::{
        self, AddBookGroupArt, BookGroupDetail, CreateBookGroup, NewComment, RankingPeriod,
        UpdateBookGroup,
    },
    image::{self, RegisterImage},
    likes::{self, LikeSummary},
    roles::{self, CreateRole},
    user::{self, Profile, UpdateUserInfo},
};
use crate::server::AppState;
use crate::server::extract::{AppJson, AppPath, AppQuery};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// `{"message": ...}` body.
fn message(text: &str) -> Json<Value> {
    Json(json!({ "message": text }))
}

/// `{"id": ...}` body of a creation.
fn created(id: i64) -> Json<Value> {
    Json(json!({ "id": id }))
}

/// Page selector of the paginated listings.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    page: Option<u32>,
}

// ============================================================================
// AUTH API
// ============================================================================

/// Login request.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    #[serde(alias = "email")]
    username: String,
    password: String,
}

/// Login response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    token: String,
    user_id: i64,
    username: String,
    role: String,
}

/// Register request.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

/// Auth login.
pub async fn auth_login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let (user, token) = state.auth.login(&req.username, &req.password)?;

    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        username: user.username,
        role: user.role,
    }))
}

/// Auth register.
pub async fn auth_register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<Json<LoginResponse>> {
    let _user = state
        .auth
        .register(&req.username, &req.email, &req.password)?;
    let (user, token) = state.auth.login(&req.username, &req.password)?;

    Ok(Json(LoginResponse {
        token,
        user_id: user.id,
        username: user.username,
        role: user.role,
    }))
}

/// Auth logout.
pub async fn auth_logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    if let Some(token) = extract_token(&headers) {
        state.auth.logout(&token)?;
    }
    Ok(message("Logout successfully"))
}

/// Get current user info.
pub async fn auth_me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Profile>> {
    let user = get_authenticated_user(&state, &headers).await?;
    Ok(Json(user::profile(&state.db, user)?))
}

// ============================================================================
// USERS
// ============================================================================

/// Password change request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

/// Search query.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
}

/// Update own profile.
pub async fn user_update_info(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(req): AppJson<UpdateUserInfo>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    user::update_info(&state.db, &caller, req)?;
    Ok(message("Update user info successfully"))
}

/// Change own password.
pub async fn user_change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(req): AppJson<ChangePasswordRequest>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    state
        .auth
        .change_own_password(&caller, &req.current_password, &req.new_password)?;
    Ok(message("Change password successfully"))
}

/// Add a favorite group.
pub async fn user_add_favorite(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(group_id): AppPath<i64>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    let favorites = user::add_favorite(&state.db, &caller, group_id)?;
    Ok(Json(json!({ "favoriteList": favorites })))
}

/// Remove a favorite group.
pub async fn user_remove_favorite(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(group_id): AppPath<i64>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    let favorites = user::remove_favorite(&state.db, &caller, group_id)?;
    Ok(Json(json!({ "favoriteList": favorites })))
}

/// Search users by name.
pub async fn user_search(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<SearchQuery>,
) -> Result<Json<Vec<UserSearchHit>>> {
    Ok(Json(user::search(&state.db, &query.q)?))
}

/// Groups owned by a user.
pub async fn user_groups(
    State(state): State<AppState>,
    AppPath(user_id): AppPath<i64>,
) -> Result<Json<Vec<BookGroupSummary>>> {
    Ok(Json(group::by_owner(&state.db, user_id)?))
}

/// Delete a user.
pub async fn user_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(username): AppPath<String>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    user::delete(&state.db, &caller, &username)?;
    Ok(message("Delete user successfully"))
}

// ============================================================================
// ROLES AND IMAGES
// ============================================================================

/// List roles.
pub async fn role_list(State(state): State<AppState>) -> Result<Json<Vec<Role>>> {
    Ok(Json(roles::list(&state.db)?))
}

/// Create a role.
pub async fn role_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(req): AppJson<CreateRole>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    let id = roles::create(&state.db, &caller, req)?;
    Ok(created(id))
}

/// Delete a role.
pub async fn role_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(name): AppPath<String>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    roles::delete(&state.db, &caller, &name)?;
    Ok(message("Delete role successfully"))
}

/// Register image metadata.
pub async fn image_register(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(req): AppJson<RegisterImage>,
) -> Result<Json<Image>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    Ok(Json(image::register(&state.db, &caller, req)?))
}

/// Get image metadata.
pub async fn image_get(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Image>> {
    Ok(Json(image::get(&state.db, id)?))
}

// ============================================================================
// AUTHORS
// ============================================================================

/// List authors.
pub async fn author_list(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<Json<Vec<BookAuthor>>> {
    let per_page = state.config.pagination.authors_per_page;
    Ok(Json(author::list(&state.db, query.page, per_page)?))
}

/// Create an author.
pub async fn author_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(req): AppJson<AuthorInput>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    let id = author::create(&state.db, &caller, req)?;
    Ok(Json(json!({ "id": id, "message": "Create Author successfully" })))
}

/// Get an author.
pub async fn author_get(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<BookAuthor>> {
    Ok(Json(author::get(&state.db, id)?))
}

/// Update an author.
pub async fn author_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<AuthorInput>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    author::update(&state.db, &caller, id, req)?;
    Ok(message("Update Author successfully"))
}

/// Delete an author and its groups.
pub async fn author_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    author::delete(&state.db, &caller, id)?;
    Ok(message("Delete Author successfully"))
}

// ============================================================================
// BOOK GROUPS
// ============================================================================

/// Ranking query.
#[derive(Debug, Deserialize)]
pub struct RankingQuery {
    #[serde(default)]
    period: RankingPeriod,
}

/// List groups.
pub async fn group_list(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<Json<Vec<BookGroupSummary>>> {
    let per_page = state.config.pagination.groups_per_page;
    Ok(Json(group::list(&state.db, query.page, per_page)?))
}

/// Most viewed groups.
pub async fn group_ranking(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<RankingQuery>,
) -> Result<Json<Vec<BookGroupSummary>>> {
    let limit = state.config.pagination.groups_per_page;
    Ok(Json(group::ranking(&state.db, query.period, limit)?))
}

/// Create a group.
pub async fn group_create(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(req): AppJson<CreateBookGroup>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    let id = group::create(&state.db, &caller, req)?;
    Ok(created(id))
}

/// Group detail.
pub async fn group_get(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<BookGroupDetail>> {
    Ok(Json(group::detail(&state.db, id)?))
}

/// Update a group.
pub async fn group_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<UpdateBookGroup>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    group::update(&state.db, &caller, id, req)?;
    Ok(message("Update book group successfully"))
}

/// Delete a group.
pub async fn group_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    group::delete(&state.db, &caller, id)?;
    Ok(message("Delete book group successfully"))
}

/// Chapters of a group.
pub async fn group_chapters(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
    AppQuery(query): AppQuery<PageQuery>,
) -> Result<Json<Vec<ChapterListEntry>>> {
    let per_page = state.config.pagination.chapters_per_page;
    Ok(Json(chapter::list_by_group(
        &state.db, id, query.page, per_page,
    )?))
}

/// Latest chapter of a group, `null` when none.
pub async fn group_latest_chapter(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Option<LatestChapter>>> {
    Ok(Json(chapter::latest(&state.db, id)?))
}

/// Add cover art.
pub async fn group_add_art(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<AddBookGroupArt>,
) -> Result<Json<BookGroupArt>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    Ok(Json(group::add_art(&state.db, &caller, id, req)?))
}

/// Comments of a group.
pub async fn group_comments(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Vec<BookComment>>> {
    Ok(Json(group::comments(&state.db, id)?))
}

/// Post a comment.
pub async fn group_add_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<NewComment>,
) -> Result<Json<BookComment>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    Ok(Json(group::add_comment(&state.db, &caller, id, req)?))
}

// ============================================================================
// LIKES
// ============================================================================

/// Vote totals, with the caller's vote when a valid token is sent.
pub async fn group_likes(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(id): AppPath<i64>,
) -> Result<Json<LikeSummary>> {
    let caller = match extract_token(&headers) {
        Some(token) => state.auth.validate_token(&token)?,
        None => None,
    };
    Ok(Json(likes::summary(&state.db, caller.as_ref(), id)?))
}

/// Like a group.
pub async fn group_like(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    likes::like(&state.db, &caller, id)?;
    Ok(message("Like successfully"))
}

/// Dislike a group.
pub async fn group_dislike(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    likes::dislike(&state.db, &caller, id)?;
    Ok(message("Dislike successfully"))
}

/// Withdraw a vote.
pub async fn group_unlike(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    likes::unlike(&state.db, &caller, id)?;
    Ok(message("Unlike successfully"))
}

// ============================================================================
// CHAPTERS
// ============================================================================

/// Upload a hypertext chapter.
pub async fn chapter_create_hypertext(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(req): AppJson<CreateHypertextChapter>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    let id = chapter::create_hypertext(&state.db, &caller, req)?;
    Ok(created(id))
}

/// Upload an images chapter.
pub async fn chapter_create_images(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppJson(req): AppJson<CreateImagesChapter>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    let id = chapter::create_images(&state.db, &caller, req)?;
    Ok(created(id))
}

/// Read a chapter.
pub async fn chapter_content(
    State(state): State<AppState>,
    AppPath(id): AppPath<i64>,
) -> Result<Json<ChapterContent>> {
    Ok(Json(chapter::content(&state.db, id)?))
}

/// Update a hypertext chapter.
pub async fn chapter_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<UpdateHypertextChapter>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    chapter::update_hypertext(&state.db, &caller, id, req)?;
    Ok(message("Update chapter successfully"))
}

/// Delete a chapter.
pub async fn chapter_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    AppPath(id): AppPath<i64>,
) -> Result<Json<Value>> {
    let caller = get_authenticated_user(&state, &headers).await?;
    chapter::delete(&state.db, &caller, id)?;
    Ok(message("Delete Chapter successfully"))
}

// ============================================================================
// API
// ============================================================================

/// Entity counts.
pub async fn api_stats(State(state): State<AppState>) -> Result<Json<Stats>> {
    Ok(Json(state.db.stats()?))
}

// ============================================================================
// HELPERS
// ============================================================================

/// Extract token from Authorization header.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Get authenticated user from token.
async fn get_authenticated_user(state: &AppState, headers: &HeaderMap) -> Result<db::User> {
    let token = extract_token(headers)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;

    state
        .auth
        .validate_token(&token)?
        .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))
}
