use axum::extract::{ConnectInfo, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::auth::{AuthService, PasswordChange, RegisterOutcome, MIN_PASSWORD_LEN};
use crate::app::categories::{CategoryService, CreateCategory};
use crate::app::comments::CommentService;
use crate::app::dashboard::{DashboardService, DashboardStats};
use crate::app::reports::ReportService;
use crate::app::threads::{NewThread, ThreadChanges, ThreadService};
use crate::app::users::{ProfileChanges, UserService};
use crate::domain::activity::{ActivityAction, ActivityEntry, ActivityLog};
use crate::domain::category::Category;
use crate::domain::comment::Comment;
use crate::domain::report::{Report, ReportBody};
use crate::domain::thread::{Thread, MAX_BODY_CHARS, MAX_TITLE_CHARS};
use crate::domain::user::{is_valid_email, normalize_email, Role, User};
use crate::http::envelope::{Empty, Envelope};
use crate::http::extract::{FormData, JsonBody, PathId, QueryParams};
use crate::http::{AdminUser, AppError, AuthUser};
use crate::infra::db::{is_foreign_key_violation, is_unique_violation};
use crate::infra::response_cache::{thread_tag, THREAD_LISTS_TAG};
use crate::infra::storage::{Replaced, UploadKind};
use crate::AppState;

const DEFAULT_THREAD_PAGE_SIZE: i64 = 20;
const DEFAULT_COMMENT_PAGE_SIZE: i64 = 50;
const DEFAULT_LOG_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

type ApiResult<T> = Result<Json<Envelope<T>>, AppError>;

#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct ThreadListQuery {
    pub category: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    page: i64,
    limit: i64,
    total: i64,
    pages: i64,
}

impl Pagination {
    fn new(page: i64, limit: i64, total: i64) -> Self {
        Self {
            page,
            limit,
            total,
            pages: (total + limit - 1) / limit,
        }
    }
}

#[derive(Serialize)]
pub struct Page<T> {
    items: Vec<T>,
    pagination: Pagination,
}

/// Validated `(page, limit, offset)` for a paginated listing.
fn page_window(
    page: Option<i64>,
    limit: Option<i64>,
    default_limit: i64,
) -> Result<(i64, i64, i64), AppError> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(default_limit);
    if page < 1 {
        return Err(AppError::bad_request("page must be at least 1"));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppError::bad_request(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    let offset = (page - 1)
        .checked_mul(limit)
        .ok_or_else(|| AppError::bad_request("page is out of range"))?;
    Ok((page, limit, offset))
}

fn parse_uuid(value: &str, field: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value.trim()).map_err(|_| AppError::bad_request(format!("invalid {}", field)))
}

fn auth_service(state: &AppState) -> AuthService {
    AuthService::new(state.db.clone(), state.token_key, state.token_ttl_days)
}

async fn log_activity(
    state: &AppState,
    addr: SocketAddr,
    user_id: Uuid,
    username: &str,
    action: ActivityAction,
    details: String,
) {
    state
        .activity
        .record(ActivityEntry {
            user_id,
            username: username.to_string(),
            action,
            details,
            ip: addr.ip().to_string(),
            timestamp: OffsetDateTime::now_utc(),
        })
        .await;
}

/// Serializes `payload` and stores it under `key` for later reads.
fn cache_payload<T: Serialize>(
    state: &AppState,
    key: String,
    tags: &[String],
    payload: &T,
) -> Result<Value, AppError> {
    let value = serde_json::to_value(payload).map_err(|err| {
        tracing::error!(error = ?err, "failed to serialize response");
        AppError::internal("failed to build response")
    })?;
    state.response_cache.put(key, value.clone(), tags);
    Ok(value)
}

fn invalidate_thread(state: &AppState, thread_id: Uuid) {
    state.response_cache.invalidate_tag(THREAD_LISTS_TAG);
    state.response_cache.invalidate_tag(&thread_tag(thread_id));
}

fn validate_title(title: &str) -> Result<(), AppError> {
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::bad_request(format!(
            "title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(())
}

fn validate_body(body: &str) -> Result<(), AppError> {
    if body.chars().count() > MAX_BODY_CHARS {
        return Err(AppError::bad_request(format!(
            "body must be at most {} characters",
            MAX_BODY_CHARS
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    time: String,
    status: &'static str,
}

pub async fn health(State(state): State<AppState>) -> Json<Envelope<HealthResponse>> {
    let db = state.db.ping().await.is_ok();
    let redis = state.cache.ping().await.is_ok();
    let status = if db && redis { "ok" } else { "degraded" };
    let time = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    Envelope::ok(HealthResponse { time, status })
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct UserPayload {
    user: User,
}

pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> ApiResult<UserPayload> {
    let username = payload.username.unwrap_or_default().trim().to_string();
    let email = payload.email.unwrap_or_default();
    let password = payload.password.unwrap_or_default();

    if username.is_empty() || email.trim().is_empty() || password.is_empty() {
        return Err(AppError::bad_request(
            "username, email and password are required",
        ));
    }
    if !is_valid_email(&email) {
        return Err(AppError::bad_request("invalid email format"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let outcome = auth_service(&state)
        .register(&username, &email, &password)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to register user");
            AppError::internal("failed to register")
        })?;

    match outcome {
        RegisterOutcome::Created(user) => {
            log_activity(
                &state,
                addr,
                user.id,
                &user.username,
                ActivityAction::Register,
                "registered a new account".to_string(),
            )
            .await;
            Ok(Envelope::with_message("registration successful", UserPayload { user }))
        }
        RegisterOutcome::UsernameTaken => Err(AppError::conflict("username is already taken")),
        RegisterOutcome::EmailTaken => Err(AppError::conflict("email is already registered")),
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    redirect_to: &'static str,
    token: String,
    user: User,
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let username = payload.username.unwrap_or_default();
    let password = payload.password.unwrap_or_default();
    if username.trim().is_empty() || password.is_empty() {
        return Err(AppError::bad_request("username and password are required"));
    }

    let session = auth_service(&state)
        .login(&username, &password)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to login");
            AppError::internal("failed to login")
        })?
        .ok_or_else(|| AppError::unauthorized("invalid username or password"))?;

    log_activity(
        &state,
        addr,
        session.user.id,
        &session.user.username,
        ActivityAction::Login,
        "signed in".to_string(),
    )
    .await;

    Ok(Envelope::ok(LoginResponse {
        redirect_to: "/thread",
        token: session.token,
        user: session.user,
    }))
}

#[derive(Deserialize)]
pub struct VerifyEmailRequest {
    pub email: Option<String>,
}

#[derive(Serialize)]
pub struct EmailPayload {
    email: String,
}

pub async fn verify_email(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    JsonBody(payload): JsonBody<VerifyEmailRequest>,
) -> ApiResult<EmailPayload> {
    let email = payload.email.unwrap_or_default();
    if email.trim().is_empty() {
        return Err(AppError::bad_request("email is required"));
    }
    if !is_valid_email(&email) {
        return Err(AppError::bad_request("invalid email format"));
    }

    let user = auth_service(&state)
        .find_by_email(&email)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to look up email");
            AppError::internal("failed to verify email")
        })?
        .ok_or_else(|| AppError::not_found("no account is registered with this email"))?;

    log_activity(
        &state,
        addr,
        user.id,
        &user.username,
        ActivityAction::EmailVerifyAttempt,
        format!("email verification for {}", user.email),
    )
    .await;

    Ok(Envelope::with_message(
        "email found, continue to reset the password",
        EmailPayload {
            email: normalize_email(&email),
        },
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
    pub new_password: Option<String>,
}

pub async fn forgot_password(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    JsonBody(payload): JsonBody<ForgotPasswordRequest>,
) -> ApiResult<Empty> {
    let email = payload.email.unwrap_or_default();
    let new_password = payload.new_password.unwrap_or_default();
    if email.trim().is_empty() || new_password.is_empty() {
        return Err(AppError::bad_request("email and newPassword are required"));
    }
    if new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let user = auth_service(&state)
        .reset_password(&email, &new_password)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to reset password");
            AppError::internal("failed to reset password")
        })?
        .ok_or_else(|| AppError::not_found("no account is registered with this email"))?;

    log_activity(
        &state,
        addr,
        user.id,
        &user.username,
        ActivityAction::PasswordReset,
        format!("password reset for {}", user.email),
    )
    .await;

    Ok(Envelope::message("password has been reset, please sign in again"))
}

// ---------------------------------------------------------------------------
// Threads
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct ThreadPayload {
    thread: Thread,
}

pub async fn list_threads(
    State(state): State<AppState>,
    QueryParams(query): QueryParams<ThreadListQuery>,
) -> ApiResult<Value> {
    let (page, limit, offset) = page_window(query.page, query.limit, DEFAULT_THREAD_PAGE_SIZE)?;
    let category_id = query
        .category
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| parse_uuid(value, "category"))
        .transpose()?;

    let cache_key = format!(
        "threads_{}_{}_{}",
        category_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "all".to_string()),
        page,
        limit
    );
    if let Some(cached) = state.response_cache.get(&cache_key) {
        return Ok(Envelope::ok(cached));
    }

    let (items, total) = ThreadService::new(state.db.clone())
        .list_threads(category_id, offset, limit)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list threads");
            AppError::internal("failed to list threads")
        })?;

    let payload = Page {
        items,
        pagination: Pagination::new(page, limit, total),
    };
    let value = cache_payload(&state, cache_key, &[THREAD_LISTS_TAG.to_string()], &payload)?;
    Ok(Envelope::ok(value))
}

pub async fn get_thread(
    State(state): State<AppState>,
    PathId(thread_id): PathId,
) -> ApiResult<Value> {
    let cache_key = format!("thread_{}", thread_id);
    if let Some(cached) = state.response_cache.get(&cache_key) {
        return Ok(Envelope::ok(cached));
    }

    let thread = ThreadService::new(state.db.clone())
        .get_thread(thread_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, thread_id = %thread_id, "failed to get thread");
            AppError::internal("failed to get thread")
        })?
        .ok_or_else(|| AppError::not_found("thread not found"))?;

    let value = cache_payload(
        &state,
        cache_key,
        &[thread_tag(thread_id)],
        &ThreadPayload { thread },
    )?;
    Ok(Envelope::ok(value))
}

async fn resolve_category(state: &AppState, raw: &str) -> Result<Uuid, AppError> {
    let category_id = parse_uuid(raw, "categoryId")?;
    let exists = CategoryService::new(state.db.clone())
        .category_exists(category_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to check category");
            AppError::internal("failed to check category")
        })?;
    if !exists {
        return Err(AppError::bad_request("category does not exist"));
    }
    Ok(category_id)
}

pub async fn create_thread(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    auth: AuthUser,
    form: FormData,
) -> ApiResult<ThreadPayload> {
    let (Some(title), Some(body)) = (form.text("title"), form.text("body")) else {
        return Err(AppError::bad_request("title and body are required"));
    };
    validate_title(&title)?;
    validate_body(&body)?;

    if let Some(user_id) = form.text("userId") {
        if parse_uuid(&user_id, "userId")? != auth.id {
            return Err(AppError::forbidden("userId does not match the signed-in user"));
        }
    }

    let category_id = match form.text("categoryId") {
        Some(raw) => Some(resolve_category(&state, &raw).await?),
        None => None,
    };
    let cover = form.image("cover", &state.storage)?;

    let new_thread = NewThread {
        title,
        body,
        tags: form.text("tags"),
        category_id,
        author_id: auth.id,
    };
    let service = ThreadService::new(state.db.clone());
    let thread = state
        .storage
        .replace_field(UploadKind::ThreadCover, cover.as_ref(), |cover_url| async move {
            let thread = service.create_thread(new_thread, cover_url).await?;
            Ok::<_, anyhow::Error>(Some(Replaced {
                value: thread,
                previous_url: None,
            }))
        })
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %auth.id, "failed to create thread");
            AppError::internal("failed to create thread")
        })?
        .ok_or_else(|| AppError::internal("failed to create thread"))?;

    state.response_cache.invalidate_tag(THREAD_LISTS_TAG);
    log_activity(
        &state,
        addr,
        auth.id,
        &auth.username,
        ActivityAction::CreateThread,
        format!("created thread: {}", thread.title),
    )
    .await;

    Ok(Envelope::with_message("thread created", ThreadPayload { thread }))
}

async fn load_thread(state: &AppState, thread_id: Uuid) -> Result<Thread, AppError> {
    ThreadService::new(state.db.clone())
        .get_thread(thread_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, thread_id = %thread_id, "failed to get thread");
            AppError::internal("failed to get thread")
        })?
        .ok_or_else(|| AppError::not_found("thread not found"))
}

pub async fn update_thread(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    auth: AuthUser,
    PathId(thread_id): PathId,
    form: FormData,
) -> ApiResult<ThreadPayload> {
    let existing = load_thread(&state, thread_id).await?;
    if !auth.can_modify(existing.author_id) {
        return Err(AppError::forbidden(
            "you do not have permission to edit this thread",
        ));
    }

    let title = form.text("title");
    let body = form.text("body");
    if let Some(title) = &title {
        validate_title(title)?;
    }
    if let Some(body) = &body {
        validate_body(body)?;
    }

    let category_id = if form.has_field("categoryId") {
        match form.text("categoryId") {
            Some(raw) => Some(Some(resolve_category(&state, &raw).await?)),
            None => Some(None),
        }
    } else {
        None
    };
    let cover = form.image("cover", &state.storage)?;

    let changes = ThreadChanges {
        title,
        body,
        tags: form.text("tags"),
        category_id,
    };
    let service = ThreadService::new(state.db.clone());
    let thread = state
        .storage
        .replace_field(UploadKind::ThreadCover, cover.as_ref(), |cover_url| async move {
            service.update_thread(thread_id, changes, cover_url).await
        })
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, thread_id = %thread_id, "failed to update thread");
            AppError::internal("failed to update thread")
        })?
        .ok_or_else(|| AppError::not_found("thread not found"))?;

    invalidate_thread(&state, thread_id);
    log_activity(
        &state,
        addr,
        auth.id,
        &auth.username,
        ActivityAction::EditThread,
        format!("edited thread: {}", thread.title),
    )
    .await;

    Ok(Envelope::with_message("thread updated", ThreadPayload { thread }))
}

pub async fn delete_thread(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    auth: AuthUser,
    PathId(thread_id): PathId,
) -> ApiResult<Empty> {
    let existing = load_thread(&state, thread_id).await?;
    if !auth.can_modify(existing.author_id) {
        return Err(AppError::forbidden(
            "you do not have permission to delete this thread",
        ));
    }

    let deleted = ThreadService::new(state.db.clone())
        .delete_thread(thread_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, thread_id = %thread_id, "failed to delete thread");
            AppError::internal("failed to delete thread")
        })?
        .ok_or_else(|| AppError::not_found("thread not found"))?;

    if let Some(cover_url) = &deleted.cover_url {
        state.storage.discard(cover_url).await;
    }
    for image_url in &deleted.comment_image_urls {
        state.storage.discard(image_url).await;
    }

    invalidate_thread(&state, thread_id);
    log_activity(
        &state,
        addr,
        auth.id,
        &auth.username,
        ActivityAction::DeleteThread,
        format!("deleted thread: {}", existing.title),
    )
    .await;

    Ok(Envelope::message("thread deleted"))
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct CommentPayload {
    comment: Comment,
}

pub async fn list_comments(
    State(state): State<AppState>,
    PathId(thread_id): PathId,
    QueryParams(query): QueryParams<PageQuery>,
) -> ApiResult<Value> {
    let (page, limit, offset) = page_window(query.page, query.limit, DEFAULT_COMMENT_PAGE_SIZE)?;

    let cache_key = format!("comments_{}_{}_{}", thread_id, page, limit);
    if let Some(cached) = state.response_cache.get(&cache_key) {
        return Ok(Envelope::ok(cached));
    }

    load_thread(&state, thread_id).await?;

    let (items, total) = CommentService::new(state.db.clone())
        .list_comments(thread_id, offset, limit)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, thread_id = %thread_id, "failed to list comments");
            AppError::internal("failed to list comments")
        })?;

    let payload = Page {
        items,
        pagination: Pagination::new(page, limit, total),
    };
    let value = cache_payload(&state, cache_key, &[thread_tag(thread_id)], &payload)?;
    Ok(Envelope::ok(value))
}

pub async fn create_comment(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    auth: AuthUser,
    PathId(thread_id): PathId,
    form: FormData,
) -> ApiResult<CommentPayload> {
    let body = form.text("body").unwrap_or_default();
    let image = form.image("image", &state.storage)?;
    if body.is_empty() && image.is_none() {
        return Err(AppError::bad_request("a comment needs text or an image"));
    }
    validate_body(&body)?;

    let thread = load_thread(&state, thread_id).await?;

    let service = CommentService::new(state.db.clone());
    let author_id = auth.id;
    let result = state
        .storage
        .replace_field(UploadKind::CommentImage, image.as_ref(), |image_url| async move {
            let comment = service
                .create_comment(thread_id, author_id, body, image_url)
                .await?;
            Ok::<_, anyhow::Error>(Some(Replaced {
                value: comment,
                previous_url: None,
            }))
        })
        .await;
    let comment = match result {
        Ok(Some(comment)) => comment,
        Ok(None) => return Err(AppError::internal("failed to create comment")),
        // thread deleted after it was loaded
        Err(err) if is_foreign_key_violation(&err, "comments_thread_id_fkey") => {
            return Err(AppError::not_found("thread not found"));
        }
        Err(err) => {
            tracing::error!(error = ?err, thread_id = %thread_id, "failed to create comment");
            return Err(AppError::internal("failed to create comment"));
        }
    };

    invalidate_thread(&state, thread_id);
    log_activity(
        &state,
        addr,
        auth.id,
        &auth.username,
        ActivityAction::CreateComment,
        format!("commented on: {}", thread.title),
    )
    .await;

    Ok(Envelope::with_message("comment added", CommentPayload { comment }))
}

async fn load_comment(state: &AppState, comment_id: Uuid) -> Result<Comment, AppError> {
    CommentService::new(state.db.clone())
        .get_comment(comment_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, comment_id = %comment_id, "failed to get comment");
            AppError::internal("failed to get comment")
        })?
        .ok_or_else(|| AppError::not_found("comment not found"))
}

pub async fn update_comment(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    auth: AuthUser,
    PathId(comment_id): PathId,
    form: FormData,
) -> ApiResult<CommentPayload> {
    let existing = load_comment(&state, comment_id).await?;
    if !auth.can_modify(existing.author_id) {
        return Err(AppError::forbidden(
            "you do not have permission to edit this comment",
        ));
    }

    let body = form
        .has_field("body")
        .then(|| form.text("body").unwrap_or_default());
    let image = form.image("image", &state.storage)?;

    let resulting_body = body.as_deref().unwrap_or(&existing.body);
    let keeps_image = image.is_some() || existing.image_url.is_some();
    if resulting_body.trim().is_empty() && !keeps_image {
        return Err(AppError::bad_request("a comment needs text or an image"));
    }
    validate_body(resulting_body)?;

    let service = CommentService::new(state.db.clone());
    let comment = state
        .storage
        .replace_field(UploadKind::CommentImage, image.as_ref(), |image_url| async move {
            service.update_comment(comment_id, body, image_url).await
        })
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, comment_id = %comment_id, "failed to update comment");
            AppError::internal("failed to update comment")
        })?
        .ok_or_else(|| AppError::not_found("comment not found"))?;

    invalidate_thread(&state, comment.thread_id);
    log_activity(
        &state,
        addr,
        auth.id,
        &auth.username,
        ActivityAction::EditComment,
        format!("edited comment {}", comment_id),
    )
    .await;

    Ok(Envelope::with_message("comment updated", CommentPayload { comment }))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    auth: AuthUser,
    PathId(comment_id): PathId,
) -> ApiResult<Empty> {
    let existing = load_comment(&state, comment_id).await?;
    if !auth.can_modify(existing.author_id) {
        return Err(AppError::forbidden(
            "you do not have permission to delete this comment",
        ));
    }

    let deleted = CommentService::new(state.db.clone())
        .delete_comment(comment_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, comment_id = %comment_id, "failed to delete comment");
            AppError::internal("failed to delete comment")
        })?
        .ok_or_else(|| AppError::not_found("comment not found"))?;

    if let Some(image_url) = &deleted.image_url {
        state.storage.discard(image_url).await;
    }

    invalidate_thread(&state, deleted.thread_id);
    log_activity(
        &state,
        addr,
        auth.id,
        &auth.username,
        ActivityAction::DeleteComment,
        format!("deleted comment {}", comment_id),
    )
    .await;

    Ok(Envelope::message("comment deleted"))
}

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct CategoriesPayload {
    categories: Vec<Category>,
}

#[derive(Serialize)]
pub struct CategoryPayload {
    category: Category,
}

#[derive(Deserialize)]
pub struct CategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<CategoriesPayload> {
    let categories = CategoryService::new(state.db.clone())
        .list_categories()
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list categories");
            AppError::internal("failed to list categories")
        })?;

    Ok(Envelope::ok(CategoriesPayload { categories }))
}

pub async fn create_category(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    JsonBody(payload): JsonBody<CategoryRequest>,
) -> ApiResult<CategoryPayload> {
    let name = payload.name.unwrap_or_default().trim().to_string();
    if name.is_empty() {
        return Err(AppError::bad_request("category name is required"));
    }
    let description = payload
        .description
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let outcome = CategoryService::new(state.db.clone())
        .create_category(&name, description)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to create category");
            AppError::internal("failed to create category")
        })?;

    match outcome {
        CreateCategory::Created(category) => Ok(Envelope::ok(CategoryPayload { category })),
        CreateCategory::NameTaken => Err(AppError::conflict("category name already exists")),
    }
}

pub async fn delete_category(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    PathId(category_id): PathId,
) -> ApiResult<Empty> {
    let deleted = CategoryService::new(state.db.clone())
        .delete_category(category_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, category_id = %category_id, "failed to delete category");
            AppError::internal("failed to delete category")
        })?;
    if !deleted {
        return Err(AppError::not_found("category not found"));
    }

    // cached thread payloads embed category ids
    state.response_cache.clear();
    Ok(Envelope::message("category deleted"))
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct UsersPayload {
    users: Vec<User>,
}

pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<UsersPayload> {
    let users = UserService::new(state.db.clone())
        .list_users()
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list users");
            AppError::internal("failed to list users")
        })?;

    Ok(Envelope::ok(UsersPayload { users }))
}

pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    PathId(user_id): PathId,
    form: FormData,
) -> ApiResult<UserPayload> {
    if auth.id != user_id && !auth.is_admin() {
        return Err(AppError::forbidden("you can only edit your own profile"));
    }

    let changes = ProfileChanges {
        username: form.text("username"),
        bio: form.text("bio"),
        social_link: form.text("socialLink"),
    };
    let avatar = form.image("avatar", &state.storage)?;

    let service = UserService::new(state.db.clone());
    let result = state
        .storage
        .replace_field(UploadKind::Avatar, avatar.as_ref(), |avatar_url| async move {
            service.update_profile(user_id, changes, avatar_url).await
        })
        .await;

    let user = match result {
        Ok(Some(user)) => user,
        Ok(None) => return Err(AppError::not_found("user not found")),
        Err(err) if is_unique_violation(&err, "users_username_key") => {
            return Err(AppError::conflict("username is already taken"));
        }
        Err(err) => {
            tracing::error!(error = ?err, user_id = %user_id, "failed to update profile");
            return Err(AppError::internal("failed to update profile"));
        }
    };

    // author summaries inside cached threads and comments may have changed
    state.response_cache.clear();
    Ok(Envelope::with_message("profile updated", UserPayload { user }))
}

#[derive(Deserialize)]
pub struct RoleRequest {
    pub role: Option<String>,
}

pub async fn update_role(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    PathId(user_id): PathId,
    JsonBody(payload): JsonBody<RoleRequest>,
) -> ApiResult<UserPayload> {
    let role = payload
        .role
        .as_deref()
        .map(str::trim)
        .and_then(Role::from_db)
        .ok_or_else(|| AppError::bad_request("role must be user or admin"))?;

    let user = UserService::new(state.db.clone())
        .update_role(user_id, role)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %user_id, "failed to update role");
            AppError::internal("failed to update role")
        })?
        .ok_or_else(|| AppError::not_found("user not found"))?;

    tracing::info!(admin_id = %admin.id, user_id = %user_id, role = role.as_db(), "role changed");
    Ok(Envelope::ok(UserPayload { user }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    PathId(user_id): PathId,
    JsonBody(payload): JsonBody<ChangePasswordRequest>,
) -> ApiResult<Empty> {
    if auth.id != user_id {
        return Err(AppError::forbidden("you can only change your own password"));
    }

    let old_password = payload.old_password.unwrap_or_default();
    let new_password = payload.new_password.unwrap_or_default();
    if old_password.is_empty() || new_password.is_empty() {
        return Err(AppError::bad_request("oldPassword and newPassword are required"));
    }
    if new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let outcome = auth_service(&state)
        .change_password(user_id, &old_password, &new_password)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, user_id = %user_id, "failed to change password");
            AppError::internal("failed to change password")
        })?;

    match outcome {
        PasswordChange::Changed => Ok(Envelope::message("password changed")),
        PasswordChange::WrongPassword => Err(AppError::unauthorized("current password is incorrect")),
        PasswordChange::UserNotFound => Err(AppError::not_found("user not found")),
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct ReportPayload {
    report: Report,
}

#[derive(Serialize)]
pub struct ReportsPayload {
    reports: Vec<Report>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReportRequest {
    pub thread_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateReportRequest {
    pub reason: Option<String>,
}

pub async fn create_report(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    auth: AuthUser,
    JsonBody(payload): JsonBody<CreateReportRequest>,
) -> ApiResult<ReportPayload> {
    let reason = payload.reason.unwrap_or_default().trim().to_string();
    let Some(thread_id) = payload.thread_id.filter(|value| !value.trim().is_empty()) else {
        return Err(AppError::bad_request("threadId and reason are required"));
    };
    if reason.is_empty() {
        return Err(AppError::bad_request("threadId and reason are required"));
    }
    let thread_id = parse_uuid(&thread_id, "threadId")?;

    let thread = load_thread(&state, thread_id).await?;
    if thread.author_id == auth.id || auth.is_admin() {
        return Err(AppError::forbidden("you cannot report this thread"));
    }

    let report = ReportService::new(state.documents.clone())
        .create_report(ReportBody {
            thread_id,
            thread_title: thread.title.clone(),
            reporter_id: auth.id,
            reporter_email: auth.email.clone(),
            reason,
        })
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, thread_id = %thread_id, "failed to create report");
            AppError::internal("failed to create report")
        })?;

    log_activity(
        &state,
        addr,
        auth.id,
        &auth.username,
        ActivityAction::Report,
        format!("reported thread: {}", thread.title),
    )
    .await;

    Ok(Envelope::with_message("report submitted", ReportPayload { report }))
}

pub async fn list_reports(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<ReportsPayload> {
    let reports = ReportService::new(state.documents.clone())
        .list_reports()
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list reports");
            AppError::internal("failed to list reports")
        })?;

    Ok(Envelope::ok(ReportsPayload { reports }))
}

pub async fn get_report(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    PathId(report_id): PathId,
) -> ApiResult<ReportPayload> {
    let report = ReportService::new(state.documents.clone())
        .get_report(report_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, report_id = %report_id, "failed to get report");
            AppError::internal("failed to get report")
        })?
        .ok_or_else(|| AppError::not_found("report not found"))?;

    Ok(Envelope::ok(ReportPayload { report }))
}

pub async fn update_report(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    PathId(report_id): PathId,
    JsonBody(payload): JsonBody<UpdateReportRequest>,
) -> ApiResult<ReportPayload> {
    let reason = payload.reason.unwrap_or_default().trim().to_string();
    if reason.is_empty() {
        return Err(AppError::bad_request("reason is required"));
    }

    let report = ReportService::new(state.documents.clone())
        .update_reason(report_id, &reason)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, report_id = %report_id, "failed to update report");
            AppError::internal("failed to update report")
        })?
        .ok_or_else(|| AppError::not_found("report not found"))?;

    Ok(Envelope::with_message("report updated", ReportPayload { report }))
}

pub async fn delete_report(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    PathId(report_id): PathId,
) -> ApiResult<Empty> {
    let deleted = ReportService::new(state.documents.clone())
        .delete_report(report_id)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, report_id = %report_id, "failed to delete report");
            AppError::internal("failed to delete report")
        })?;
    if !deleted {
        return Err(AppError::not_found("report not found"));
    }

    Ok(Envelope::message("report deleted"))
}

// ---------------------------------------------------------------------------
// Admin
// ---------------------------------------------------------------------------

pub async fn dashboard(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<DashboardStats> {
    let stats = DashboardService::new(state.db.clone())
        .stats()
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to build dashboard");
            AppError::internal("failed to load dashboard")
        })?;

    Ok(Envelope::ok(stats))
}

#[derive(Serialize)]
pub struct LogsPayload {
    logs: Vec<ActivityLog>,
    pagination: Pagination,
}

pub async fn list_logs(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    QueryParams(query): QueryParams<PageQuery>,
) -> ApiResult<LogsPayload> {
    let (page, limit, offset) = page_window(query.page, query.limit, DEFAULT_LOG_PAGE_SIZE)?;

    let (logs, total) = state
        .activity
        .list_logs(offset, limit)
        .await
        .map_err(|err| {
            tracing::error!(error = ?err, "failed to list activity logs");
            AppError::internal("failed to list logs")
        })?;

    Ok(Envelope::ok(LogsPayload {
        logs,
        pagination: Pagination::new(page, limit, total),
    }))
}
