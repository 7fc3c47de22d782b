/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::config::ServerConfig;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stories_core::follow_requests::FollowOutcome;
use stories_core::identity::bearer_token;
use stories_core::privacy::Privacy;
use stories_core::social_db::{now_ms, parse_id};
use stories_core::stories::ViewOutcome;
use stories_core::{ErrorKind, SocialDb, SocialError, UserId, UserRef};
use stories_protocol::{
    CreateStoryRequest, ErrorBody, FollowResponse, MessageResponse, RegisterRequest, RegisterResponse,
    ToggleResponse, ViewResponse,
};
use tower_http::trace::TraceLayer;
use tracing::{error, info_span};

static REQ_ID: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> String {
    let id = REQ_ID.fetch_add(1, Ordering::Relaxed);
    format!("req-{id}")
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SocialDb>,
    pub cfg: Arc<ServerConfig>,
}

pub fn router(state: AppState) -> Router {
    let max_body = state.cfg.max_body_bytes;
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/auth/register", post(register))
        .route("/auth/me", get(me))
        .route("/auth/toggle", patch(toggle))
        .route("/follow/requests", get(pending_requests))
        .route("/follow/requests/:id/accept", post(accept_request))
        .route("/follow/requests/:id/reject", post(reject_request))
        .route("/follow/following/:target", get(following))
        .route("/follow/followers/:target", get(followers))
        .route("/follow/:target", post(follow).delete(unfollow))
        .route("/stories/add", post(add_story))
        .route("/stories/feed", get(feed))
        .route("/stories/user/:target", get(user_stories))
        .route("/stories/:id", delete(delete_story))
        .route("/stories/:id/view", post(view_story))
        .route("/stories/:id/views", get(story_views))
        .layer(axum::extract::DefaultBodyLimit::max(max_body))
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
                let request_id = req
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("req");
                info_span!(
                    "http",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %request_id
                )
            }),
        )
        .layer(from_fn(ensure_request_ids))
        .with_state(state)
}

async fn ensure_request_ids(mut req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let headers = req.headers_mut();
    if headers.get("x-request-id").is_none() {
        let request_id = next_request_id();
        headers.insert(
            "x-request-id",
            HeaderValue::from_str(&request_id).unwrap_or_else(|_| HeaderValue::from_static("req")),
        );
    }
    let request_id = headers.get("x-request-id").cloned();
    let mut resp = next.run(req).await;
    if let Some(v) = request_id {
        resp.headers_mut().insert("x-request-id", v);
    }
    resp
}

/// HTTP face of [`SocialError`].
#[derive(Debug)]
pub struct ApiError(SocialError);

impl From<SocialError> for ApiError {
    fn from(e: SocialError) -> Self {
        Self(e)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::SelfFollow | ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::Retrieval => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        let message = match &self.0 {
            SocialError::Retrieval(e) => {
                error!("request failed: {e:#}");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.0.code().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Runs a storage call off the async runtime.
async fn with_db<T, F>(state: &AppState, f: F) -> ApiResult<T>
where
    F: FnOnce(&SocialDb) -> stories_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = state.db.clone();
    let out = tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| SocialError::Retrieval(anyhow::Error::new(e).context("db task")))?;
    Ok(out?)
}

async fn caller(state: &AppState, headers: &HeaderMap) -> ApiResult<UserId> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .ok_or(SocialError::Unauthenticated)?
        .to_string();
    with_db(state, move |db| db.authenticate(&token)).await
}

/// Malformed bodies answer with the same error shape as every other failure.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(v)| v)
        .map_err(|e| SocialError::Validation(e.body_text()).into())
}

fn message(text: &str) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: text.to_string(),
    })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<AppState>) -> Response {
    match with_db(&state, |db| db.health_check()).await {
        Ok(()) => (StatusCode::OK, "ready").into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "db not ready").into_response(),
    }
}

async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<Response> {
    if !state.cfg.allow_register {
        return Err(SocialError::Forbidden("registration disabled").into());
    }
    let req = json_body(body)?;
    let privacy = if req.private { Privacy::Private } else { Privacy::Public };
    let (user, token) =
        with_db(&state, move |db| db.register(&req.username, req.avatar_url.as_deref(), privacy)).await?;
    let body = RegisterResponse {
        user_id: user.id,
        username: user.username,
        token,
    };
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let me = caller(&state, &headers).await?;
    let user = with_db(&state, move |db| db.me(me)).await?;
    Ok(Json(user).into_response())
}

async fn toggle(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<ToggleResponse>> {
    let me = caller(&state, &headers).await?;
    let toggled = with_db(&state, move |db| db.toggle_privacy(me)).await?;
    Ok(Json(ToggleResponse {
        privacy: toggled.privacy.as_str().to_string(),
        auto_accepted: toggled.auto_accepted,
    }))
}

async fn follow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(target): Path<String>,
) -> ApiResult<Response> {
    let me = caller(&state, &headers).await?;
    let target = UserRef::parse(&target)?;
    let (followee, outcome) = with_db(&state, move |db| db.follow(me, &target)).await?;
    let status = match outcome {
        FollowOutcome::Followed => StatusCode::CREATED,
        FollowOutcome::Requested => StatusCode::ACCEPTED,
    };
    let body = FollowResponse {
        follower_id: me,
        followee_id: followee,
        status: outcome.as_str().to_string(),
    };
    Ok((status, Json(body)).into_response())
}

async fn unfollow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(target): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let me = caller(&state, &headers).await?;
    let target = UserRef::parse(&target)?;
    let removed = with_db(&state, move |db| {
        let followee = db.resolve_user(&target)?.id;
        db.delete_edge(me, followee)
    })
    .await?;
    Ok(message(if removed { "unfollowed" } else { "not following" }))
}

async fn following(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(target): Path<String>,
) -> ApiResult<Response> {
    caller(&state, &headers).await?;
    let target = UserRef::parse(&target)?;
    let list = with_db(&state, move |db| {
        let user = db.resolve_user(&target)?.id;
        db.list_following(user)
    })
    .await?;
    Ok(Json(list).into_response())
}

async fn followers(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(target): Path<String>,
) -> ApiResult<Response> {
    caller(&state, &headers).await?;
    let target = UserRef::parse(&target)?;
    let list = with_db(&state, move |db| {
        let user = db.resolve_user(&target)?.id;
        db.list_followers(user)
    })
    .await?;
    Ok(Json(list).into_response())
}

async fn pending_requests(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let me = caller(&state, &headers).await?;
    let list = with_db(&state, move |db| db.list_pending_requests(me)).await?;
    Ok(Json(list).into_response())
}

async fn accept_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let me = caller(&state, &headers).await?;
    let follower = parse_id(&id, "user id")?;
    with_db(&state, move |db| db.accept_request(me, follower)).await?;
    Ok(message("follow request accepted"))
}

async fn reject_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let me = caller(&state, &headers).await?;
    let follower = parse_id(&id, "user id")?;
    with_db(&state, move |db| db.reject_request(me, follower)).await?;
    Ok(message("follow request rejected"))
}

async fn add_story(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateStoryRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let me = caller(&state, &headers).await?;
    let req = json_body(body)?;
    let story = with_db(&state, move |db| {
        db.create_story(me, &req.media_url, &req.media_type, req.ttl_minutes, now_ms())
    })
    .await?;
    Ok((StatusCode::CREATED, Json(story)).into_response())
}

async fn feed(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    let me = caller(&state, &headers).await?;
    let blocks = with_db(&state, move |db| db.compose_feed(me, now_ms())).await?;
    Ok(Json(blocks).into_response())
}

async fn user_stories(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(target): Path<String>,
) -> ApiResult<Response> {
    let me = caller(&state, &headers).await?;
    let target = UserRef::parse(&target)?;
    let stories = with_db(&state, move |db| {
        let owner = db.resolve_user(&target)?.id;
        db.user_stories(me, owner, now_ms())
    })
    .await?;
    Ok(Json(stories).into_response())
}

async fn delete_story(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    let me = caller(&state, &headers).await?;
    let id = parse_id(&id, "story id")?;
    with_db(&state, move |db| db.delete_story(id, me)).await?;
    Ok(message("story deleted"))
}

async fn view_story(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let me = caller(&state, &headers).await?;
    let id = parse_id(&id, "story id")?;
    let outcome = with_db(&state, move |db| db.record_view(id, me, now_ms())).await?;
    let (status, label) = match outcome {
        ViewOutcome::Recorded => (StatusCode::CREATED, "recorded"),
        ViewOutcome::AlreadyViewed => (StatusCode::OK, "already_viewed"),
    };
    let body = ViewResponse {
        story_id: id,
        status: label.to_string(),
    };
    Ok((status, Json(body)).into_response())
}

async fn story_views(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let me = caller(&state, &headers).await?;
    let id = parse_id(&id, "story id")?;
    let views = with_db(&state, move |db| db.list_views(id, me)).await?;
    Ok(Json(views).into_response())
}
