// © 2025 Maximilian Marx
// SPDX-FileContributor: Maximilian Marx
//
// SPDX-License-Identifier: EUPL-1.2

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{
        HeaderValue, Method, StatusCode,
        header::{CONTENT_TYPE, REFERRER_POLICY, RETRY_AFTER, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::{task, time};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
};

use crate::{
    config,
    favorites::{Candidate, Clock, Favorite, Invalid},
    rate_limit::{self, RateLimiter},
    store::{FavoriteStore, StoreError},
};

#[derive(Debug, Error)]
pub(crate) enum ApiError {
    #[error(transparent)]
    Invalid(#[from] Invalid),

    #[error("request body exceeds the size limit")]
    PayloadTooLarge,

    #[error("favorite {0:?} already exists")]
    Conflict(String),

    #[error("favorite {0:?} does not exist")]
    NotFound(String),

    #[error("no such route")]
    NoRoute,

    #[error("method not allowed on this route")]
    MethodNotAllowed,

    #[error("rate limit exceeded")]
    RateLimited { retry_after: u64 },

    #[error("storage failed: {0}")]
    Storage(StoreError),

    #[error("storage did not answer within {0:?}")]
    Timeout(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(id) => Self::Conflict(id),
            err => Self::Storage(err),
        }
    }
}

impl ApiError {
    pub(crate) fn status_code(&self) -> StatusCode {
        match self {
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) | Self::NoRoute => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Storage(_) | Self::Timeout(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Invalid(invalid) => invalid.to_string(),
            Self::PayloadTooLarge => "request body too large".to_string(),
            Self::Conflict(_) => "favorite already exists".to_string(),
            Self::NotFound(_) => "favorite not found".to_string(),
            Self::NoRoute => "not found".to_string(),
            Self::MethodNotAllowed => "method not allowed".to_string(),
            Self::RateLimited { .. } => "too many requests, try again later".to_string(),
            // never hand storage details to the client
            Self::Storage(_) | Self::Timeout(_) | Self::Internal(_) => {
                log::error!("{self}");
                "internal server error".to_string()
            }
        };

        let mut response = (status, Json(json!({ "error": message }))).into_response();
        if let Self::RateLimited { retry_after } = self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after));
        }

        response
    }
}

/// The favorites collection together with the clock stamping new entries.
#[derive(Clone)]
pub(crate) struct Favorites {
    store: Arc<dyn FavoriteStore>,
    clock: Arc<Clock>,
}

impl Favorites {
    pub(crate) fn new(store: Arc<dyn FavoriteStore>) -> Self {
        Self {
            store,
            clock: Arc::new(Clock::default()),
        }
    }
}

#[derive(Clone)]
struct AppState {
    favorites: Favorites,
    timeout: Duration,
}

impl AppState {
    /// Runs `operation` on the blocking pool, bounded by the request timeout.
    ///
    /// A timed-out operation is not cancelled. It still runs to completion,
    /// so a create answered with 500 may land anyway and a retry then gets 409.
    async fn run<T, F>(&self, operation: F) -> Result<T, ApiError>
    where
        F: FnOnce(&dyn FavoriteStore) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.favorites.store);
        let mut task = task::spawn_blocking(move || operation(store.as_ref()));

        let outcome = time::timeout(self.timeout, &mut task).await;
        match outcome {
            Err(_) => {
                tokio::spawn(async move {
                    if let Ok(Ok(_)) = task.await {
                        log::warn!("storage operation completed after its request timed out");
                    }
                });
                Err(ApiError::Timeout(self.timeout))
            }
            Ok(Err(err)) => Err(ApiError::Internal(format!("storage task failed: {err}"))),
            Ok(Ok(result)) => result.map_err(ApiError::from),
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn list(State(state): State<AppState>) -> Result<Json<Vec<Favorite>>, ApiError> {
    Ok(Json(state.run(|store| store.list()).await?))
}

async fn create(
    State(state): State<AppState>,
    payload: Result<Json<Candidate>, JsonRejection>,
) -> Result<(StatusCode, Json<Favorite>), ApiError> {
    let Json(candidate) = payload.map_err(|rejection| {
        log::debug!("rejecting create request: {rejection}");
        match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => ApiError::PayloadTooLarge,
            _ => Invalid::Malformed.into(),
        }
    })?;
    let favorite = candidate.favorite(&state.favorites.clock)?;

    // the store's own uniqueness check catches creates racing past this lookup
    let created = state
        .run(move |store| {
            if store.get(&favorite.id)?.is_some() {
                return Err(StoreError::Duplicate(favorite.id));
            }
            store.insert(favorite)
        })
        .await?;

    log::debug!("created favorite {:?}", created.id);
    Ok((StatusCode::CREATED, Json(created)))
}

async fn remove(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let Path(id) = id.map_err(|rejection| {
        log::debug!("rejecting delete request: {rejection}");
        ApiError::from(Invalid::MalformedId)
    })?;
    let key = id.clone();
    if state.run(move |store| store.delete(&key)).await? {
        log::debug!("deleted favorite {id:?}");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(id))
    }
}

async fn fallback() -> ApiError {
    ApiError::NoRoute
}

async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

fn panicked(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown cause");

    ApiError::Internal(format!("handler panicked: {detail}")).into_response()
}

/// Outermost layers: a JSON 500 for any panic, and security headers.
fn harden(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(panicked))
        .layer(SetResponseHeaderLayer::if_not_present(
            X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
}

pub(crate) fn router(settings: &config::Server, favorites: Favorites) -> Router {
    let state = AppState {
        favorites,
        timeout: settings.request_timeout(),
    };
    let limiter = Arc::new(RateLimiter::new(settings.rate_limit().clone()));
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(settings.origins().iter().cloned()))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);

    let router = Router::new()
        .route("/health", get(health))
        .route("/favorites", get(list).post(create))
        .route("/favorites/{id}", delete(remove))
        .fallback(fallback)
        .method_not_allowed_fallback(method_not_allowed)
        .with_state(state)
        .layer(DefaultBodyLimit::max(settings.body_limit()))
        .layer(middleware::from_fn_with_state(limiter, rate_limit::limit))
        .layer(cors);

    harden(router)
}
