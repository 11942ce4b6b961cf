mod config;
mod handlers;

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Router,
    http::{Method, StatusCode, header},
    routing::{delete, get},
};
pub use config::{ActivitySeed, AppConfig, ConfigError, TierSeed};
use familypoints_shared::api::{API_V1_PREFIX, ErrorDto};
use familypoints_shared::domain::{Participant, ParticipantId};
use familypoints_shared::report::ParticipantStanding;
use familypoints_shared::{ValidationError, compute_total_points, resolve_tier};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info_span;
use uuid::Uuid;

use crate::storage::{StorageError, Store};

type TotalsCacheMap = Arc<Mutex<HashMap<ParticipantId, Arc<Mutex<Option<i64>>>>>>;
type TotalGuard<'a> = MutexGuard<'a, Option<i64>>;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
    // Point total per participant. None => needs recompute
    totals_cache: TotalsCacheMap,
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: AppConfig, store: Store) -> Self {
        Self {
            config,
            store,
            totals_cache: Default::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    async fn participant_mutex(&self, id: &ParticipantId) -> Arc<Mutex<Option<i64>>> {
        let mut map = self.totals_cache.lock().await;
        map.entry(id.clone()).or_insert_with(Default::default).clone()
    }

    fn reset_total(&self, guard: &mut TotalGuard<'_>) {
        guard.take();
    }

    async fn total_points(
        &self,
        id: &ParticipantId,
        guard: &mut TotalGuard<'_>,
    ) -> Result<i64, AppError> {
        if let Some(v) = **guard {
            return Ok(v);
        }
        let records = self
            .store
            .list_records_for_participant(id.as_str())
            .await?;
        let v = compute_total_points(id, &records);
        **guard = Some(v);
        Ok(v)
    }

    /// Current total and tier of one participant.
    async fn standing(&self, participant: Participant) -> Result<ParticipantStanding, AppError> {
        let lock = self.participant_mutex(&participant.id).await;
        let mut guard = lock.lock().await;
        self.standing_locked(participant, &mut guard).await
    }

    async fn standing_locked(
        &self,
        participant: Participant,
        guard: &mut TotalGuard<'_>,
    ) -> Result<ParticipantStanding, AppError> {
        let total_points = self.total_points(&participant.id, guard).await?;
        let tiers = self.store.list_tiers().await?;
        let tier = resolve_tier(total_points, &tiers, self.config.tier_mode)?
            .tier()
            .cloned();
        Ok(ParticipantStanding {
            participant,
            total_points,
            tier,
        })
    }

    async fn forget_participant(&self, id: &ParticipantId) {
        self.totals_cache.lock().await.remove(id);
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/version", get(handlers::api_version))
        .route("/dashboard", get(handlers::api_dashboard))
        .route(
            "/families",
            get(handlers::api_list_families).post(handlers::api_create_family),
        )
        .route(
            "/families/{id}",
            get(handlers::api_get_family).delete(handlers::api_delete_family),
        )
        .route(
            "/families/{id}/participants",
            get(handlers::api_list_family_participants).post(handlers::api_create_participant),
        )
        .route(
            "/participants/{id}",
            get(handlers::api_get_participant).delete(handlers::api_delete_participant),
        )
        .route(
            "/participants/{id}/records",
            get(handlers::api_list_records).post(handlers::api_record_participation),
        )
        .route(
            "/activities",
            get(handlers::api_list_activities).post(handlers::api_create_activity),
        )
        .route("/activities/{id}", delete(handlers::api_delete_activity))
        .route(
            "/tiers",
            get(handlers::api_list_tiers).post(handlers::api_create_tier),
        )
        .route("/tiers/{id}", delete(handlers::api_delete_tier))
        .route("/reports", get(handlers::api_report));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .nest(API_V1_PREFIX, v1)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured
    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> AxumResponse {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    resp
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> AxumResponse {
    let is_api = req.uri().path().starts_with("/api/") || req.uri().path() == "/healthz";
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );

    // Point totals change with every record; never cache API responses
    if is_api {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
    }

    resp
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn conflict<T: Into<String>>(msg: T) -> Self {
        Self::Conflict(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::OverlappingTiers { .. } | ValidationError::TierGap { .. } => {
                AppError::conflict(err.to_string())
            }
            _ => AppError::bad_request(err.to_string()),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        use diesel::result::{DatabaseErrorKind, Error as DieselError};
        match err {
            StorageError::Invalid(v) => v.into(),
            StorageError::InUse(m) => AppError::conflict(m),
            StorageError::InvalidInput(m) => AppError::bad_request(m),
            StorageError::Database(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            )) => AppError::conflict("id already exists"),
            StorageError::Database(DieselError::DatabaseError(
                DatabaseErrorKind::ForeignKeyViolation,
                info,
            )) => AppError::bad_request(format!("foreign key violation: {}", info.message())),
            other => AppError::internal(other),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m, "conflict", None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else {
            tracing::warn!(status = %status, kind = kind, message = %msg, "request rejected");
        }
        let body = axum::Json(ErrorDto {
            error: msg,
            kind: kind.to_string(),
        });
        (status, body).into_response()
    }
}
