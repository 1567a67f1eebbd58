use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use casetrack_api::{
    AccessTokenResponse, ApiError, Caller, CaseTrackApi, CreateCaseRequest, CreateTaskRequest,
    TokenPair, TokenRefreshRequest, TokenRequest, UpdateCaseRequest, UpdateTaskRequest,
};
use casetrack_core::{CaseId, CaseRecord, TaskId, TaskRecord};
use clap::Parser;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct ServiceState {
    api: CaseTrackApi,
}

#[derive(Debug, Parser)]
#[command(name = "casetrack-service")]
#[command(about = "HTTP service for CaseTrack")]
struct Args {
    #[arg(long, default_value = "./casetrack.sqlite3")]
    db: PathBuf,
    #[arg(long, default_value = "127.0.0.1:8000")]
    bind: SocketAddr,
    /// Shared secret used to sign and verify access/refresh tokens.
    #[arg(long, env = "CASETRACK_JWT_SECRET")]
    jwt_secret: String,
}

struct ServiceError(ApiError);

impl From<ApiError> for ServiceError {
    fn from(err: ApiError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self.0 {
            ApiError::Unauthorized(detail) => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "detail": detail }))).into_response()
            }
            ApiError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." }))).into_response()
            }
            ApiError::Validation { field, message } => {
                (StatusCode::BAD_REQUEST, Json(json!({ field: [message] }))).into_response()
            }
            ApiError::Internal(err) => {
                error!(error = %err, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "detail": "Internal server error." })),
                )
                    .into_response()
            }
        }
    }
}

fn unauthorized(detail: &str) -> ServiceError {
    ServiceError(ApiError::Unauthorized(detail.to_string()))
}

/// The authenticated caller, extracted from the bearer access token.
///
/// Rejections reuse the 401 body shape of every other auth failure.
#[derive(Debug, Clone)]
struct AuthCaller(Caller);

#[axum::async_trait]
impl FromRequestParts<ServiceState> for AuthCaller {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let token = match header {
            Some(value) => match value.strip_prefix("Bearer ") {
                Some(token) => token,
                None => return Err(unauthorized("Invalid Authorization header.")),
            },
            None => return Err(unauthorized("Authentication credentials were not provided.")),
        };

        let caller = state.api.verify_access_token(token)?;
        Ok(Self(caller))
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/api/token/", post(token_obtain))
        .route("/api/token/refresh/", post(token_refresh))
        .route("/cases/", get(cases_list).post(cases_create))
        .route(
            "/case/:id/",
            get(case_retrieve).patch(case_update).delete(case_destroy),
        )
        .route("/tasks/", get(tasks_list).post(tasks_create))
        .route(
            "/task/:id/",
            get(task_retrieve).patch(task_update).delete(task_destroy),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let state = ServiceState { api: CaseTrackApi::new(args.db, args.jwt_secret) };
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!(bind = %args.bind, "casetrack service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn token_obtain(
    State(state): State<ServiceState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<TokenPair>, ServiceError> {
    Ok(Json(state.api.obtain_token_pair(&request)?))
}

async fn token_refresh(
    State(state): State<ServiceState>,
    Json(request): Json<TokenRefreshRequest>,
) -> Result<Json<AccessTokenResponse>, ServiceError> {
    Ok(Json(state.api.refresh_access_token(&request)?))
}

async fn cases_list(
    State(state): State<ServiceState>,
    AuthCaller(caller): AuthCaller,
) -> Result<Json<Vec<CaseRecord>>, ServiceError> {
    Ok(Json(state.api.list_cases(&caller)?))
}

async fn cases_create(
    State(state): State<ServiceState>,
    AuthCaller(caller): AuthCaller,
    Json(request): Json<CreateCaseRequest>,
) -> Result<(StatusCode, Json<CaseRecord>), ServiceError> {
    let case = state.api.create_case(&caller, request)?;
    Ok((StatusCode::CREATED, Json(case)))
}

async fn case_retrieve(
    State(state): State<ServiceState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<i64>,
) -> Result<Json<CaseRecord>, ServiceError> {
    Ok(Json(state.api.get_case(&caller, CaseId(id))?))
}

async fn case_update(
    State(state): State<ServiceState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<i64>,
    Json(request): Json<UpdateCaseRequest>,
) -> Result<Json<CaseRecord>, ServiceError> {
    Ok(Json(state.api.update_case(&caller, CaseId(id), request)?))
}

async fn case_destroy(
    State(state): State<ServiceState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServiceError> {
    state.api.delete_case(&caller, CaseId(id))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn tasks_list(
    State(state): State<ServiceState>,
    AuthCaller(caller): AuthCaller,
) -> Result<Json<Vec<TaskRecord>>, ServiceError> {
    Ok(Json(state.api.list_tasks(&caller)?))
}

async fn tasks_create(
    State(state): State<ServiceState>,
    AuthCaller(caller): AuthCaller,
    Json(request): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskRecord>), ServiceError> {
    let task = state.api.create_task(&caller, request)?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn task_retrieve(
    State(state): State<ServiceState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<i64>,
) -> Result<Json<TaskRecord>, ServiceError> {
    Ok(Json(state.api.get_task(&caller, TaskId(id))?))
}

async fn task_update(
    State(state): State<ServiceState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<i64>,
    Json(request): Json<UpdateTaskRequest>,
) -> Result<Json<TaskRecord>, ServiceError> {
    Ok(Json(state.api.update_task(&caller, TaskId(id), request)?))
}

async fn task_destroy(
    State(state): State<ServiceState>,
    AuthCaller(caller): AuthCaller,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServiceError> {
    state.api.delete_task(&caller, TaskId(id))?;
    Ok(StatusCode::NO_CONTENT)
}
