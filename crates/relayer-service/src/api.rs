//! HTTP API server for the relayer.
//!
//! Thin transport layer: handlers deserialize the request, call the
//! engine, and wrap the outcome in the response envelope. All policy
//! (validation order, strategy choice, at-most-once claims) lives in
//! `relayer-core`.

use axum::{
	extract::{rejection::JsonRejection, Path, State},
	http::StatusCode,
	response::{IntoResponse, Json, Response},
	routing::{get, post},
	Router,
};
use relayer_core::RelayerEngine;
use relayer_types::{
	ExecuteRequest, ExecutionResponse, OperationResponse, PrepareRequest, PrepareResponse,
	RelayerError, SubmitRequest,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// API server owning the listening port and the shared engine.
pub struct ApiServer {
	engine: Arc<RelayerEngine>,
	port: u16,
}

impl ApiServer {
	pub fn new(engine: Arc<RelayerEngine>, port: u16) -> Self {
		Self { engine, port }
	}

	pub async fn run(self) -> anyhow::Result<()> {
		let shared_state = AppState {
			engine: self.engine,
		};

		let app = router(shared_state);

		let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", self.port)).await?;

		info!("API server listening on port {}", self.port);

		axum::serve(listener, app).await?;

		Ok(())
	}
}

fn router(state: AppState) -> Router {
	Router::new()
		.route("/prepare", post(prepare))
		.route("/submit", post(submit))
		.route("/execute", post(execute))
		.route("/operations/{id}", get(get_operation))
		.route("/health", get(health_check))
		.with_state(state)
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

#[derive(Clone)]
struct AppState {
	engine: Arc<RelayerEngine>,
}

/// Engine error carried across the handler boundary; renders as the
/// standard error envelope with the taxonomy's stable code.
struct ApiError(RelayerError);

impl From<RelayerError> for ApiError {
	fn from(e: RelayerError) -> Self {
		Self(e)
	}
}

/// A body that fails extraction (bad JSON, wrong types, missing fields)
/// gets the same envelope as any other malformed request instead of
/// axum's plain-text default.
impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		Self(RelayerError::MalformedRequest(rejection.body_text()))
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(status_for(&self.0), Json(ExecutionResponse::err(&self.0))).into_response()
	}
}

/// HTTP status for each error class. Codes in the body are the
/// machine-readable contract; statuses follow them for conventional
/// clients.
fn status_for(error: &RelayerError) -> StatusCode {
	match error {
		RelayerError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
		RelayerError::InvalidSignature => StatusCode::UNAUTHORIZED,
		RelayerError::Expired { .. } => StatusCode::BAD_REQUEST,
		RelayerError::NonceMismatch { .. } => StatusCode::CONFLICT,
		RelayerError::InsufficientAllowance { .. } => StatusCode::BAD_REQUEST,
		RelayerError::SponsorshipUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
		RelayerError::ChainRevert { .. } => StatusCode::UNPROCESSABLE_ENTITY,
		RelayerError::RpcUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
		RelayerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
		RelayerError::OperationNotFound(_) => StatusCode::NOT_FOUND,
		RelayerError::OperationExpired(_) => StatusCode::GONE,
		RelayerError::OperationConsumed(_) => StatusCode::CONFLICT,
		RelayerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
	}
}

/// `POST /prepare`: build the unsigned intent and its typed-data payload.
async fn prepare(
	State(state): State<AppState>,
	payload: Result<Json<PrepareRequest>, JsonRejection>,
) -> Result<Json<PrepareResponse>, ApiError> {
	let Json(req) = payload?;
	let prepared = state.engine.prepare(req).await?;
	Ok(Json(PrepareResponse {
		success: true,
		op_id: prepared.op_id,
		typed_data: prepared.typed_data,
	}))
}

/// `POST /submit`: attach the signature to a prepared operation and
/// execute it.
async fn submit(
	State(state): State<AppState>,
	payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<ExecutionResponse>, ApiError> {
	let Json(req) = payload?;
	let result = state
		.engine
		.submit(&req.op_id, &req.signature, req.permit.as_ref())
		.await?;
	Ok(Json(ExecutionResponse::ok(&result)))
}

/// `POST /execute`: single-shot variant carrying the full signed intent.
async fn execute(
	State(state): State<AppState>,
	payload: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<ExecutionResponse>, ApiError> {
	let Json(req) = payload?;
	let result = state.engine.execute(req).await?;
	Ok(Json(ExecutionResponse::ok(&result)))
}

/// `GET /operations/{id}`: current lifecycle state of an operation.
async fn get_operation(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<OperationResponse>, ApiError> {
	let op = state.engine.operation(&id)?;
	Ok(Json(OperationResponse {
		success: true,
		op_id: op.op_id,
		status: op.status.as_str().to_string(),
		tx_hash: op.tx_hash,
		created_at: op.created_at,
	}))
}

/// Basic health check.
async fn health_check() -> Json<serde_json::Value> {
	Json(serde_json::json!({
		"status": "ok",
		"timestamp": chrono::Utc::now().timestamp()
	}))
}
