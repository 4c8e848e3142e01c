use axum::{
	Json, Router,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ember_domain::RagQuery;
use ember_service::StoreRequest;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/memory/store", post(store))
		.route("/v1/memory/query", post(query))
		.route("/v1/memory/status", get(status))
		.route("/v1/context/retrieve", post(retrieve_context))
		.route("/v1/context/invalidate", post(invalidate_contexts))
		.route("/v1/privacy/sanitize", post(sanitize))
		.route("/v1/privacy/audit", post(audit))
		.route("/v1/privacy/validate", post(validate))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

#[derive(Debug, Serialize)]
struct StoreResponse {
	id: Uuid,
}

async fn store(
	State(state): State<AppState>,
	Json(payload): Json<StoreRequest>,
) -> Result<Json<StoreResponse>, ApiError> {
	let id = state.service.store(payload).await?;

	Ok(Json(StoreResponse { id }))
}

async fn query(
	State(state): State<AppState>,
	Json(payload): Json<RagQuery>,
) -> Result<Json<ember_service::QueryResponse>, ApiError> {
	let response = state.service.query(&payload).await?;

	Ok(Json(response))
}

async fn status(State(state): State<AppState>) -> Json<ember_service::ProductionStatus> {
	Json(state.service.production_status())
}

#[derive(Debug, Deserialize)]
struct ContextRequest {
	agent_id: String,
	file_path: String,
	content: String,
	#[serde(default = "default_top_k")]
	top_k: u32,
}

fn default_top_k() -> u32 {
	5
}

async fn retrieve_context(
	State(state): State<AppState>,
	Json(payload): Json<ContextRequest>,
) -> Result<Json<ember_service::RagContext>, ApiError> {
	let context = state
		.service
		.retrieve_context(&payload.agent_id, &payload.file_path, &payload.content, payload.top_k)
		.await?;

	Ok(Json(context))
}

async fn invalidate_contexts(State(state): State<AppState>) -> StatusCode {
	state.service.invalidate_contexts();

	StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
struct TextBody {
	text: String,
}

async fn sanitize(
	State(state): State<AppState>,
	Json(payload): Json<TextBody>,
) -> Json<ember_privacy::SanitizationResult> {
	Json(state.service.auditor().sanitize(&payload.text))
}

#[derive(Debug, Deserialize)]
struct AuditBody {
	patterns: Vec<String>,
}

async fn audit(
	State(state): State<AppState>,
	Json(payload): Json<AuditBody>,
) -> Json<ember_privacy::AuditReport> {
	Json(state.service.auditor().audit_public_rag_patterns(&payload.patterns).await)
}

async fn validate(
	State(state): State<AppState>,
	Json(payload): Json<TextBody>,
) -> Json<ember_privacy::PatternValidation> {
	Json(state.service.auditor().validate_pattern(&payload.text))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: &'static str,
	message: String,
}

impl From<ember_service::Error> for ApiError {
	fn from(err: ember_service::Error) -> Self {
		use ember_service::Error;

		let (status, error_code) = match &err {
			Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
			Error::SanitizationRejected { .. } =>
				(StatusCode::UNPROCESSABLE_ENTITY, "privacy_rejected"),
			Error::Embedding(_) => (StatusCode::BAD_GATEWAY, "embedding_failure"),
			Error::Backend(_) => (StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable"),
			Error::Privacy(_) => (StatusCode::INTERNAL_SERVER_ERROR, "privacy_failure"),
		};

		Self { status, error_code, message: err.to_string() }
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody {
			error_code: self.error_code.to_string(),
			message: self.message,
		};

		(self.status, Json(body)).into_response()
	}
}
