use axum::{
	Json, Router,
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Response},
	routing::{get, post},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dossier_domain::KnowledgeBaseDescriptor;
use dossier_service::{ConversationHistory, Message, SearchFilter};

use crate::state::{AppState, SessionBusy};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
	#[serde(default)]
	pub session_id: Option<String>,
	pub query: String,
	#[serde(default)]
	pub filter: Option<SearchFilter>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
	pub session_id: String,
	pub message: Message,
}

#[derive(Debug, Serialize)]
pub struct KnowledgeBasesResponse {
	pub knowledge_bases: Vec<KnowledgeBaseDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
	pub session_id: String,
	pub messages: ConversationHistory,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(health))
		.route("/v1/chat", post(chat))
		.route("/v1/knowledge_bases", get(knowledge_bases))
		.route("/v1/sessions/{session_id}", get(session))
		.with_state(state)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn chat(
	State(state): State<AppState>,
	Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
	let query = payload.query.trim();

	if query.is_empty() {
		return Err(json_error(StatusCode::BAD_REQUEST, "invalid_request", "query must be non-empty."));
	}

	let session_id = match payload.session_id.map(|id| id.trim().to_string()) {
		Some(id) if !id.is_empty() => id,
		_ => Uuid::new_v4().to_string(),
	};
	let mut checkout = state.checkout(&session_id)?;
	let message =
		state.service.process_message(checkout.history_mut(), query, payload.filter.as_ref()).await;

	checkout.commit();

	Ok(Json(ChatResponse { session_id, message }))
}

async fn knowledge_bases(
	State(state): State<AppState>,
) -> Result<Json<KnowledgeBasesResponse>, ApiError> {
	let knowledge_bases = state.service.catalog.list().await?;

	Ok(Json(KnowledgeBasesResponse { knowledge_bases }))
}

async fn session(
	State(state): State<AppState>,
	Path(session_id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
	let Some(messages) = state.history(&session_id)? else {
		return Err(json_error(
			StatusCode::NOT_FOUND,
			"not_found",
			format!("Session {session_id} does not exist."),
		));
	};

	Ok(Json(SessionResponse { session_id, messages }))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
}

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
	ApiError { status, error_code: code.to_string(), message: message.into() }
}

impl From<dossier_service::Error> for ApiError {
	fn from(err: dossier_service::Error) -> Self {
		use dossier_service::Error;

		let (status, code) = match &err {
			Error::InvalidRequest { .. } => (StatusCode::BAD_REQUEST, "invalid_request"),
			Error::Provider { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
			Error::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "provider_timeout"),
			Error::Storage { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
		};

		tracing::error!(error = %err, error_code = code, "Request failed.");

		json_error(status, code, err.to_string())
	}
}

impl From<SessionBusy> for ApiError {
	fn from(_: SessionBusy) -> Self {
		json_error(
			StatusCode::CONFLICT,
			"session_busy",
			"Another message is already being processed for this session.",
		)
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ErrorBody { error_code: self.error_code, message: self.message };

		(self.status, Json(body)).into_response()
	}
}
