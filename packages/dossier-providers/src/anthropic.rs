//! Messages-API style endpoints. System prompts travel in a dedicated field.

use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

use crate::{ChatMessage, ChatRole, Error, ResponseFormat, Result};

pub const API_VERSION: &str = "2023-06-01";

const JSON_INSTRUCTION: &str =
	"Respond with a single JSON object and nothing else. Do not wrap it in code fences.";

pub async fn complete(
	cfg: &dossier_config::CompletionProviderConfig,
	messages: &[ChatMessage],
	format: ResponseFormat,
) -> Result<String> {
	let client = crate::http_client(cfg)?;
	let body = request_body(cfg, messages, format);
	let res = client
		.post(crate::endpoint(cfg))
		.headers(headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_content(&json)
}

pub fn headers(
	api_key: &str,
	default_headers: &serde_json::Map<String, Value>,
) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
	headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
	crate::extend_headers(&mut headers, default_headers)?;

	Ok(headers)
}

pub(crate) fn request_body(
	cfg: &dossier_config::CompletionProviderConfig,
	messages: &[ChatMessage],
	format: ResponseFormat,
) -> Value {
	let mut system = messages
		.iter()
		.filter(|msg| msg.role == ChatRole::System)
		.map(|msg| msg.content.as_str())
		.collect::<Vec<_>>();

	if format == ResponseFormat::Json {
		system.push(JSON_INSTRUCTION);
	}

	let turns = messages
		.iter()
		.filter(|msg| msg.role != ChatRole::System)
		.map(|msg| serde_json::json!({ "role": msg.role, "content": msg.content }))
		.collect::<Vec<_>>();
	let mut body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"max_tokens": cfg.max_tokens,
		"messages": turns,
	});

	if !system.is_empty() {
		body["system"] = Value::String(system.join("\n\n"));
	}

	body
}

pub(crate) fn parse_content(json: &Value) -> Result<String> {
	let blocks = json
		.get("content")
		.and_then(|v| v.as_array())
		.ok_or_else(|| Error::invalid_response("Completion response is missing content blocks."))?;
	let text = blocks
		.iter()
		.filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
		.filter_map(|block| block.get("text").and_then(|t| t.as_str()))
		.collect::<Vec<_>>()
		.join("");

	if text.is_empty() {
		return Err(Error::invalid_response("Completion response has no text content."));
	}

	Ok(text)
}
