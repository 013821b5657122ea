//! Chat-completions style endpoints.

use serde_json::Value;

use crate::{ChatMessage, Error, ResponseFormat, Result};

pub async fn complete(
	cfg: &dossier_config::CompletionProviderConfig,
	messages: &[ChatMessage],
	format: ResponseFormat,
) -> Result<String> {
	let client = crate::http_client(cfg)?;
	let body = request_body(cfg, messages, format);
	let res = client
		.post(crate::endpoint(cfg))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_content(&json)
}

pub(crate) fn request_body(
	cfg: &dossier_config::CompletionProviderConfig,
	messages: &[ChatMessage],
	format: ResponseFormat,
) -> Value {
	let mut body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"max_tokens": cfg.max_tokens,
		"messages": messages,
	});

	if format == ResponseFormat::Json {
		body["response_format"] = serde_json::json!({ "type": "json_object" });
	}

	body
}

pub(crate) fn parse_content(json: &Value) -> Result<String> {
	json.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.map(str::to_string)
		.ok_or_else(|| Error::invalid_response("Completion response is missing message content."))
}
