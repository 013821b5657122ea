use crate::{ChatMessage, Error, ResponseFormat, Result};

/// Sends `messages` to the configured completion endpoint and returns the raw text reply.
pub async fn complete(
	cfg: &dossier_config::CompletionProviderConfig,
	messages: &[ChatMessage],
	format: ResponseFormat,
) -> Result<String> {
	match cfg.api_style.as_str() {
		"openai" => crate::openai::complete(cfg, messages, format).await,
		"anthropic" => crate::anthropic::complete(cfg, messages, format).await,
		other => Err(Error::InvalidConfig { message: format!("Unsupported api_style {other:?}.") }),
	}
}
