pub mod anthropic;
pub mod completion;
pub mod openai;

mod error;

pub use completion::complete;
pub use error::{Error, Result};

use std::time::Duration;

use reqwest::{
	Client,
	header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
	System,
	User,
	Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
	pub role: ChatRole,
	pub content: String,
}
impl ChatMessage {
	pub fn system(content: impl Into<String>) -> Self {
		Self { role: ChatRole::System, content: content.into() }
	}

	pub fn user(content: impl Into<String>) -> Self {
		Self { role: ChatRole::User, content: content.into() }
	}
}

/// Shape the caller expects back from the model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseFormat {
	#[default]
	Text,
	/// A single JSON object.
	Json,
}

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);
	extend_headers(&mut headers, default_headers)?;

	Ok(headers)
}

pub(crate) fn extend_headers(
	headers: &mut HeaderMap,
	default_headers: &Map<String, Value>,
) -> Result<()> {
	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, HeaderValue::from_str(raw)?);
	}

	Ok(())
}

pub(crate) fn http_client(cfg: &dossier_config::CompletionProviderConfig) -> Result<Client> {
	Ok(Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?)
}

pub(crate) fn endpoint(cfg: &dossier_config::CompletionProviderConfig) -> String {
	format!("{}{}", cfg.api_base.trim_end_matches('/'), cfg.path)
}
