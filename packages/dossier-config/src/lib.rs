mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	CompletionProviderConfig, Config, Corpus, Failure, Providers, Routing, Search, SearchFallback,
	Service,
};

use std::{fs, path::Path};

pub const API_STYLES: [&str; 2] = ["openai", "anthropic"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	if let Some(corpus) = cfg.corpus.as_mut()
		&& corpus.path.is_relative()
		&& let Some(parent) = path.parent()
	{
		corpus.path = parent.join(&corpus.path);
	}

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::invalid("service.http_bind", "must be non-empty."));
	}

	validate_completion(&cfg.providers.completion)?;
	validate_routing(&cfg.routing)?;
	validate_search(&cfg.search)?;

	if !(0.0..=1.0).contains(&cfg.failure.low_relevance_threshold) {
		return Err(Error::invalid(
			"failure.low_relevance_threshold",
			"must be in the range 0.0-1.0.",
		));
	}
	if cfg.failure.max_reformulations == 0 {
		return Err(Error::invalid("failure.max_reformulations", "must be greater than zero."));
	}

	if let Some(corpus) = cfg.corpus.as_ref()
		&& corpus.path.as_os_str().is_empty()
	{
		return Err(Error::invalid("corpus.path", "must be non-empty."));
	}

	Ok(())
}

fn validate_completion(cfg: &CompletionProviderConfig) -> Result<()> {
	for (key, value) in [
		("providers.completion.provider_id", &cfg.provider_id),
		("providers.completion.api_base", &cfg.api_base),
		("providers.completion.api_key", &cfg.api_key),
		("providers.completion.model", &cfg.model),
	] {
		if value.trim().is_empty() {
			return Err(Error::invalid(key, "must be non-empty."));
		}
	}

	if !API_STYLES.contains(&cfg.api_style.as_str()) {
		return Err(Error::invalid(
			"providers.completion.api_style",
			"must be one of openai or anthropic.",
		));
	}
	if !cfg.temperature.is_finite() || !(0.0..=2.0).contains(&cfg.temperature) {
		return Err(Error::invalid("providers.completion.temperature", "must be in the range 0.0-2.0."));
	}
	if cfg.max_tokens == 0 {
		return Err(Error::invalid("providers.completion.max_tokens", "must be greater than zero."));
	}
	if cfg.timeout_ms == 0 {
		return Err(Error::invalid("providers.completion.timeout_ms", "must be greater than zero."));
	}
	if cfg.default_headers.values().any(|value| !value.is_string()) {
		return Err(Error::invalid(
			"providers.completion.default_headers",
			"values must be strings.",
		));
	}

	Ok(())
}

fn validate_routing(cfg: &Routing) -> Result<()> {
	for (key, value) in
		[("routing.min_relevance", cfg.min_relevance), ("routing.fallback_score", cfg.fallback_score)]
	{
		if !value.is_finite() || !(0.0..=1.0).contains(&value) {
			return Err(Error::invalid(key, "must be in the range 0.0-1.0."));
		}
	}

	if cfg.max_bases == 0 {
		return Err(Error::invalid("routing.max_bases", "must be greater than zero."));
	}

	Ok(())
}

fn validate_search(cfg: &Search) -> Result<()> {
	for (key, value) in [
		("search.min_relevance", cfg.min_relevance),
		("search.fallback.min_relevance", cfg.fallback.min_relevance),
	] {
		if !value.is_finite() || !(0.0..=1.0).contains(&value) {
			return Err(Error::invalid(key, "must be in the range 0.0-1.0."));
		}
	}

	if cfg.fallback.enabled && cfg.fallback.limit == 0 {
		return Err(Error::invalid(
			"search.fallback.limit",
			"must be greater than zero when the fallback is enabled.",
		));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.providers.completion.api_style =
		cfg.providers.completion.api_style.trim().to_ascii_lowercase();

	if cfg.routing.priority_kb_id.as_deref().map(|id| id.trim().is_empty()).unwrap_or(false) {
		cfg.routing.priority_kb_id = None;
	}
}
