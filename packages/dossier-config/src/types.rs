use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

use dossier_domain::SearchMode;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub providers: Providers,
	#[serde(default)]
	pub routing: Routing,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub failure: Failure,
	pub corpus: Option<Corpus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub completion: CompletionProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionProviderConfig {
	pub provider_id: String,
	/// Wire protocol spoken by the backend: "openai" or "anthropic".
	pub api_style: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub max_tokens: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Routing {
	#[serde(default = "default_min_mapping_relevance")]
	pub min_relevance: f32,
	#[serde(default = "default_max_bases")]
	pub max_bases: u32,
	/// Score given to every catalog entry when the classifier output cannot be used.
	#[serde(default = "default_fallback_score")]
	pub fallback_score: f32,
	/// Base that takes the second slot whenever it clears `min_relevance`.
	#[serde(default = "default_priority_kb_id")]
	pub priority_kb_id: Option<String>,
}
impl Default for Routing {
	fn default() -> Self {
		Self {
			min_relevance: default_min_mapping_relevance(),
			max_bases: default_max_bases(),
			fallback_score: default_fallback_score(),
			priority_kb_id: default_priority_kb_id(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Search {
	#[serde(default = "default_search_mode")]
	pub mode: SearchMode,
	#[serde(default = "default_min_passage_relevance")]
	pub min_relevance: f32,
	#[serde(default = "default_max_segments_per_doc")]
	pub max_segments_per_doc: u32,
	#[serde(default = "default_true")]
	pub adaptive_recall: bool,
	#[serde(default)]
	pub fallback: SearchFallback,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			mode: default_search_mode(),
			min_relevance: default_min_passage_relevance(),
			max_segments_per_doc: default_max_segments_per_doc(),
			adaptive_recall: true,
			fallback: SearchFallback::default(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchFallback {
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default = "default_fallback_min_relevance")]
	pub min_relevance: f32,
	#[serde(default = "default_fallback_limit")]
	pub limit: u32,
}
impl Default for SearchFallback {
	fn default() -> Self {
		Self {
			enabled: true,
			min_relevance: default_fallback_min_relevance(),
			limit: default_fallback_limit(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Failure {
	/// Mean passage score under which results count as low relevance. Zero disables the check.
	#[serde(default = "default_low_relevance_threshold")]
	pub low_relevance_threshold: f32,
	#[serde(default = "default_max_reformulations")]
	pub max_reformulations: u32,
}
impl Default for Failure {
	fn default() -> Self {
		Self {
			low_relevance_threshold: default_low_relevance_threshold(),
			max_reformulations: default_max_reformulations(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Corpus {
	pub path: PathBuf,
}

fn default_true() -> bool {
	true
}

fn default_min_mapping_relevance() -> f32 {
	0.6
}

fn default_max_bases() -> u32 {
	2
}

fn default_fallback_score() -> f32 {
	0.6
}

fn default_priority_kb_id() -> Option<String> {
	Some("normes".to_string())
}

fn default_search_mode() -> SearchMode {
	SearchMode::Balanced
}

fn default_min_passage_relevance() -> f32 {
	0.6
}

fn default_max_segments_per_doc() -> u32 {
	3
}

fn default_fallback_min_relevance() -> f32 {
	0.3
}

fn default_fallback_limit() -> u32 {
	200
}

fn default_low_relevance_threshold() -> f32 {
	0.3
}

fn default_max_reformulations() -> u32 {
	4
}
