//! Query-to-knowledge-base relevance classification.

use std::collections::HashMap;

use serde::Deserialize;

use dossier_domain::{KnowledgeBaseDescriptor, cmp_score_desc, json, mentioned_ids};
use dossier_providers::{ChatMessage, ResponseFormat};

use crate::{DossierService, types::KbMappingResult};

const DEFAULT_REASONING: &str = "No reasoning was provided for this knowledge base.";
const FALLBACK_REASONING: &str =
	"Default mapping: the relevance classifier was unavailable, so every knowledge base is searched.";
const MENTION_REASONING: &str = "The query names this knowledge base explicitly.";

#[derive(Debug, Deserialize)]
struct MappingPayload {
	#[serde(default)]
	mappings: Vec<RawMapping>,
}

#[derive(Debug, Deserialize)]
struct RawMapping {
	kb_id: String,
	#[serde(default)]
	relevance_score: Option<f32>,
	#[serde(default)]
	reasoning: Option<String>,
}

impl DossierService {
	/// Scores `catalog` against `query` and keeps at most `routing.max_bases` bases.
	///
	/// Never fails: an unusable classifier answer falls back to a catalog-wide mapping.
	pub async fn classify(
		&self,
		query: &str,
		catalog: &[KnowledgeBaseDescriptor],
	) -> Vec<KbMappingResult> {
		let mut ranked = self.rank_bases(query, catalog).await;

		ranked.truncate(self.cfg.routing.max_bases as usize);

		ranked
	}

	/// Every base at or above `routing.min_relevance`, sorted by descending score.
	pub(crate) async fn rank_bases(
		&self,
		query: &str,
		catalog: &[KnowledgeBaseDescriptor],
	) -> Vec<KbMappingResult> {
		if catalog.is_empty() {
			return Vec::new();
		}

		let cfg = &self.cfg.routing;
		let messages = build_classifier_messages(query, catalog, cfg.max_bases, cfg.min_relevance);
		let scored = match self.complete(&messages, ResponseFormat::Json).await {
			Ok(raw) => match json::decode_lenient::<MappingPayload>(&raw) {
				Some(payload) => Some(sanitize_mappings(payload.mappings, catalog)),
				None => {
					tracing::warn!(raw_len = raw.len(), "Classifier response is not valid JSON.");

					None
				},
			},
			Err(err) => {
				tracing::warn!(error = %err, "Relevance classification failed.");

				None
			},
		};
		let mut mappings = scored.unwrap_or_else(|| {
			catalog
				.iter()
				.map(|kb| KbMappingResult {
					kb_id: kb.id.clone(),
					relevance_score: cfg.fallback_score,
					reasoning: FALLBACK_REASONING.to_string(),
				})
				.collect()
		});

		apply_mentions(query, catalog, &mut mappings);
		mappings.retain(|mapping| mapping.relevance_score >= cfg.min_relevance);
		mappings.sort_by(|a, b| cmp_score_desc(a.relevance_score, b.relevance_score));

		tracing::debug!(
			query,
			kb_ids = ?mappings.iter().map(|m| m.kb_id.as_str()).collect::<Vec<_>>(),
			"Knowledge bases ranked."
		);

		mappings
	}
}

/// Keeps known ids once (highest score wins), in catalog order, with clamped scores.
fn sanitize_mappings(
	raw: Vec<RawMapping>,
	catalog: &[KnowledgeBaseDescriptor],
) -> Vec<KbMappingResult> {
	let mut best: HashMap<String, KbMappingResult> = HashMap::new();

	for mapping in raw {
		let kb_id = mapping.kb_id.trim();

		if !catalog.iter().any(|kb| kb.id == kb_id) {
			continue;
		}

		let score = mapping.relevance_score.filter(|score| score.is_finite()).unwrap_or(0.0);
		let reasoning = mapping
			.reasoning
			.map(|text| text.trim().to_string())
			.filter(|text| !text.is_empty())
			.unwrap_or_else(|| DEFAULT_REASONING.to_string());
		let candidate = KbMappingResult {
			kb_id: kb_id.to_string(),
			relevance_score: score.clamp(0.0, 1.0),
			reasoning,
		};

		let keep_existing = best
			.get(kb_id)
			.is_some_and(|existing| existing.relevance_score >= candidate.relevance_score);

		if !keep_existing {
			best.insert(kb_id.to_string(), candidate);
		}
	}

	catalog.iter().filter_map(|kb| best.remove(&kb.id)).collect()
}

fn apply_mentions(
	query: &str,
	catalog: &[KnowledgeBaseDescriptor],
	mappings: &mut Vec<KbMappingResult>,
) {
	for kb_id in mentioned_ids(query, catalog.iter().map(|kb| kb.id.as_str())) {
		match mappings.iter_mut().find(|mapping| mapping.kb_id == kb_id) {
			Some(mapping) => {
				mapping.relevance_score = 1.0;
				mapping.reasoning = MENTION_REASONING.to_string();
			},
			None => mappings.push(KbMappingResult {
				kb_id: kb_id.to_string(),
				relevance_score: 1.0,
				reasoning: MENTION_REASONING.to_string(),
			}),
		}
	}
}

fn build_classifier_messages(
	query: &str,
	catalog: &[KnowledgeBaseDescriptor],
	max_bases: u32,
	min_relevance: f32,
) -> Vec<ChatMessage> {
	let schema = serde_json::json!({
		"mappings": [{ "kb_id": "string", "relevance_score": 0.0, "reasoning": "string" }]
	});
	let schema_text = serde_json::to_string_pretty(&schema).unwrap_or_else(|_| {
		"{\"mappings\": [{\"kb_id\": \"string\", \"relevance_score\": 0.0, \"reasoning\": \"string\"}]}"
			.to_string()
	});
	let bases = catalog
		.iter()
		.map(|kb| format!("- {} - {}: {}", kb.id, kb.title, kb.description))
		.collect::<Vec<_>>()
		.join("\n");
	let system_prompt = "You route questions to knowledge bases. \
Output must be valid JSON only and must match the provided schema exactly. \
Do not add explanations or extra fields.";
	let user_prompt = format!(
		"Return JSON matching this exact schema:\n{schema_text}\nRules:\n\
- Return at most {max_bases} knowledge bases.\n\
- Only include knowledge bases with relevance_score >= {min_relevance}.\n\
- relevance_score is between 0.0 and 1.0.\n\
- If the question names a knowledge base id explicitly, give it relevance_score 1.0.\n\
Knowledge bases:\n{bases}\nQuestion:\n{query}"
	);

	vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)]
}
