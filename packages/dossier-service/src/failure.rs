//! Diagnoses empty or weak searches and proposes reformulated queries.

use serde::Deserialize;

use dossier_domain::{KnowledgeBaseDescriptor, json, rewrite};
use dossier_providers::{ChatMessage, ResponseFormat};

use crate::{
	DossierService,
	types::{self, FailureKind, SearchContext, SearchFailureAnalysis},
};

const LOW_RELEVANCE_VARIANTS: usize = 3;

#[derive(Debug, Default, Deserialize)]
struct AnalysisPayload {
	#[serde(default)]
	possible_causes: Vec<String>,
	#[serde(default)]
	suggested_actions: Vec<String>,
	#[serde(default)]
	reformulations: Vec<String>,
}

impl DossierService {
	/// Never fails: backend errors and unusable answers degrade to a deterministic analysis.
	///
	/// The kind follows the inputs: an empty catalog is `NoKnowledgeBase`, no contexts is
	/// `NoResults`, anything else is `LowRelevance`.
	pub async fn analyze_failure(
		&self,
		query: &str,
		catalog: &[KnowledgeBaseDescriptor],
		contexts: &[SearchContext],
	) -> SearchFailureAnalysis {
		if catalog.is_empty() {
			return no_knowledge_base();
		}
		if contexts.is_empty() {
			return self.analyze_no_results(query, catalog).await;
		}

		self.analyze_low_relevance(query, contexts).await
	}

	async fn analyze_no_results(
		&self,
		query: &str,
		catalog: &[KnowledgeBaseDescriptor],
	) -> SearchFailureAnalysis {
		let max = self.cfg.failure.max_reformulations as usize;
		let messages = build_no_results_messages(query, catalog, max);
		let payload = match self.complete(&messages, ResponseFormat::Json).await {
			Ok(raw) => json::decode_lenient::<AnalysisPayload>(&raw).or_else(|| {
				tracing::warn!(raw_len = raw.len(), "Failure analysis response is not valid JSON.");

				None
			}),
			Err(err) => {
				tracing::warn!(error = %err, "Failure analysis failed.");

				None
			},
		};
		let Some(payload) = payload else {
			return default_no_results(query, max);
		};
		let mut reformulations =
			rewrite::normalize_reformulations(&payload.reformulations, query, max);

		if reformulations.is_empty() {
			reformulations = rewrite::normalize_reformulations(rewrite::fallback_variants(query), query, max);
		}

		SearchFailureAnalysis {
			failure_kind: FailureKind::NoResults,
			possible_causes: non_empty_or(payload.possible_causes, default_no_results_causes),
			suggested_actions: non_empty_or(payload.suggested_actions, default_no_results_actions),
			reformulated_queries: Some(reformulations),
		}
	}

	async fn analyze_low_relevance(
		&self,
		query: &str,
		contexts: &[SearchContext],
	) -> SearchFailureAnalysis {
		let max = self.cfg.failure.max_reformulations as usize;
		let mean = types::mean_relevance(contexts).unwrap_or(0.0);
		let messages = build_low_relevance_messages(query);
		let generated = match self.complete(&messages, ResponseFormat::Text).await {
			Ok(raw) => rewrite::normalize_reformulations(raw.lines(), query, max),
			Err(err) => {
				tracing::warn!(error = %err, "Reformulation request failed.");

				Vec::new()
			},
		};
		let reformulations = if generated.is_empty() {
			rewrite::normalize_reformulations(rewrite::fallback_variants(query), query, max)
		} else {
			generated
		};

		SearchFailureAnalysis {
			failure_kind: FailureKind::LowRelevance,
			possible_causes: vec![
				format!("The passages found have a low average relevance score ({mean:.2})."),
				"The question may be too broad or use different terms than the documents."
					.to_string(),
			],
			suggested_actions: vec![
				"Ask a more specific question.".to_string(),
				"Use the terminology found in the documents.".to_string(),
			],
			reformulated_queries: Some(reformulations),
		}
	}
}

fn no_knowledge_base() -> SearchFailureAnalysis {
	SearchFailureAnalysis {
		failure_kind: FailureKind::NoKnowledgeBase,
		possible_causes: vec!["No knowledge base is available to search.".to_string()],
		suggested_actions: vec![
			"Create a knowledge base and add documents to it.".to_string(),
			"Check that the document corpus is configured and loaded.".to_string(),
		],
		reformulated_queries: None,
	}
}

fn default_no_results(query: &str, max: usize) -> SearchFailureAnalysis {
	SearchFailureAnalysis {
		failure_kind: FailureKind::NoResults,
		possible_causes: default_no_results_causes(),
		suggested_actions: default_no_results_actions(),
		reformulated_queries: Some(rewrite::normalize_reformulations(
			rewrite::fallback_variants(query),
			query,
			max,
		)),
	}
}

fn default_no_results_causes() -> Vec<String> {
	vec![
		"The question may use terms that do not appear in the documents.".to_string(),
		"The information may not be present in the available knowledge bases.".to_string(),
		"The question may be too specific.".to_string(),
	]
}

fn default_no_results_actions() -> Vec<String> {
	vec![
		"Rephrase the question with simpler or more general terms.".to_string(),
		"Check that the relevant documents have been added to a knowledge base.".to_string(),
		"Select a knowledge base explicitly.".to_string(),
	]
}

fn non_empty_or(items: Vec<String>, fallback: fn() -> Vec<String>) -> Vec<String> {
	let cleaned: Vec<String> = items
		.into_iter()
		.map(|item| item.trim().to_string())
		.filter(|item| !item.is_empty())
		.collect();

	if cleaned.is_empty() { fallback() } else { cleaned }
}

fn build_no_results_messages(
	query: &str,
	catalog: &[KnowledgeBaseDescriptor],
	max: usize,
) -> Vec<ChatMessage> {
	let bases = catalog
		.iter()
		.map(|kb| format!("- {}: {}", kb.title, kb.description))
		.collect::<Vec<_>>()
		.join("\n");
	let system_prompt = "You diagnose failed document searches. \
Output must be valid JSON only with the keys possible_causes, suggested_actions, and reformulations, \
each an array of strings. Do not add explanations or extra fields.";
	let user_prompt = format!(
		"No passage was found for this question.\nQuestion:\n{query}\nAvailable knowledge bases:\n{bases}\n\
Explain the likely causes, suggest actions, and propose between 3 and {max} reformulated questions \
that are more likely to match these knowledge bases."
	);

	vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)]
}

fn build_low_relevance_messages(query: &str) -> Vec<ChatMessage> {
	let user_prompt = format!(
		"The search for this question only returned weakly relevant passages.\nQuestion:\n{query}\n\
Write {LOW_RELEVANCE_VARIANTS} more specific versions of the question, one per line, with no numbering \
and no other text."
	);

	vec![ChatMessage::user(user_prompt)]
}
