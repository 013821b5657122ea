use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use dossier_domain::{MetadataFilter, PassageReference};

/// Router confidence that one knowledge base is worth searching.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct KbMappingResult {
	pub kb_id: String,
	pub relevance_score: f32,
	pub reasoning: String,
}

/// Passages returned by one knowledge base for one query, sorted by descending relevance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchContext {
	pub kb_id: String,
	pub kb_title: String,
	pub passages: Vec<PassageReference>,
	pub mapping_score: f32,
}

/// One base to search, with its mapping score and an optional metadata filter.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchTarget {
	pub kb_id: String,
	pub kb_title: String,
	pub mapping_score: f32,
	pub filter: Option<MetadataFilter>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct SearchStats {
	pub bases_searched: usize,
	pub bases_with_results: usize,
	pub total_passages: usize,
	pub mean_relevance: Option<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
	#[serde(rename = "no_kb")]
	NoKnowledgeBase,
	#[serde(rename = "no_results")]
	NoResults,
	#[serde(rename = "low_relevance")]
	LowRelevance,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchFailureAnalysis {
	pub failure_kind: FailureKind,
	pub possible_causes: Vec<String>,
	pub suggested_actions: Vec<String>,
	/// Absent for [`FailureKind::NoKnowledgeBase`].
	pub reformulated_queries: Option<Vec<String>>,
}

/// Caller-supplied restriction that bypasses routing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilter {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub kb_ids: Option<Vec<String>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub doc_ids_by_kb: Option<BTreeMap<String, Vec<String>>>,
}
impl SearchFilter {
	pub fn is_active(&self) -> bool {
		self.kb_ids.as_ref().is_some_and(|ids| !ids.is_empty())
			|| self.doc_ids_by_kb.as_ref().is_some_and(|map| !map.is_empty())
	}

	/// Targeted base ids: `kb_ids` when given, otherwise the keys of `doc_ids_by_kb`.
	pub fn kb_ids(&self) -> Vec<String> {
		if let Some(ids) = self.kb_ids.as_ref().filter(|ids| !ids.is_empty()) {
			let mut out: Vec<String> = Vec::with_capacity(ids.len());

			for id in ids {
				if !out.contains(id) {
					out.push(id.clone());
				}
			}

			return out;
		}

		self.doc_ids_by_kb.as_ref().map(|map| map.keys().cloned().collect()).unwrap_or_default()
	}

	pub fn document_filter(&self, kb_id: &str) -> Option<MetadataFilter> {
		self.doc_ids_by_kb
			.as_ref()
			.and_then(|map| map.get(kb_id))
			.filter(|ids| !ids.is_empty())
			.map(|ids| MetadataFilter::doc_ids(ids.clone()))
	}
}

/// Mean passage relevance across all contexts, `None` when there are no passages.
pub fn mean_relevance(contexts: &[SearchContext]) -> Option<f32> {
	let scores = contexts.iter().flat_map(|ctx| ctx.passages.iter().map(|p| p.relevance_score));
	let (sum, count) = scores.fold((0.0_f32, 0_usize), |(sum, count), score| (sum + score, count + 1));

	(count > 0).then(|| sum / count as f32)
}
