use std::collections::{HashMap, HashSet};

use crate::{PassageReference, cmp_score_desc};

/// Multiplier applied to passages only the keyword strategy found.
pub const KEYWORD_ONLY_PENALTY: f32 = 0.9;

/// Merges vector and keyword results into one ranked list.
///
/// Vector results are inserted first and deduplication is first-wins, so a passage surfaced by
/// both strategies keeps its vector score. Keyword-only passages are scaled by
/// [`KEYWORD_ONLY_PENALTY`]. The merged list is sorted by descending score before the
/// per-document cap is applied.
pub fn merge_combined(
	vector: Vec<PassageReference>,
	keyword: Vec<PassageReference>,
	max_per_document: usize,
) -> Vec<PassageReference> {
	let mut seen = HashSet::new();
	let mut merged = Vec::with_capacity(vector.len() + keyword.len());

	for passage in vector {
		if seen.insert(passage.dedup_key()) {
			merged.push(passage);
		}
	}
	for mut passage in keyword {
		if seen.insert(passage.dedup_key()) {
			passage.relevance_score *= KEYWORD_ONLY_PENALTY;
			merged.push(passage);
		}
	}

	sort_by_relevance(&mut merged);

	cap_per_document(merged, max_per_document)
}

/// Stable descending sort on relevance.
pub fn sort_by_relevance(passages: &mut [PassageReference]) {
	passages.sort_by(|a, b| cmp_score_desc(a.relevance_score, b.relevance_score));
}

/// Keeps at most `max_per_document` passages per document, preserving order. Zero disables the cap.
pub fn cap_per_document(
	passages: Vec<PassageReference>,
	max_per_document: usize,
) -> Vec<PassageReference> {
	if max_per_document == 0 {
		return passages;
	}

	let mut counts: HashMap<String, usize> = HashMap::new();

	passages
		.into_iter()
		.filter(|passage| {
			let count = counts.entry(passage.document_id.clone()).or_default();

			if *count < max_per_document {
				*count += 1;

				true
			} else {
				false
			}
		})
		.collect()
}
