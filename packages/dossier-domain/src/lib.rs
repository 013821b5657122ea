//! Pure retrieval and routing rules shared by the pipeline.
//!
//! Nothing in this crate performs I/O; every function is deterministic for a given input.

pub mod json;
pub mod keywords;
pub mod merge;
pub mod passage;
pub mod preset;
pub mod rewrite;

pub use passage::{
	FilterOperator, FilterValue, KnowledgeBaseDescriptor, MetadataFilter, PageRange,
	PassageReference,
};
pub use preset::{RetrievalPreset, SearchMode};

use std::cmp::Ordering;

/// Descending order for scores, with NaN sorted last.
pub fn cmp_score_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

/// Ids from `ids` that appear verbatim (case-insensitive) inside `query`.
pub fn mentioned_ids<'a, I>(query: &str, ids: I) -> Vec<&'a str>
where
	I: IntoIterator<Item = &'a str>,
{
	let haystack = query.to_lowercase();

	ids.into_iter()
		.filter(|id| {
			let needle = id.trim().to_lowercase();

			!needle.is_empty() && haystack.contains(&needle)
		})
		.collect()
}
