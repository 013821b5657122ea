use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use dossier_domain::PageRange;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
	pub document_id: String,
	pub title: String,
	pub metadata: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
	pub document_id: String,
	pub chunk_index: usize,
	pub text: String,
	pub page_range: Option<PageRange>,
	/// Section heading the chunk sits under, when the source carried one.
	pub title: Option<String>,
}

/// A contiguous run of chunks returned by the primary segment query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentHit {
	pub document_id: String,
	pub chunk_start: usize,
	/// Exclusive.
	pub chunk_end: usize,
	pub text: String,
	pub score: f32,
	pub page_range: Option<PageRange>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimilarityHit {
	pub document_id: String,
	pub chunk_index: usize,
	pub similarity: f32,
}
