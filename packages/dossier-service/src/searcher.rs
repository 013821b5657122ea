//! Passage search inside one knowledge base.
//!
//! Retrieval degrades instead of failing: every knowledge-base error is logged and the search
//! continues with whatever the remaining strategies return.

use std::collections::HashMap;

use dossier_domain::{MetadataFilter, PageRange, PassageReference, keywords, merge};
use dossier_storage::models::{DocumentRecord, SegmentHit};

use crate::{DossierService, KnowledgeBase};

impl DossierService {
	/// Primary preset-driven search, falling back to the combined search when it yields nothing.
	///
	/// `floor_scale` multiplies both relevance floors; the coordinator passes the base's mapping
	/// score.
	pub async fn search_passages(
		&self,
		kb_id: &str,
		kb: &dyn KnowledgeBase,
		query: &str,
		filter: Option<&MetadataFilter>,
		floor_scale: f32,
	) -> Vec<PassageReference> {
		let cfg = &self.cfg.search;
		let hits = self.primary_hits(kb_id, kb, query, filter).await;
		let mut documents = DocumentCache::default();
		let mut passages = Vec::with_capacity(hits.len());

		for hit in hits {
			passages.push(segment_passage(kb_id, kb, &mut documents, hit).await);
		}

		let floor = cfg.min_relevance * floor_scale;

		passages.retain(|passage| passage.relevance_score >= floor);
		merge::sort_by_relevance(&mut passages);

		let passages = merge::cap_per_document(passages, cfg.max_segments_per_doc as usize);

		if !passages.is_empty() || !cfg.fallback.enabled {
			return passages;
		}

		tracing::debug!(kb_id, query, "Primary search found nothing. Running combined search.");

		self.combined_search(kb_id, kb, query, filter, cfg.fallback.min_relevance * floor_scale).await
	}

	/// Vector and keyword retrieval over the same base, merged and deduplicated.
	pub async fn combined_search(
		&self,
		kb_id: &str,
		kb: &dyn KnowledgeBase,
		query: &str,
		filter: Option<&MetadataFilter>,
		min_relevance: f32,
	) -> Vec<PassageReference> {
		let mut documents = DocumentCache::default();
		let vector = vector_passages(
			kb_id,
			kb,
			&mut documents,
			query,
			filter,
			self.cfg.search.fallback.limit as usize,
			min_relevance,
		)
		.await;
		let keyword = keyword_passages(kb_id, kb, &mut documents, query, filter, min_relevance).await;

		tracing::debug!(
			kb_id,
			vector_hits = vector.len(),
			keyword_hits = keyword.len(),
			"Combined search completed."
		);

		merge::merge_combined(vector, keyword, self.cfg.search.max_segments_per_doc as usize)
	}

	async fn primary_hits(
		&self,
		kb_id: &str,
		kb: &dyn KnowledgeBase,
		query: &str,
		filter: Option<&MetadataFilter>,
	) -> Vec<SegmentHit> {
		let mode = self.cfg.search.mode;
		let hits = query_segments(kb_id, kb, query, &mode.preset(), filter).await;

		if !hits.is_empty() || !self.cfg.search.adaptive_recall {
			return hits;
		}

		for broader in mode.broader() {
			let preset = broader.preset().loosened_for_recall();
			let hits = query_segments(kb_id, kb, query, &preset, filter).await;

			if !hits.is_empty() {
				tracing::debug!(kb_id, mode = broader.as_str(), "Adaptive recall found segments.");

				return hits;
			}
		}

		Vec::new()
	}
}

#[derive(Default)]
struct DocumentCache {
	records: HashMap<String, Option<DocumentRecord>>,
}
impl DocumentCache {
	async fn get(
		&mut self,
		kb_id: &str,
		kb: &dyn KnowledgeBase,
		document_id: &str,
	) -> Option<DocumentRecord> {
		if let Some(record) = self.records.get(document_id) {
			return record.clone();
		}

		let record = match kb.document(document_id).await {
			Ok(record) => record,
			Err(err) => {
				tracing::warn!(error = %err, kb_id, document_id, "Document lookup failed.");

				None
			},
		};

		self.records.insert(document_id.to_string(), record.clone());

		record
	}
}

async fn query_segments(
	kb_id: &str,
	kb: &dyn KnowledgeBase,
	query: &str,
	preset: &dossier_domain::RetrievalPreset,
	filter: Option<&MetadataFilter>,
) -> Vec<SegmentHit> {
	match kb.query(query, preset, filter).await {
		Ok(hits) => hits,
		Err(err) => {
			tracing::warn!(error = %err, kb_id, "Primary knowledge-base query failed.");

			Vec::new()
		},
	}
}

async fn segment_passage(
	kb_id: &str,
	kb: &dyn KnowledgeBase,
	documents: &mut DocumentCache,
	hit: SegmentHit,
) -> PassageReference {
	let section_title = match kb.chunk(&hit.document_id, hit.chunk_start).await {
		Ok(chunk) => chunk.and_then(|chunk| chunk.title),
		Err(err) => {
			tracing::warn!(error = %err, kb_id, document_id = %hit.document_id, "Chunk lookup failed.");

			None
		},
	};
	let document = documents.get(kb_id, kb, &hit.document_id).await;

	build_passage(hit.document_id, document, section_title, hit.text, hit.score, hit.page_range)
}

async fn vector_passages(
	kb_id: &str,
	kb: &dyn KnowledgeBase,
	documents: &mut DocumentCache,
	query: &str,
	filter: Option<&MetadataFilter>,
	limit: usize,
	min_relevance: f32,
) -> Vec<PassageReference> {
	let hits = match kb.search(query, limit, filter).await {
		Ok(hits) => hits,
		Err(err) => {
			tracing::warn!(error = %err, kb_id, "Vector search failed. Using keyword results only.");

			return Vec::new();
		},
	};
	let mut out = Vec::new();

	for hit in hits.into_iter().filter(|hit| hit.similarity >= min_relevance) {
		let chunk = match kb.chunk(&hit.document_id, hit.chunk_index).await {
			Ok(Some(chunk)) => chunk,
			Ok(None) => continue,
			Err(err) => {
				tracing::warn!(error = %err, kb_id, document_id = %hit.document_id, "Chunk lookup failed.");

				continue;
			},
		};
		let document = documents.get(kb_id, kb, &hit.document_id).await;

		out.push(build_passage(
			hit.document_id,
			document,
			chunk.title,
			chunk.text,
			hit.similarity,
			chunk.page_range,
		));
	}

	out
}

async fn keyword_passages(
	kb_id: &str,
	kb: &dyn KnowledgeBase,
	documents: &mut DocumentCache,
	query: &str,
	filter: Option<&MetadataFilter>,
	min_relevance: f32,
) -> Vec<PassageReference> {
	let keywords = keywords::extract_keywords(query);

	if keywords.is_empty() {
		return Vec::new();
	}

	let document_ids = match kb.document_ids().await {
		Ok(ids) => ids,
		Err(err) => {
			tracing::warn!(error = %err, kb_id, "Document listing failed. Skipping keyword search.");

			return Vec::new();
		},
	};
	let mut out = Vec::new();

	for document_id in document_ids {
		let Some(document) = documents.get(kb_id, kb, &document_id).await else {
			continue;
		};

		if let Some(filter) = filter
			&& !filter.matches(&document_id, &document.metadata)
		{
			continue;
		}

		for chunk_index in 0.. {
			let chunk = match kb.chunk(&document_id, chunk_index).await {
				Ok(Some(chunk)) => chunk,
				Ok(None) => break,
				Err(err) => {
					tracing::warn!(error = %err, kb_id, document_id, chunk_index, "Chunk lookup failed.");

					break;
				},
			};
			let score = keywords::keyword_score(&chunk.text, &keywords);

			if score > 0.0 && score >= min_relevance {
				out.push(build_passage(
					document_id.clone(),
					Some(document.clone()),
					chunk.title,
					chunk.text,
					score,
					chunk.page_range,
				));
			}
		}
	}

	out
}

fn build_passage(
	document_id: String,
	document: Option<DocumentRecord>,
	section_title: Option<String>,
	text: String,
	relevance_score: f32,
	page_range: Option<PageRange>,
) -> PassageReference {
	let (document_title, metadata) = match document {
		Some(record) => (record.title, record.metadata),
		None => (section_title.unwrap_or_else(|| document_id.clone()), Default::default()),
	};

	PassageReference { document_id, document_title, text, relevance_score, page_range, metadata }
}
