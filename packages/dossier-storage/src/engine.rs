use std::{collections::HashMap, path::Path, sync::Arc};

use dossier_domain::{
	KnowledgeBaseDescriptor, MetadataFilter, PageRange, RetrievalPreset, cmp_score_desc,
};

use crate::{
	Error, Result,
	corpus::{self, CorpusFile, DocumentSource, KnowledgeBaseSource},
	models::{ChunkRecord, DocumentRecord, SegmentHit, SimilarityHit},
	segments::{self, ChunkSignal},
	similarity::TermVector,
};

/// Catalog of in-memory knowledge bases, in corpus order.
#[derive(Debug, Default)]
pub struct MemoryEngine {
	bases: Vec<Arc<MemoryKnowledgeBase>>,
}
impl MemoryEngine {
	pub fn open(path: &Path) -> Result<Self> {
		let corpus = corpus::read(path)?;
		let engine = Self::from_corpus(corpus)?;

		tracing::info!(path = %path.display(), knowledge_bases = engine.bases.len(), "Corpus loaded.");

		Ok(engine)
	}

	pub fn from_json(raw: &str) -> Result<Self> {
		Self::from_corpus(serde_json::from_str(raw)?)
	}

	pub fn from_corpus(corpus: CorpusFile) -> Result<Self> {
		let mut bases = Vec::with_capacity(corpus.knowledge_bases.len());

		for source in corpus.knowledge_bases {
			if bases.iter().any(|base: &Arc<MemoryKnowledgeBase>| base.descriptor.id == source.id) {
				return Err(Error::Conflict(format!("duplicate knowledge base id {:?}", source.id)));
			}

			bases.push(Arc::new(MemoryKnowledgeBase::build(source)?));
		}

		Ok(Self { bases })
	}

	pub fn descriptors(&self) -> Vec<KnowledgeBaseDescriptor> {
		self.bases.iter().map(|base| base.descriptor.clone()).collect()
	}

	pub fn get(&self, id: &str) -> Option<Arc<MemoryKnowledgeBase>> {
		self.bases.iter().find(|base| base.descriptor.id == id).cloned()
	}
}

#[derive(Debug)]
pub struct MemoryKnowledgeBase {
	descriptor: KnowledgeBaseDescriptor,
	documents: Vec<StoredDocument>,
	by_id: HashMap<String, usize>,
}
impl MemoryKnowledgeBase {
	fn build(source: KnowledgeBaseSource) -> Result<Self> {
		if source.id.trim().is_empty() {
			return Err(Error::InvalidArgument("knowledge base id must be non-empty".to_string()));
		}

		let descriptor = KnowledgeBaseDescriptor {
			id: source.id,
			title: source.title,
			description: source.description,
			language: source.language,
		};
		let mut documents = Vec::with_capacity(source.documents.len());
		let mut by_id = HashMap::new();

		for document in source.documents {
			if by_id.insert(document.id.clone(), documents.len()).is_some() {
				return Err(Error::Conflict(format!(
					"duplicate document id {:?} in knowledge base {:?}",
					document.id, descriptor.id
				)));
			}

			documents.push(StoredDocument::build(document));
		}

		Ok(Self { descriptor, documents, by_id })
	}

	pub fn document_ids(&self) -> Vec<String> {
		self.documents.iter().map(|doc| doc.record.document_id.clone()).collect()
	}

	pub fn document(&self, document_id: &str) -> Option<DocumentRecord> {
		self.find(document_id).map(|doc| doc.record.clone())
	}

	pub fn chunk(&self, document_id: &str, chunk_index: usize) -> Option<ChunkRecord> {
		self.find(document_id)
			.and_then(|doc| doc.chunks.get(chunk_index))
			.map(|chunk| chunk.record.clone())
	}

	/// Native top-k similarity search over single chunks.
	pub fn search(
		&self,
		text: &str,
		limit: usize,
		filter: Option<&MetadataFilter>,
	) -> Vec<SimilarityHit> {
		let query = TermVector::from_text(text);

		if query.is_empty() || limit == 0 {
			return Vec::new();
		}

		let mut hits = self
			.candidates(filter)
			.flat_map(|doc| {
				let query = &query;

				doc.chunks.iter().enumerate().filter_map(move |(chunk_index, chunk)| {
					let similarity = query.cosine(&chunk.terms);

					(similarity > 0.0).then(|| SimilarityHit {
						document_id: doc.record.document_id.clone(),
						chunk_index,
						similarity,
					})
				})
			})
			.collect::<Vec<_>>();

		hits.sort_by(|a, b| cmp_score_desc(a.similarity, b.similarity));
		hits.truncate(limit);

		hits
	}

	/// Primary segment query shaped by `preset`.
	pub fn query(
		&self,
		text: &str,
		preset: &RetrievalPreset,
		filter: Option<&MetadataFilter>,
	) -> Vec<SegmentHit> {
		let query = TermVector::from_text(text);

		if query.is_empty() {
			return Vec::new();
		}

		let mut scored = self
			.candidates(filter)
			.map(|doc| {
				let signals = doc
					.chunks
					.iter()
					.map(|chunk| ChunkSignal {
						similarity: query.cosine(&chunk.terms),
						chars: chunk.record.text.chars().count(),
					})
					.collect::<Vec<_>>();
				let best = signals.iter().map(|signal| signal.similarity).fold(0.0_f32, f32::max);

				(doc, signals, best)
			})
			.filter(|(_, _, best)| *best > 0.0)
			.collect::<Vec<_>>();

		scored.sort_by(|a, b| cmp_score_desc(a.2, b.2));
		scored.truncate(preset.top_k_for_document_selection as usize);

		let signals = scored.iter().map(|(_, signals, _)| signals.clone()).collect::<Vec<_>>();
		let selected = segments::select_segments(&signals, preset);

		tracing::debug!(
			kb_id = %self.descriptor.id,
			documents = scored.len(),
			segments = selected.len(),
			"Segment query completed."
		);

		selected
			.into_iter()
			.map(|segment| {
				let (doc, signals, _) = &scored[segment.document];
				let chunks = &doc.chunks[segment.start..segment.end];
				let score = signals[segment.start..segment.end]
					.iter()
					.map(|signal| signal.similarity)
					.fold(0.0_f32, f32::max);

				SegmentHit {
					document_id: doc.record.document_id.clone(),
					chunk_start: segment.start,
					chunk_end: segment.end,
					text: chunks
						.iter()
						.map(|chunk| chunk.record.text.as_str())
						.collect::<Vec<_>>()
						.join("\n"),
					score,
					page_range: span_pages(chunks),
				}
			})
			.collect()
	}

	fn find(&self, document_id: &str) -> Option<&StoredDocument> {
		self.by_id.get(document_id).and_then(|idx| self.documents.get(*idx))
	}

	fn candidates<'a>(
		&'a self,
		filter: Option<&'a MetadataFilter>,
	) -> impl Iterator<Item = &'a StoredDocument> + 'a {
		self.documents.iter().filter(move |doc| {
			filter.is_none_or(|filter| {
				filter.matches(&doc.record.document_id, &doc.record.metadata)
			})
		})
	}
}

#[derive(Debug)]
struct StoredDocument {
	record: DocumentRecord,
	chunks: Vec<StoredChunk>,
}
impl StoredDocument {
	fn build(source: DocumentSource) -> Self {
		let chunks = source
			.chunks
			.into_iter()
			.enumerate()
			.map(|(chunk_index, chunk)| StoredChunk {
				terms: TermVector::from_text(&chunk.text),
				record: ChunkRecord {
					document_id: source.id.clone(),
					chunk_index,
					text: chunk.text,
					page_range: PageRange::new(chunk.page_start, chunk.page_end),
					title: chunk.section_title,
				},
			})
			.collect();

		Self {
			record: DocumentRecord {
				document_id: source.id,
				title: source.title,
				metadata: source.metadata,
			},
			chunks,
		}
	}
}

#[derive(Debug)]
struct StoredChunk {
	record: ChunkRecord,
	terms: TermVector,
}

fn span_pages(chunks: &[StoredChunk]) -> Option<PageRange> {
	let start = chunks.iter().find_map(|chunk| chunk.record.page_range.and_then(|pages| pages.start));
	let end = chunks.iter().rev().find_map(|chunk| chunk.record.page_range.and_then(|pages| pages.end));

	PageRange::new(start, end)
}
