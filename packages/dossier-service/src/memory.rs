//! Capability adapters for the in-memory engine.

use std::sync::Arc;

use dossier_domain::{KnowledgeBaseDescriptor, MetadataFilter, RetrievalPreset};
use dossier_storage::{
	MemoryEngine, MemoryKnowledgeBase,
	models::{ChunkRecord, DocumentRecord, SegmentHit, SimilarityHit},
};

use crate::{BoxFuture, KnowledgeBase, KnowledgeBaseCatalog, Result};

impl KnowledgeBaseCatalog for MemoryEngine {
	fn list<'a>(&'a self) -> BoxFuture<'a, Result<Vec<KnowledgeBaseDescriptor>>> {
		Box::pin(async move { Ok(self.descriptors()) })
	}

	fn load<'a>(&'a self, kb_id: &'a str) -> BoxFuture<'a, Result<Option<Arc<dyn KnowledgeBase>>>> {
		Box::pin(async move { Ok(self.get(kb_id).map(|kb| kb as Arc<dyn KnowledgeBase>)) })
	}
}

impl KnowledgeBase for MemoryKnowledgeBase {
	fn query<'a>(
		&'a self,
		text: &'a str,
		preset: &'a RetrievalPreset,
		filter: Option<&'a MetadataFilter>,
	) -> BoxFuture<'a, Result<Vec<SegmentHit>>> {
		Box::pin(async move { Ok(MemoryKnowledgeBase::query(self, text, preset, filter)) })
	}

	fn search<'a>(
		&'a self,
		text: &'a str,
		limit: usize,
		filter: Option<&'a MetadataFilter>,
	) -> BoxFuture<'a, Result<Vec<SimilarityHit>>> {
		Box::pin(async move { Ok(MemoryKnowledgeBase::search(self, text, limit, filter)) })
	}

	fn document_ids<'a>(&'a self) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move { Ok(MemoryKnowledgeBase::document_ids(self)) })
	}

	fn document<'a>(&'a self, document_id: &'a str) -> BoxFuture<'a, Result<Option<DocumentRecord>>> {
		Box::pin(async move { Ok(MemoryKnowledgeBase::document(self, document_id)) })
	}

	fn chunk<'a>(
		&'a self,
		document_id: &'a str,
		chunk_index: usize,
	) -> BoxFuture<'a, Result<Option<ChunkRecord>>> {
		Box::pin(async move { Ok(MemoryKnowledgeBase::chunk(self, document_id, chunk_index)) })
	}
}
