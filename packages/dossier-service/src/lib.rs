//! Routed multi-knowledge-base retrieval: classify, route, search, analyze failures, answer.

pub mod classifier;
pub mod coordinator;
pub mod failure;
pub mod history;
pub mod memory;
pub mod message;
pub mod orchestrator;
pub mod router;
pub mod searcher;
pub mod types;

mod error;

pub use error::{Error, Result};
pub use history::ConversationHistory;
pub use message::{
	FailureAnalysisRecord, Message, MessageMetadata, QueryReformulation, Role, SourcePassage,
	SourceRecord,
};
pub use types::{
	FailureKind, KbMappingResult, SearchContext, SearchFailureAnalysis, SearchFilter, SearchStats,
	SearchTarget,
};

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use dossier_config::{CompletionProviderConfig, Config};
use dossier_domain::{KnowledgeBaseDescriptor, MetadataFilter, RetrievalPreset};
use dossier_providers::{ChatMessage, ResponseFormat};
use dossier_storage::models::{ChunkRecord, DocumentRecord, SegmentHit, SimilarityHit};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait TextCompletion
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a CompletionProviderConfig,
		messages: &'a [ChatMessage],
		format: ResponseFormat,
	) -> BoxFuture<'a, Result<String>>;
}

pub trait KnowledgeBaseCatalog
where
	Self: Send + Sync,
{
	fn list<'a>(&'a self) -> BoxFuture<'a, Result<Vec<KnowledgeBaseDescriptor>>>;

	/// `None` when no base has this id.
	fn load<'a>(&'a self, kb_id: &'a str) -> BoxFuture<'a, Result<Option<Arc<dyn KnowledgeBase>>>>;
}

/// A loaded knowledge-base handle.
pub trait KnowledgeBase
where
	Self: Send + Sync,
{
	/// Primary segment retrieval driven by a named preset.
	fn query<'a>(
		&'a self,
		text: &'a str,
		preset: &'a RetrievalPreset,
		filter: Option<&'a MetadataFilter>,
	) -> BoxFuture<'a, Result<Vec<SegmentHit>>>;

	/// Native top-k similarity search over single chunks.
	fn search<'a>(
		&'a self,
		text: &'a str,
		limit: usize,
		filter: Option<&'a MetadataFilter>,
	) -> BoxFuture<'a, Result<Vec<SimilarityHit>>>;

	fn document_ids<'a>(&'a self) -> BoxFuture<'a, Result<Vec<String>>>;

	fn document<'a>(&'a self, document_id: &'a str) -> BoxFuture<'a, Result<Option<DocumentRecord>>>;

	fn chunk<'a>(
		&'a self,
		document_id: &'a str,
		chunk_index: usize,
	) -> BoxFuture<'a, Result<Option<ChunkRecord>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub completion: Arc<dyn TextCompletion>,
}

pub struct DossierService {
	pub cfg: Config,
	pub catalog: Arc<dyn KnowledgeBaseCatalog>,
	pub providers: Providers,
}

struct DefaultProviders;

impl TextCompletion for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a CompletionProviderConfig,
		messages: &'a [ChatMessage],
		format: ResponseFormat,
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move { Ok(dossier_providers::complete(cfg, messages, format).await?) })
	}
}

impl Providers {
	pub fn new(completion: Arc<dyn TextCompletion>) -> Self {
		Self { completion }
	}
}

impl Default for Providers {
	fn default() -> Self {
		Self { completion: Arc::new(DefaultProviders) }
	}
}

impl DossierService {
	pub fn new(cfg: Config, catalog: Arc<dyn KnowledgeBaseCatalog>) -> Self {
		Self { cfg, catalog, providers: Providers::default() }
	}

	pub fn with_providers(
		cfg: Config,
		catalog: Arc<dyn KnowledgeBaseCatalog>,
		providers: Providers,
	) -> Self {
		Self { cfg, catalog, providers }
	}

	/// One completion call, bounded by the provider timeout.
	pub(crate) async fn complete(
		&self,
		messages: &[ChatMessage],
		format: ResponseFormat,
	) -> Result<String> {
		let cfg = &self.cfg.providers.completion;
		let call = self.providers.completion.complete(cfg, messages, format);

		match tokio::time::timeout(Duration::from_millis(cfg.timeout_ms), call).await {
			Ok(result) => result,
			Err(_) => Err(Error::Timeout { timeout_ms: cfg.timeout_ms }),
		}
	}
}
