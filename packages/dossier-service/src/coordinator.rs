use futures::future;

use dossier_domain::KnowledgeBaseDescriptor;

use crate::{
	DossierService,
	types::{self, KbMappingResult, SearchContext, SearchStats, SearchTarget},
};

impl DossierService {
	/// Searches every target concurrently and returns one context per base that produced passages,
	/// in target order.
	pub async fn search_bases(&self, query: &str, targets: &[SearchTarget]) -> Vec<SearchContext> {
		let searches = targets.iter().map(|target| self.search_target(query, target));
		let contexts: Vec<SearchContext> =
			future::join_all(searches).await.into_iter().flatten().collect();
		let stats = summarize(targets.len(), &contexts);

		tracing::info!(
			query,
			bases_searched = stats.bases_searched,
			bases_with_results = stats.bases_with_results,
			total_passages = stats.total_passages,
			mean_relevance = ?stats.mean_relevance,
			"Multi-base search completed."
		);

		contexts
	}

	async fn search_target(&self, query: &str, target: &SearchTarget) -> Option<SearchContext> {
		let kb = match self.catalog.load(&target.kb_id).await {
			Ok(Some(kb)) => kb,
			Ok(None) => {
				tracing::warn!(kb_id = %target.kb_id, "Knowledge base not found. Skipping.");

				return None;
			},
			Err(err) => {
				tracing::warn!(error = %err, kb_id = %target.kb_id, "Knowledge base failed to load. Skipping.");

				return None;
			},
		};
		let passages = self
			.search_passages(
				&target.kb_id,
				kb.as_ref(),
				query,
				target.filter.as_ref(),
				target.mapping_score,
			)
			.await;

		if passages.is_empty() {
			return None;
		}

		Some(SearchContext {
			kb_id: target.kb_id.clone(),
			kb_title: target.kb_title.clone(),
			passages,
			mapping_score: target.mapping_score,
		})
	}
}

/// Search targets for routed bases, titled from `catalog`.
pub fn routed_targets(
	mappings: Vec<KbMappingResult>,
	catalog: &[KnowledgeBaseDescriptor],
) -> Vec<SearchTarget> {
	mappings
		.into_iter()
		.map(|mapping| SearchTarget {
			kb_title: title_for(&mapping.kb_id, catalog),
			kb_id: mapping.kb_id,
			mapping_score: mapping.relevance_score,
			filter: None,
		})
		.collect()
}

pub(crate) fn title_for(kb_id: &str, catalog: &[KnowledgeBaseDescriptor]) -> String {
	catalog
		.iter()
		.find(|kb| kb.id == kb_id)
		.map(|kb| kb.title.clone())
		.unwrap_or_else(|| kb_id.to_string())
}

pub fn summarize(bases_searched: usize, contexts: &[SearchContext]) -> SearchStats {
	SearchStats {
		bases_searched,
		bases_with_results: contexts.len(),
		total_passages: contexts.iter().map(|ctx| ctx.passages.len()).sum(),
		mean_relevance: types::mean_relevance(contexts),
	}
}
