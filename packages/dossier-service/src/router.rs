use dossier_domain::KnowledgeBaseDescriptor;

use crate::{DossierService, types::KbMappingResult};

impl DossierService {
	/// Bases worth searching for `query`, in search order. Empty when nothing qualifies.
	pub async fn map_query_to_kbs(
		&self,
		query: &str,
		catalog: &[KnowledgeBaseDescriptor],
	) -> Vec<KbMappingResult> {
		let ranked = self.rank_bases(query, catalog).await;
		let selected = select_bases(
			ranked,
			self.cfg.routing.max_bases as usize,
			self.cfg.routing.priority_kb_id.as_deref(),
		);

		tracing::info!(
			query,
			kb_ids = ?selected.iter().map(|m| m.kb_id.as_str()).collect::<Vec<_>>(),
			"Query routed."
		);

		selected
	}
}

/// Top base first, then the priority base when it ranked but missed the first slot, then the rest
/// in rank order.
pub(crate) fn select_bases(
	ranked: Vec<KbMappingResult>,
	max_bases: usize,
	priority_kb_id: Option<&str>,
) -> Vec<KbMappingResult> {
	let mut remaining = ranked.into_iter();
	let Some(top) = remaining.next() else {
		return Vec::new();
	};
	let mut rest: Vec<_> = remaining.collect();
	let mut selected = Vec::with_capacity(max_bases.max(1));

	selected.push(top);

	if max_bases >= 2
		&& let Some(priority) = priority_kb_id
		&& let Some(pos) = rest.iter().position(|mapping| mapping.kb_id == priority)
	{
		selected.push(rest.remove(pos));
	}

	selected.extend(rest.into_iter().take(max_bases.saturating_sub(selected.len())));

	selected
}
