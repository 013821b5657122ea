//! End-to-end message handling: route, search, retry with reformulations, answer.

use dossier_domain::KnowledgeBaseDescriptor;
use dossier_providers::{ChatMessage, ResponseFormat};

use crate::{
	DossierService, Result,
	coordinator::{self, routed_targets},
	history::ConversationHistory,
	message::{FailureAnalysisRecord, Message, MessageMetadata, QueryReformulation, SourceRecord},
	types::{self, FailureKind, SearchContext, SearchFailureAnalysis, SearchFilter, SearchTarget},
};

const APOLOGY: &str =
	"Sorry, something went wrong while processing your question. Please try again later.";
const ANSWER_SYSTEM_PROMPT: &str = "You answer questions using only the passages provided. \
Cite the document titles you rely on. If the passages do not contain the answer, say so. \
Answer in the language of the question.";

impl DossierService {
	/// Handles one user turn. Always returns a well-formed assistant message and records both turns
	/// in `history`.
	pub async fn process_message(
		&self,
		history: &mut ConversationHistory,
		query: &str,
		filter: Option<&SearchFilter>,
	) -> Message {
		history.push(Message::user(query));

		let reply = match self.respond(query, filter).await {
			Ok(reply) => reply,
			Err(err) => {
				tracing::error!(error = %err, query, "Message processing failed.");

				Message::assistant(APOLOGY, MessageMetadata::default())
			},
		};

		history.push(reply.clone());

		reply
	}

	async fn respond(&self, query: &str, filter: Option<&SearchFilter>) -> Result<Message> {
		let catalog = self.catalog.list().await?;

		if catalog.is_empty() {
			let analysis = self.analyze_failure(query, &catalog, &[]).await;

			return Ok(failure_message(&analysis));
		}

		let filter = filter.filter(|filter| filter.is_active());
		let contexts = self.retrieve(query, &catalog, filter).await;

		if !contexts.is_empty() && !self.is_low_relevance(&contexts) {
			return Ok(self.answer(query, &contexts, None, None).await);
		}

		let analysis = self.analyze_failure(query, &catalog, &contexts).await;

		for reformulated in analysis.reformulated_queries.iter().flatten() {
			let retry = self.retrieve(reformulated, &catalog, filter).await;

			if !retry.is_empty() && !self.is_low_relevance(&retry) {
				tracing::info!(query, reformulated = %reformulated, "Reformulated query succeeded.");

				let reformulation = QueryReformulation {
					original: query.to_string(),
					successful: reformulated.clone(),
				};

				return Ok(self.answer(reformulated, &retry, Some(reformulation), None).await);
			}
		}

		if contexts.is_empty() {
			return Ok(failure_message(&analysis));
		}

		Ok(self.answer(query, &contexts, None, Some(&analysis)).await)
	}

	/// Routed search, or filtered search when the caller restricted the bases.
	async fn retrieve(
		&self,
		query: &str,
		catalog: &[KnowledgeBaseDescriptor],
		filter: Option<&SearchFilter>,
	) -> Vec<SearchContext> {
		let targets = match filter {
			Some(filter) => filtered_targets(filter, catalog),
			None => routed_targets(self.map_query_to_kbs(query, catalog).await, catalog),
		};

		if targets.is_empty() {
			return Vec::new();
		}

		self.search_bases(query, &targets).await
	}

	fn is_low_relevance(&self, contexts: &[SearchContext]) -> bool {
		let threshold = self.cfg.failure.low_relevance_threshold;

		threshold > 0.0 && types::mean_relevance(contexts).is_some_and(|mean| mean < threshold)
	}

	async fn answer(
		&self,
		query: &str,
		contexts: &[SearchContext],
		reformulation: Option<QueryReformulation>,
		warning: Option<&SearchFailureAnalysis>,
	) -> Message {
		let messages = build_answer_messages(query, contexts);
		let body = match self.complete(&messages, ResponseFormat::Text).await {
			Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
			Ok(_) => {
				tracing::warn!("Answer synthesis returned an empty answer.");

				extractive_answer(contexts)
			},
			Err(err) => {
				tracing::warn!(error = %err, "Answer synthesis failed. Returning passages.");

				extractive_answer(contexts)
			},
		};
		let content = match reformulation.as_ref() {
			Some(reformulation) => format!(
				"No relevant results were found for \"{}\". This answer is based on the reformulated question \"{}\".\n\n{body}",
				reformulation.original, reformulation.successful
			),
			None => body,
		};
		let metadata = MessageMetadata {
			sources: contexts.iter().map(SourceRecord::from).collect(),
			failure_analysis: warning.map(FailureAnalysisRecord::from),
			query_reformulation: reformulation,
		};

		Message::assistant(content, metadata)
	}
}

fn filtered_targets(filter: &SearchFilter, catalog: &[KnowledgeBaseDescriptor]) -> Vec<SearchTarget> {
	filter
		.kb_ids()
		.into_iter()
		.map(|kb_id| SearchTarget {
			kb_title: coordinator::title_for(&kb_id, catalog),
			filter: filter.document_filter(&kb_id),
			mapping_score: 1.0,
			kb_id,
		})
		.collect()
}

fn build_answer_messages(query: &str, contexts: &[SearchContext]) -> Vec<ChatMessage> {
	let mut passages = String::new();

	for ctx in contexts {
		passages.push_str(&format!("## {}\n", ctx.kb_title));

		for passage in &ctx.passages {
			passages.push_str(&format!("[{}]\n{}\n\n", passage.document_title, passage.text));
		}
	}

	vec![
		ChatMessage::system(ANSWER_SYSTEM_PROMPT),
		ChatMessage::user(format!("Passages:\n\n{passages}Question:\n{query}")),
	]
}

fn extractive_answer(contexts: &[SearchContext]) -> String {
	let mut out =
		String::from("An answer could not be generated. The most relevant passages are:\n");

	for ctx in contexts {
		if let Some(passage) = ctx.passages.first() {
			out.push_str(&format!(
				"\n- {} / {}: {}",
				ctx.kb_title,
				passage.document_title,
				passage.text.trim()
			));
		}
	}

	out
}

fn failure_message(analysis: &SearchFailureAnalysis) -> Message {
	let headline = match analysis.failure_kind {
		FailureKind::NoKnowledgeBase => "No knowledge base is available to answer this question.",
		FailureKind::NoResults => "No relevant information was found for this question.",
		FailureKind::LowRelevance => "Only weakly relevant information was found for this question.",
	};
	let mut content = format!("{headline}\n\nPossible causes:\n{}", bullets(&analysis.possible_causes));

	content.push_str(&format!("\n\nSuggestions:\n{}", bullets(&analysis.suggested_actions)));

	if let Some(reformulations) = analysis.reformulated_queries.as_ref().filter(|r| !r.is_empty()) {
		content.push_str(&format!("\n\nYou could try:\n{}", bullets(reformulations)));
	}

	let metadata = MessageMetadata {
		failure_analysis: Some(FailureAnalysisRecord::from(analysis)),
		..Default::default()
	};

	Message::assistant(content, metadata)
}

fn bullets(items: &[String]) -> String {
	items.iter().map(|item| format!("- {item}")).collect::<Vec<_>>().join("\n")
}
