use std::{
	collections::{HashMap, HashSet},
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use dossier_config::{CompletionProviderConfig, Config};
use dossier_domain::{KnowledgeBaseDescriptor, MetadataFilter, RetrievalPreset};
use dossier_providers::{ChatMessage, ResponseFormat};
use dossier_service::{
	BoxFuture, ConversationHistory, DossierService, Error, FailureKind, KnowledgeBase,
	KnowledgeBaseCatalog, Providers, Result, Role, SearchFilter, TextCompletion,
};
use dossier_storage::models::{ChunkRecord, DocumentRecord, SegmentHit, SimilarityHit};

const ROUTE: &str = "route";
const ANALYZE: &str = "analyze";
const REFORMULATE: &str = "reformulate";
const ANSWER: &str = "answer";

#[derive(Default)]
struct ScriptedCompletion {
	route: Option<String>,
	analysis: Option<String>,
	reformulations: Option<String>,
	answer: Option<String>,
	calls: AtomicUsize,
	kinds: Mutex<Vec<&'static str>>,
}
impl ScriptedCompletion {
	fn kinds(&self) -> Vec<&'static str> {
		self.kinds.lock().expect("kinds lock").clone()
	}
}

impl TextCompletion for ScriptedCompletion {
	fn complete<'a>(
		&'a self,
		_cfg: &'a CompletionProviderConfig,
		messages: &'a [ChatMessage],
		_format: ResponseFormat,
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			let first = messages.first().map(|m| m.content.as_str()).unwrap_or_default();
			let (kind, reply) = if first.starts_with("You route questions") {
				(ROUTE, &self.route)
			} else if first.starts_with("You diagnose failed") {
				(ANALYZE, &self.analysis)
			} else if first.starts_with("You answer questions") {
				(ANSWER, &self.answer)
			} else {
				(REFORMULATE, &self.reformulations)
			};

			self.kinds.lock().expect("kinds lock").push(kind);

			reply.clone().ok_or_else(|| Error::Provider { message: format!("no scripted {kind} reply") })
		})
	}
}

struct SlowCompletion;

impl TextCompletion for SlowCompletion {
	fn complete<'a>(
		&'a self,
		_cfg: &'a CompletionProviderConfig,
		_messages: &'a [ChatMessage],
		_format: ResponseFormat,
	) -> BoxFuture<'a, Result<String>> {
		Box::pin(async move {
			tokio::time::sleep(Duration::from_secs(5)).await;

			Ok("{\"mappings\": []}".to_string())
		})
	}
}

#[derive(Default)]
struct FakeKb {
	segments: HashMap<String, Vec<SegmentHit>>,
	similar: HashMap<String, Vec<SimilarityHit>>,
	documents: Vec<(DocumentRecord, Vec<ChunkRecord>)>,
	/// Segments are only returned when the preset budget is at least this large.
	segment_budget_gate: Option<u32>,
	fail_search: bool,
	/// Delay before every segment query returns.
	query_delay: Option<Duration>,
	queries: Mutex<Vec<(String, RetrievalPreset, Option<MetadataFilter>)>>,
}
impl FakeKb {
	fn queried_texts(&self) -> Vec<String> {
		self.queries.lock().expect("queries lock").iter().map(|(text, _, _)| text.clone()).collect()
	}
}

impl KnowledgeBase for FakeKb {
	fn query<'a>(
		&'a self,
		text: &'a str,
		preset: &'a RetrievalPreset,
		filter: Option<&'a MetadataFilter>,
	) -> BoxFuture<'a, Result<Vec<SegmentHit>>> {
		Box::pin(async move {
			self.queries.lock().expect("queries lock").push((
				text.to_string(),
				*preset,
				filter.cloned(),
			));

			if let Some(delay) = self.query_delay {
				tokio::time::sleep(delay).await;
			}

			if self.segment_budget_gate.is_some_and(|gate| preset.overall_max_length < gate) {
				return Ok(Vec::new());
			}

			Ok(self.segments.get(text).cloned().unwrap_or_default())
		})
	}

	fn search<'a>(
		&'a self,
		text: &'a str,
		limit: usize,
		_filter: Option<&'a MetadataFilter>,
	) -> BoxFuture<'a, Result<Vec<SimilarityHit>>> {
		Box::pin(async move {
			if self.fail_search {
				return Err(Error::Storage { message: "index offline".to_string() });
			}

			let mut hits = self.similar.get(text).cloned().unwrap_or_default();

			hits.truncate(limit);

			Ok(hits)
		})
	}

	fn document_ids<'a>(&'a self) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move {
			Ok(self.documents.iter().map(|(doc, _)| doc.document_id.clone()).collect())
		})
	}

	fn document<'a>(&'a self, document_id: &'a str) -> BoxFuture<'a, Result<Option<DocumentRecord>>> {
		Box::pin(async move {
			Ok(self
				.documents
				.iter()
				.find(|(doc, _)| doc.document_id == document_id)
				.map(|(doc, _)| doc.clone()))
		})
	}

	fn chunk<'a>(
		&'a self,
		document_id: &'a str,
		chunk_index: usize,
	) -> BoxFuture<'a, Result<Option<ChunkRecord>>> {
		Box::pin(async move {
			Ok(self
				.documents
				.iter()
				.find(|(doc, _)| doc.document_id == document_id)
				.and_then(|(_, chunks)| chunks.get(chunk_index).cloned()))
		})
	}
}

#[derive(Default)]
struct FakeCatalog {
	descriptors: Vec<KnowledgeBaseDescriptor>,
	bases: HashMap<String, Arc<FakeKb>>,
	broken: HashSet<String>,
	fail_list: bool,
}
impl FakeCatalog {
	fn with_base(mut self, id: &str, description: &str, kb: FakeKb) -> Self {
		self.descriptors.push(descriptor(id, description));
		self.bases.insert(id.to_string(), Arc::new(kb));

		self
	}

	fn base(&self, id: &str) -> Arc<FakeKb> {
		self.bases.get(id).cloned().expect("Unknown fake base.")
	}
}

impl KnowledgeBaseCatalog for FakeCatalog {
	fn list<'a>(&'a self) -> BoxFuture<'a, Result<Vec<KnowledgeBaseDescriptor>>> {
		Box::pin(async move {
			if self.fail_list {
				return Err(Error::Storage { message: "catalog offline".to_string() });
			}

			Ok(self.descriptors.clone())
		})
	}

	fn load<'a>(&'a self, kb_id: &'a str) -> BoxFuture<'a, Result<Option<Arc<dyn KnowledgeBase>>>> {
		Box::pin(async move {
			if self.broken.contains(kb_id) {
				return Err(Error::Storage { message: format!("{kb_id} is corrupted") });
			}

			Ok(self.bases.get(kb_id).cloned().map(|kb| kb as Arc<dyn KnowledgeBase>))
		})
	}
}

fn test_config() -> Config {
	Config {
		service: dossier_config::Service {
			http_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
		},
		providers: dossier_config::Providers {
			completion: CompletionProviderConfig {
				provider_id: "test".to_string(),
				api_style: "openai".to_string(),
				api_base: "http://127.0.0.1:9".to_string(),
				api_key: "test-key".to_string(),
				path: "/v1/chat/completions".to_string(),
				model: "test".to_string(),
				temperature: 0.0,
				max_tokens: 256,
				timeout_ms: 1_000,
				default_headers: Default::default(),
			},
		},
		routing: Default::default(),
		search: Default::default(),
		failure: Default::default(),
		corpus: None,
	}
}

fn descriptor(id: &str, description: &str) -> KnowledgeBaseDescriptor {
	KnowledgeBaseDescriptor {
		id: id.to_string(),
		title: format!("{}{}", id[..1].to_uppercase(), &id[1..]),
		description: description.to_string(),
		language: "fr".to_string(),
	}
}

fn document(id: &str, chunks: &[&str]) -> (DocumentRecord, Vec<ChunkRecord>) {
	let record = DocumentRecord {
		document_id: id.to_string(),
		title: format!("Document {id}"),
		metadata: Default::default(),
	};
	let chunks = chunks
		.iter()
		.enumerate()
		.map(|(chunk_index, text)| ChunkRecord {
			document_id: id.to_string(),
			chunk_index,
			text: text.to_string(),
			page_range: None,
			title: None,
		})
		.collect();

	(record, chunks)
}

fn segment(document_id: &str, text: &str, score: f32) -> SegmentHit {
	SegmentHit {
		document_id: document_id.to_string(),
		chunk_start: 0,
		chunk_end: 1,
		text: text.to_string(),
		score,
		page_range: None,
	}
}

fn mappings(pairs: &[(&str, f32)]) -> String {
	let items: Vec<_> = pairs
		.iter()
		.map(|(kb_id, score)| {
			serde_json::json!({ "kb_id": kb_id, "relevance_score": score, "reasoning": "scripted" })
		})
		.collect();

	serde_json::json!({ "mappings": items }).to_string()
}

fn service(catalog: FakeCatalog, completion: Arc<dyn TextCompletion>) -> (DossierService, Arc<FakeCatalog>) {
	let catalog = Arc::new(catalog);
	let service = DossierService::with_providers(
		test_config(),
		catalog.clone(),
		Providers::new(completion),
	);

	(service, catalog)
}

#[tokio::test]
async fn empty_catalog_reports_no_knowledge_base_without_completion_calls() {
	let completion = Arc::new(ScriptedCompletion::default());
	let (service, _) = service(FakeCatalog::default(), completion.clone());
	let mut history = ConversationHistory::new();
	let message = service.process_message(&mut history, "hello", None).await;

	assert_eq!(message.role, Role::Assistant);
	assert_eq!(message.failure_kind(), Some(FailureKind::NoKnowledgeBase));
	assert_eq!(completion.calls.load(Ordering::SeqCst), 0);
	assert_eq!(history.len(), 2);

	let json = serde_json::to_value(&message).expect("serialize");

	assert_eq!(json["metadata"]["failure_analysis"]["type"], "no_kb");
}

#[tokio::test]
async fn routed_answer_cites_the_single_selected_base() {
	let query = "normes compliance requirements";
	let kb = FakeKb {
		segments: HashMap::from([(
			query.to_string(),
			vec![segment("iso", "Compliance requirements cover hazard identification.", 0.9)],
		)]),
		documents: vec![document("iso", &["Compliance requirements cover hazard identification."])],
		..Default::default()
	};
	let catalog = FakeCatalog::default().with_base("normes", "safety standards", kb);
	let completion = Arc::new(ScriptedCompletion {
		route: Some(mappings(&[("normes", 0.9)])),
		answer: Some("Hazards must be identified.".to_string()),
		..Default::default()
	});
	let (service, catalog) = service(catalog, completion.clone());
	let routed = service.map_query_to_kbs(query, &catalog.descriptors).await;

	assert_eq!(routed.iter().map(|m| m.kb_id.as_str()).collect::<Vec<_>>(), vec!["normes"]);

	let mut history = ConversationHistory::new();
	let message = service.process_message(&mut history, query, None).await;

	assert_eq!(message.content, "Hazards must be identified.");
	assert_eq!(message.metadata.sources.len(), 1);
	assert_eq!(message.metadata.sources[0].kb_id, "normes");
	assert_eq!(message.metadata.sources[0].passages[0].document_title, "Document iso");
	assert!(message.metadata.failure_analysis.is_none());
	assert_eq!(history.messages()[0].role, Role::User);
}

#[tokio::test]
async fn classifier_output_is_thresholded_sorted_and_capped() {
	let catalog = FakeCatalog::default()
		.with_base("finance", "budgets", FakeKb::default())
		.with_base("it", "laptops", FakeKb::default())
		.with_base("rh", "holidays", FakeKb::default())
		.with_base("legal", "contracts", FakeKb::default());
	let completion = Arc::new(ScriptedCompletion {
		route: Some(format!(
			"Sure! {}",
			mappings(&[("finance", 0.65), ("it", 0.5), ("rh", 0.95), ("legal", 0.7)])
		)),
		..Default::default()
	});
	let (service, catalog) = service(catalog, completion);
	let out = service.classify("how many days off do I get", &catalog.descriptors).await;

	assert_eq!(out.len(), 2);
	assert!(out.iter().all(|m| m.relevance_score >= 0.6));
	assert!(out.windows(2).all(|pair| pair[0].relevance_score >= pair[1].relevance_score));
	assert_eq!(out[0].kb_id, "rh");
	assert_eq!(out[1].kb_id, "legal");
}

#[tokio::test]
async fn explicit_mention_forces_full_score() {
	let catalog = FakeCatalog::default()
		.with_base("normes", "standards", FakeKb::default())
		.with_base("rh", "holidays", FakeKb::default());
	let completion = Arc::new(ScriptedCompletion {
		route: Some(mappings(&[("rh", 0.8), ("normes", 0.1)])),
		..Default::default()
	});
	let (service, catalog) = service(catalog, completion);
	let out = service.classify("What do the NORMES say about noise?", &catalog.descriptors).await;
	let normes = out.iter().find(|m| m.kb_id == "normes").expect("normes must be selected");

	assert_eq!(normes.relevance_score, 1.0);
	assert_eq!(out[0].kb_id, "normes");
}

#[tokio::test]
async fn priority_base_takes_the_second_routing_slot() {
	let catalog = FakeCatalog::default()
		.with_base("rh", "holidays", FakeKb::default())
		.with_base("finance", "budgets", FakeKb::default())
		.with_base("normes", "standards", FakeKb::default());
	let completion = Arc::new(ScriptedCompletion {
		route: Some(mappings(&[("rh", 0.9), ("finance", 0.85), ("normes", 0.7)])),
		..Default::default()
	});
	let (service, catalog) = service(catalog, completion);
	let routed = service.map_query_to_kbs("overtime rules", &catalog.descriptors).await;

	assert_eq!(routed.iter().map(|m| m.kb_id.as_str()).collect::<Vec<_>>(), vec!["rh", "normes"]);
}

#[tokio::test]
async fn classifier_failure_falls_back_to_catalog_wide_mapping() {
	let catalog = FakeCatalog::default()
		.with_base("normes", "standards", FakeKb::default())
		.with_base("rh", "holidays", FakeKb::default());
	let (service, catalog) = service(catalog, Arc::new(ScriptedCompletion::default()));
	let out = service.map_query_to_kbs("anything", &catalog.descriptors).await;

	assert_eq!(out.len(), 2);
	assert!(out.iter().all(|m| m.relevance_score == 0.6));
}

#[tokio::test]
async fn unparseable_classifier_reply_falls_back_to_catalog_wide_mapping() {
	let catalog = FakeCatalog::default()
		.with_base("normes", "standards", FakeKb::default())
		.with_base("rh", "holidays", FakeKb::default());
	let completion = Arc::new(ScriptedCompletion {
		route: Some("not json at all".to_string()),
		..Default::default()
	});
	let (service, catalog) = service(catalog, completion.clone());
	let out = service.map_query_to_kbs("anything", &catalog.descriptors).await;

	assert_eq!(completion.kinds(), vec![ROUTE]);
	assert_eq!(out.iter().map(|m| m.kb_id.as_str()).collect::<Vec<_>>(), vec!["normes", "rh"]);
	assert!(out.iter().all(|m| m.relevance_score == 0.6));
}

#[tokio::test]
async fn unparseable_analysis_reply_uses_the_default_no_results_analysis() {
	let query = "Quel est exactement le code X-42";
	let catalog = FakeCatalog::default().with_base("normes", "safety standards", FakeKb::default());
	let garbled = Arc::new(ScriptedCompletion {
		analysis: Some("nope".to_string()),
		..Default::default()
	});
	let (offline, _) = service(
		FakeCatalog::default().with_base("normes", "safety standards", FakeKb::default()),
		Arc::new(ScriptedCompletion::default()),
	);
	let (garbled_service, catalog) = service(catalog, garbled.clone());
	let analysis = garbled_service.analyze_failure(query, &catalog.descriptors, &[]).await;
	let fallback = offline.analyze_failure(query, &catalog.descriptors, &[]).await;

	assert_eq!(garbled.kinds(), vec![ANALYZE]);
	assert_eq!(analysis.failure_kind, FailureKind::NoResults);
	assert!(!analysis.possible_causes.is_empty());
	assert!(!analysis.suggested_actions.is_empty());
	assert_eq!(
		analysis.reformulated_queries,
		Some(vec!["Quel est le code".to_string(), "Quel est exactement le code".to_string()])
	);
	assert_eq!(analysis, fallback);
}

#[tokio::test]
async fn classifier_timeout_is_treated_as_a_failure() {
	let catalog = FakeCatalog::default().with_base("rh", "holidays", FakeKb::default());
	let catalog = Arc::new(catalog);
	let mut cfg = test_config();

	cfg.providers.completion.timeout_ms = 20;

	let service = DossierService::with_providers(
		cfg,
		catalog.clone(),
		Providers::new(Arc::new(SlowCompletion)),
	);
	let out = service.map_query_to_kbs("anything", &catalog.descriptors).await;

	assert_eq!(out.len(), 1);
	assert_eq!(out[0].kb_id, "rh");
}

#[tokio::test]
async fn reformulation_retries_stop_at_the_first_success() {
	let kb = FakeKb {
		segments: HashMap::from([(
			"fire drills".to_string(),
			vec![segment("fire", "Fire drills must be held twice a year.", 0.9)],
		)]),
		documents: vec![document("fire", &["Fire drills must be held twice a year."])],
		..Default::default()
	};
	let catalog = FakeCatalog::default().with_base("normes", "safety standards", kb);
	let completion = Arc::new(ScriptedCompletion {
		route: Some(mappings(&[("normes", 0.9)])),
		analysis: Some(
			serde_json::json!({
				"possible_causes": ["Unknown terms."],
				"suggested_actions": ["Rephrase."],
				"reformulations": ["payroll calendar", "fire drills", "evacuation plan"]
			})
			.to_string(),
		),
		answer: Some("Twice a year.".to_string()),
		..Default::default()
	});
	let (service, catalog) = service(catalog, completion.clone());
	let mut history = ConversationHistory::new();
	let message = service.process_message(&mut history, "quarterly payroll calendar", None).await;
	let queried = catalog.base("normes").queried_texts();

	assert!(message.content.starts_with("No relevant results were found for \"quarterly payroll calendar\""));
	assert!(message.content.ends_with("Twice a year."));
	assert_eq!(
		message.metadata.query_reformulation.as_ref().map(|r| r.successful.as_str()),
		Some("fire drills")
	);
	assert!(queried.iter().any(|text| text == "payroll calendar"));
	assert!(queried.iter().any(|text| text == "fire drills"));
	assert!(!queried.iter().any(|text| text == "evacuation plan"));
	assert_eq!(completion.kinds().iter().filter(|kind| **kind == ANALYZE).count(), 1);
	assert_eq!(completion.kinds().last(), Some(&ANSWER));
}

#[tokio::test]
async fn exhausted_reformulations_return_the_failure_analysis() {
	let catalog = FakeCatalog::default().with_base("normes", "safety standards", FakeKb::default());
	let completion = Arc::new(ScriptedCompletion {
		route: Some(mappings(&[("normes", 0.9)])),
		..Default::default()
	});
	let (service, _) = service(catalog, completion.clone());
	let mut history = ConversationHistory::new();
	let message = service.process_message(&mut history, "Quel est exactement le code X-42", None).await;
	let analysis = message.metadata.failure_analysis.as_ref().expect("failure analysis");

	assert_eq!(analysis.kind, FailureKind::NoResults);
	assert!(!analysis.causes.is_empty());
	assert!(!analysis.suggestions.is_empty());
	assert_eq!(analysis.reformulations[0], "Quel est le code");
	assert!(message.content.contains("You could try:"));
	assert!(!completion.kinds().contains(&ANSWER));
	assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn keyword_only_fallback_scores_and_penalises_matches() {
	let kb = FakeKb {
		fail_search: true,
		documents: vec![document("report", &[
			"The 2023 edition of the safety report covers all sites.",
			"Unrelated cafeteria menu.",
		])],
		..Default::default()
	};
	let (service, _) = service(FakeCatalog::default(), Arc::new(ScriptedCompletion::default()));
	let out = service.combined_search("normes", &kb, "annual safety report 2023", None, 0.3).await;

	assert_eq!(out.len(), 1);
	assert!((out[0].relevance_score - 0.85 * 0.9).abs() < 1e-5);
	assert_eq!(out[0].document_title, "Document report");
}

#[tokio::test]
async fn combined_search_is_deterministic_deduplicated_and_capped() {
	let chunks = [
		"safety report section one",
		"safety report section two",
		"safety report section three",
		"safety report section four",
		"safety report section five",
	];
	let kb = FakeKb {
		similar: HashMap::from([(
			"safety report".to_string(),
			vec![
				SimilarityHit { document_id: "a".to_string(), chunk_index: 0, similarity: 0.95 },
				SimilarityHit { document_id: "b".to_string(), chunk_index: 0, similarity: 0.2 },
			],
		)]),
		documents: vec![document("a", &chunks), document("b", &["safety report annex"])],
		..Default::default()
	};
	let (service, _) = service(FakeCatalog::default(), Arc::new(ScriptedCompletion::default()));
	let first = service.combined_search("normes", &kb, "safety report", None, 0.3).await;
	let second = service.combined_search("normes", &kb, "safety report", None, 0.3).await;

	assert_eq!(first, second);

	let keys: HashSet<_> = first.iter().map(|p| p.dedup_key()).collect();

	assert_eq!(keys.len(), first.len());
	assert_eq!(first.len(), 4);
	assert_eq!(first.iter().filter(|p| p.document_id == "a").count(), 3);
	assert_eq!(first[0].relevance_score, 0.95);
	assert_eq!(first[0].text, "safety report section one");
	assert!(first.iter().any(|p| p.document_id == "b" && (p.relevance_score - 0.9).abs() < 1e-5));
}

#[tokio::test]
async fn broken_bases_are_skipped() {
	let query = "fire drills";
	let kb = FakeKb {
		segments: HashMap::from([(query.to_string(), vec![segment("fire", "Fire drills twice a year.", 0.9)])]),
		documents: vec![document("fire", &["Fire drills twice a year."])],
		..Default::default()
	};
	let mut catalog = FakeCatalog::default()
		.with_base("normes", "standards", kb)
		.with_base("rh", "holidays", FakeKb::default());

	catalog.broken.insert("rh".to_string());

	let completion = Arc::new(ScriptedCompletion {
		route: Some(mappings(&[("rh", 0.9), ("normes", 0.8)])),
		answer: Some("Twice a year.".to_string()),
		..Default::default()
	});
	let (service, _) = service(catalog, completion);
	let mut history = ConversationHistory::new();
	let message = service.process_message(&mut history, query, None).await;

	assert_eq!(message.metadata.sources.len(), 1);
	assert_eq!(message.metadata.sources[0].kb_id, "normes");
}

#[tokio::test]
async fn contexts_follow_routing_order_when_the_first_base_is_slower() {
	let query = "fire drills";
	let slow = FakeKb {
		segments: HashMap::from([(query.to_string(), vec![segment("fire", "Fire drills twice a year.", 0.9)])]),
		documents: vec![document("fire", &["Fire drills twice a year."])],
		query_delay: Some(Duration::from_millis(100)),
		..Default::default()
	};
	let fast = FakeKb {
		segments: HashMap::from([(query.to_string(), vec![segment("drills", "Drill attendance is paid time.", 0.9)])]),
		documents: vec![document("drills", &["Drill attendance is paid time."])],
		..Default::default()
	};
	let catalog = FakeCatalog::default()
		.with_base("normes", "standards", slow)
		.with_base("rh", "holidays", fast);
	let completion = Arc::new(ScriptedCompletion {
		route: Some(mappings(&[("normes", 0.9), ("rh", 0.8)])),
		answer: Some("Twice a year, on paid time.".to_string()),
		..Default::default()
	});
	let (service, _) = service(catalog, completion);
	let mut history = ConversationHistory::new();
	let message = service.process_message(&mut history, query, None).await;
	let kb_ids = message.metadata.sources.iter().map(|s| s.kb_id.as_str()).collect::<Vec<_>>();

	assert_eq!(kb_ids, vec!["normes", "rh"]);
}

#[tokio::test]
async fn weak_mapping_scores_lower_the_passage_floor() {
	let query = "fire drills";
	let kb = FakeKb {
		segments: HashMap::from([(query.to_string(), vec![segment("fire", "Fire drills twice a year.", 0.5)])]),
		documents: vec![document("fire", &["Fire drills twice a year."])],
		..Default::default()
	};
	let catalog = FakeCatalog::default().with_base("normes", "standards", kb);
	let (service, catalog) = service(catalog, Arc::new(ScriptedCompletion::default()));
	let base = catalog.base("normes");
	let strong_hits = service.search_passages("normes", base.as_ref(), query, None, 1.0).await;
	let weak_hits = service.search_passages("normes", base.as_ref(), query, None, 0.8).await;

	assert!(strong_hits.iter().all(|p| p.relevance_score != 0.5));
	assert_eq!(weak_hits.len(), 1);
	assert_eq!(weak_hits[0].relevance_score, 0.5);
}

#[tokio::test]
async fn adaptive_recall_retries_broader_presets() {
	let query = "fire drills";
	let kb = FakeKb {
		segments: HashMap::from([(query.to_string(), vec![segment("fire", "Fire drills twice a year.", 0.9)])]),
		documents: vec![document("fire", &["Fire drills twice a year."])],
		segment_budget_gate: Some(150),
		..Default::default()
	};
	let (service, _) = service(FakeCatalog::default(), Arc::new(ScriptedCompletion::default()));
	let out = service.search_passages("normes", &kb, query, None, 1.0).await;
	let presets: Vec<_> =
		kb.queries.lock().expect("queries lock").iter().map(|(_, preset, _)| *preset).collect();

	assert_eq!(out.len(), 1);
	assert_eq!(presets.len(), 3);
	assert_eq!(presets[0].minimum_value, 0.5);
	assert!((presets[1].minimum_value - 0.1).abs() < 1e-6);
	assert_eq!(presets[1].overall_max_length, 75);
	assert!((presets[1].irrelevant_chunk_penalty - 0.12).abs() < 1e-6);
	assert_eq!(presets[2].overall_max_length, 150);
}

#[tokio::test]
async fn explicit_filter_skips_routing_and_restricts_documents() {
	let query = "fire drills";
	let kb = FakeKb {
		segments: HashMap::from([(query.to_string(), vec![segment("fire", "Fire drills twice a year.", 0.9)])]),
		documents: vec![document("fire", &["Fire drills twice a year."])],
		..Default::default()
	};
	let catalog = FakeCatalog::default()
		.with_base("normes", "standards", kb)
		.with_base("rh", "holidays", FakeKb::default());
	let completion = Arc::new(ScriptedCompletion {
		answer: Some("Twice a year.".to_string()),
		..Default::default()
	});
	let (service, catalog) = service(catalog, completion.clone());
	let filter = SearchFilter {
		kb_ids: None,
		doc_ids_by_kb: Some([("normes".to_string(), vec!["fire".to_string()])].into()),
	};
	let mut history = ConversationHistory::new();
	let message = service.process_message(&mut history, query, Some(&filter)).await;
	let recorded = catalog.base("normes").queries.lock().expect("queries lock").clone();

	assert_eq!(completion.kinds(), vec![ANSWER]);
	assert_eq!(message.metadata.sources.len(), 1);
	assert_eq!(message.metadata.sources[0].mapping_score, 1.0);
	assert_eq!(recorded[0].2, Some(MetadataFilter::doc_ids(vec!["fire".to_string()])));
	assert!(catalog.base("rh").queried_texts().is_empty());
}

#[tokio::test]
async fn synthesis_failure_returns_an_extractive_answer() {
	let query = "fire drills";
	let kb = FakeKb {
		segments: HashMap::from([(query.to_string(), vec![segment("fire", "Fire drills twice a year.", 0.9)])]),
		documents: vec![document("fire", &["Fire drills twice a year."])],
		..Default::default()
	};
	let catalog = FakeCatalog::default().with_base("normes", "standards", kb);
	let completion = Arc::new(ScriptedCompletion {
		route: Some(mappings(&[("normes", 0.9)])),
		..Default::default()
	});
	let (service, _) = service(catalog, completion);
	let mut history = ConversationHistory::new();
	let message = service.process_message(&mut history, query, None).await;

	assert!(message.content.contains("Fire drills twice a year."));
	assert_eq!(message.metadata.sources.len(), 1);
}

#[tokio::test]
async fn low_relevance_answers_with_a_warning_when_retries_fail() {
	let query = "fire drills";
	let kb = FakeKb {
		segments: HashMap::from([(query.to_string(), vec![segment("fire", "Fire drills twice a year.", 0.25)])]),
		documents: vec![document("fire", &["Held twice a year."])],
		..Default::default()
	};
	let catalog = FakeCatalog::default().with_base("normes", "standards", kb);
	let completion = Arc::new(ScriptedCompletion {
		route: Some(mappings(&[("normes", 0.4), ("normes", 0.5)])),
		reformulations: Some("1. fire drill schedule\n2. evacuation exercises".to_string()),
		answer: Some("Twice a year.".to_string()),
		..Default::default()
	});
	let mut cfg = test_config();

	cfg.routing.min_relevance = 0.3;
	cfg.routing.priority_kb_id = None;
	cfg.search.min_relevance = 0.2;

	let catalog = Arc::new(catalog);
	let service =
		DossierService::with_providers(cfg, catalog.clone(), Providers::new(completion.clone()));
	let mut history = ConversationHistory::new();
	let message = service.process_message(&mut history, query, None).await;
	let analysis = message.metadata.failure_analysis.as_ref().expect("relevance warning");
	let queried = catalog.base("normes").queried_texts();

	assert_eq!(message.content, "Twice a year.");
	assert_eq!(analysis.kind, FailureKind::LowRelevance);
	assert!(analysis.causes[0].contains("0.25"));
	assert_eq!(analysis.reformulations, vec!["fire drill schedule", "evacuation exercises"]);
	assert!(queried.iter().any(|text| text == "evacuation exercises"));
	assert!(completion.kinds().contains(&REFORMULATE));
}

#[tokio::test]
async fn catalog_errors_become_an_apology() {
	let catalog = FakeCatalog { fail_list: true, ..Default::default() };
	let (service, _) = service(catalog, Arc::new(ScriptedCompletion::default()));
	let mut history = ConversationHistory::new();
	let message = service.process_message(&mut history, "hello", None).await;

	assert!(message.content.starts_with("Sorry"));
	assert!(message.metadata.failure_analysis.is_none());
	assert_eq!(history.len(), 2);
	assert_eq!(history.last().map(|m| m.role), Some(Role::Assistant));
}
