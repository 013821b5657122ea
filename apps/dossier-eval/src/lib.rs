use std::{
	fs,
	path::{Path, PathBuf},
	sync::Arc,
	time::Instant,
};

use clap::Parser;
use color_eyre::eyre;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use dossier_service::{ConversationHistory, DossierService, FailureKind, SearchFilter};
use dossier_storage::MemoryEngine;

#[derive(Debug, Parser)]
#[command(
	version = dossier_cli::VERSION,
	rename_all = "kebab",
	styles = dossier_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[arg(long, short = 'd', value_name = "FILE")]
	pub dataset: PathBuf,
	/// Writes the report here instead of stdout.
	#[arg(long, short = 'o', value_name = "FILE")]
	pub out: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
pub struct EvalDataset {
	#[serde(default)]
	pub name: Option<String>,
	pub queries: Vec<EvalQuery>,
}

#[derive(Debug, Deserialize)]
pub struct EvalQuery {
	#[serde(default)]
	pub id: Option<String>,
	pub query: String,
	#[serde(default)]
	pub expected_kb_ids: Vec<String>,
	#[serde(default)]
	pub filter: Option<SearchFilter>,
}

#[derive(Debug, Serialize)]
pub struct EvalOutput {
	pub dataset: EvalDatasetInfo,
	#[serde(with = "time::serde::rfc3339")]
	pub generated_at: OffsetDateTime,
	pub summary: EvalSummary,
	pub queries: Vec<QueryReport>,
}

#[derive(Debug, Serialize)]
pub struct EvalDatasetInfo {
	pub name: String,
	pub query_count: usize,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct EvalSummary {
	/// Share of queries with expectations where an expected base was selected.
	pub routing_hit_rate: f64,
	/// Share of queries with expectations where an expected base was cited.
	pub source_hit_rate: f64,
	pub failure_rate: f64,
	pub reformulation_rate: f64,
	pub latency_ms_p50: f64,
	pub latency_ms_p95: f64,
}

#[derive(Debug, Serialize)]
pub struct QueryReport {
	pub id: String,
	pub query: String,
	pub expected_kb_ids: Vec<String>,
	pub selected_kb_ids: Vec<String>,
	pub source_kb_ids: Vec<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub routing_hit: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub source_hit: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub failure_kind: Option<FailureKind>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reformulated_query: Option<String>,
	pub latency_ms: f64,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = dossier_config::load(&args.config)?;
	tracing_subscriber::fmt().with_env_filter(env_filter(&config.service.log_level)).init();

	let dataset = load_dataset(&args.dataset)?;
	let Some(corpus) = config.corpus.as_ref() else {
		return Err(eyre::eyre!("Evaluation requires a [corpus] section in the config."));
	};
	let engine = MemoryEngine::open(&corpus.path)?;
	let service = DossierService::new(config, Arc::new(engine));
	let output = evaluate(&service, &dataset).await?;
	let json = serde_json::to_string_pretty(&output)?;

	match args.out.as_ref() {
		Some(path) => {
			fs::write(path, json)?;

			tracing::info!(path = %path.display(), "Evaluation report written.");
		},
		None => println!("{json}"),
	}

	Ok(())
}

/// Falls back to `info` when `log_level` is not a valid filter directive.
fn env_filter(log_level: &str) -> EnvFilter {
	EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn load_dataset(path: &Path) -> color_eyre::Result<EvalDataset> {
	let raw = fs::read_to_string(path)?;
	let dataset: EvalDataset = serde_json::from_str(&raw)?;

	if dataset.queries.is_empty() {
		return Err(eyre::eyre!("Dataset must include at least one query."));
	}
	if let Some(idx) = dataset.queries.iter().position(|q| q.query.trim().is_empty()) {
		return Err(eyre::eyre!("Dataset query {idx} is empty."));
	}

	Ok(dataset)
}

/// Replays every query through a fresh conversation.
pub async fn evaluate(
	service: &DossierService,
	dataset: &EvalDataset,
) -> color_eyre::Result<EvalOutput> {
	let catalog = service.catalog.list().await?;
	let mut reports = Vec::with_capacity(dataset.queries.len());

	for (idx, query) in dataset.queries.iter().enumerate() {
		let filter = query.filter.as_ref().filter(|filter| filter.is_active());
		let selected_kb_ids = match filter {
			Some(filter) => filter.kb_ids(),
			None => service
				.map_query_to_kbs(&query.query, &catalog)
				.await
				.into_iter()
				.map(|mapping| mapping.kb_id)
				.collect(),
		};
		let mut history = ConversationHistory::new();
		let started = Instant::now();
		let message = service.process_message(&mut history, &query.query, filter).await;
		let latency_ms = started.elapsed().as_secs_f64() * 1_000.0;
		let source_kb_ids =
			message.metadata.sources.iter().map(|source| source.kb_id.clone()).collect::<Vec<_>>();
		let expected = &query.expected_kb_ids;

		reports.push(QueryReport {
			id: query.id.clone().unwrap_or_else(|| format!("q{}", idx + 1)),
			query: query.query.clone(),
			expected_kb_ids: expected.clone(),
			routing_hit: hit(expected, &selected_kb_ids),
			source_hit: hit(expected, &source_kb_ids),
			selected_kb_ids,
			source_kb_ids,
			failure_kind: message.failure_kind(),
			reformulated_query: message
				.metadata
				.query_reformulation
				.as_ref()
				.map(|reformulation| reformulation.successful.clone()),
			latency_ms,
		});
	}

	Ok(EvalOutput {
		dataset: EvalDatasetInfo {
			name: dataset.name.clone().unwrap_or_else(|| "unnamed".to_string()),
			query_count: dataset.queries.len(),
		},
		generated_at: OffsetDateTime::now_utc(),
		summary: summarize(&reports),
		queries: reports,
	})
}

/// `None` when the query carries no expectation.
fn hit(expected: &[String], actual: &[String]) -> Option<bool> {
	if expected.is_empty() {
		return None;
	}

	Some(expected.iter().any(|id| actual.contains(id)))
}

fn summarize(reports: &[QueryReport]) -> EvalSummary {
	let count = reports.len().max(1) as f64;
	let failures = reports.iter().filter(|r| r.failure_kind.is_some()).count() as f64;
	let reformulated = reports.iter().filter(|r| r.reformulated_query.is_some()).count() as f64;
	let mut latencies = reports.iter().map(|r| r.latency_ms).collect::<Vec<_>>();

	latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

	EvalSummary {
		routing_hit_rate: rate(reports.iter().map(|r| r.routing_hit)),
		source_hit_rate: rate(reports.iter().map(|r| r.source_hit)),
		failure_rate: failures / count,
		reformulation_rate: reformulated / count,
		latency_ms_p50: percentile(&latencies, 0.50),
		latency_ms_p95: percentile(&latencies, 0.95),
	}
}

fn rate(hits: impl Iterator<Item = Option<bool>>) -> f64 {
	let (total, matched) = hits.flatten().fold((0_usize, 0_usize), |(total, matched), value| {
		(total + 1, matched + usize::from(value))
	});

	if total == 0 { 0.0 } else { matched as f64 / total as f64 }
}

fn percentile(values: &[f64], percentile: f64) -> f64 {
	if values.is_empty() {
		return 0.0;
	}

	let clamped = percentile.clamp(0.0, 1.0);
	let pos = clamped * (values.len() as f64 - 1.0);
	let lower = pos.floor() as usize;
	let upper = pos.ceil() as usize;

	if lower == upper {
		values[lower]
	} else {
		let weight = pos - lower as f64;

		values[lower] * (1.0 - weight) + values[upper] * weight
	}
}
