use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use dossier_domain::PageRange;

use crate::types::{FailureKind, SearchContext, SearchFailureAnalysis};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
	User,
	Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
	pub role: Role,
	pub content: String,
	#[serde(with = "rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(default)]
	pub metadata: MessageMetadata,
}
impl Message {
	pub fn user(content: impl Into<String>) -> Self {
		Self {
			role: Role::User,
			content: content.into(),
			created_at: OffsetDateTime::now_utc(),
			metadata: MessageMetadata::default(),
		}
	}

	pub fn assistant(content: impl Into<String>, metadata: MessageMetadata) -> Self {
		Self {
			role: Role::Assistant,
			content: content.into(),
			created_at: OffsetDateTime::now_utc(),
			metadata,
		}
	}

	pub fn failure_kind(&self) -> Option<FailureKind> {
		self.metadata.failure_analysis.as_ref().map(|analysis| analysis.kind)
	}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub sources: Vec<SourceRecord>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub failure_analysis: Option<FailureAnalysisRecord>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub query_reformulation: Option<QueryReformulation>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
	pub kb_id: String,
	pub kb_title: String,
	pub mapping_score: f32,
	pub passages: Vec<SourcePassage>,
}
impl From<&SearchContext> for SourceRecord {
	fn from(ctx: &SearchContext) -> Self {
		Self {
			kb_id: ctx.kb_id.clone(),
			kb_title: ctx.kb_title.clone(),
			mapping_score: ctx.mapping_score,
			passages: ctx
				.passages
				.iter()
				.map(|passage| SourcePassage {
					document_id: passage.document_id.clone(),
					document_title: passage.document_title.clone(),
					relevance_score: passage.relevance_score,
					page_range: passage.page_range,
				})
				.collect(),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourcePassage {
	pub document_id: String,
	pub document_title: String,
	pub relevance_score: f32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub page_range: Option<PageRange>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureAnalysisRecord {
	#[serde(rename = "type")]
	pub kind: FailureKind,
	pub causes: Vec<String>,
	pub suggestions: Vec<String>,
	#[serde(default)]
	pub reformulations: Vec<String>,
}
impl From<&SearchFailureAnalysis> for FailureAnalysisRecord {
	fn from(analysis: &SearchFailureAnalysis) -> Self {
		Self {
			kind: analysis.failure_kind,
			causes: analysis.possible_causes.clone(),
			suggestions: analysis.suggested_actions.clone(),
			reformulations: analysis.reformulated_queries.clone().unwrap_or_default(),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryReformulation {
	pub original: String,
	pub successful: String,
}

mod rfc3339 {
	use serde::{Deserialize, Deserializer, Serializer};
	use time::{OffsetDateTime, format_description::well_known::Rfc3339};

	pub fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&value.format(&Rfc3339).map_err(serde::ser::Error::custom)?)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		OffsetDateTime::parse(&raw, &Rfc3339).map_err(serde::de::Error::custom)
	}
}
