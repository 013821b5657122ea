use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Characters of passage text that take part in the deduplication key.
pub const DEDUP_PREFIX_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeBaseDescriptor {
	pub id: String,
	pub title: String,
	#[serde(default)]
	pub description: String,
	#[serde(default)]
	pub language: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
	pub start: Option<u32>,
	pub end: Option<u32>,
}
impl PageRange {
	pub fn new(start: Option<u32>, end: Option<u32>) -> Option<Self> {
		if start.is_none() && end.is_none() {
			return None;
		}

		Some(Self { start, end })
	}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageReference {
	pub document_id: String,
	pub document_title: String,
	pub text: String,
	pub relevance_score: f32,
	pub page_range: Option<PageRange>,
	#[serde(default)]
	pub metadata: Map<String, Value>,
}
impl PassageReference {
	/// Identity used when merging results of different retrieval strategies.
	pub fn dedup_key(&self) -> (String, String) {
		let prefix = self.text.chars().take(DEDUP_PREFIX_CHARS).collect();

		(self.document_id.clone(), prefix)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
	Equals,
	In,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
	One(String),
	Many(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter {
	pub field: String,
	pub operator: FilterOperator,
	pub value: FilterValue,
}
impl MetadataFilter {
	pub const DOC_ID_FIELD: &'static str = "doc_id";

	pub fn doc_ids(ids: Vec<String>) -> Self {
		Self {
			field: Self::DOC_ID_FIELD.to_string(),
			operator: FilterOperator::In,
			value: FilterValue::Many(ids),
		}
	}

	pub fn matches(&self, document_id: &str, metadata: &Map<String, Value>) -> bool {
		let candidate = if self.field == Self::DOC_ID_FIELD {
			document_id.to_string()
		} else {
			match metadata.get(&self.field) {
				Some(Value::String(raw)) => raw.clone(),
				Some(Value::Null) | None => return false,
				Some(other) => other.to_string(),
			}
		};

		match (self.operator, &self.value) {
			(FilterOperator::Equals, FilterValue::One(expected)) => &candidate == expected,
			(FilterOperator::Equals, FilterValue::Many(_)) => false,
			(FilterOperator::In, FilterValue::One(expected)) => &candidate == expected,
			(FilterOperator::In, FilterValue::Many(expected)) =>
				expected.iter().any(|value| value == &candidate),
		}
	}
}
