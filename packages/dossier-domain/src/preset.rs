use serde::{Deserialize, Deserializer, Serialize, de};

/// Named recall/precision trade-off for a primary knowledge-base query.
///
/// Deserializes case-insensitively from its lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
	Precise,
	Balanced,
	Thorough,
	Exhaustive,
}
impl SearchMode {
	pub const ALL: [Self; 4] = [Self::Precise, Self::Balanced, Self::Thorough, Self::Exhaustive];

	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"precise" => Some(Self::Precise),
			"balanced" => Some(Self::Balanced),
			"thorough" => Some(Self::Thorough),
			"exhaustive" => Some(Self::Exhaustive),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Precise => "precise",
			Self::Balanced => "balanced",
			Self::Thorough => "thorough",
			Self::Exhaustive => "exhaustive",
		}
	}

	/// Modes that retrieve more than `self`, narrowest first.
	pub fn broader(self) -> impl Iterator<Item = Self> {
		Self::ALL.into_iter().filter(move |mode| *mode > self)
	}

	pub fn preset(self) -> RetrievalPreset {
		match self {
			Self::Precise => RetrievalPreset {
				max_length: 10,
				overall_max_length: 20,
				minimum_value: 0.7,
				irrelevant_chunk_penalty: 0.2,
				overall_max_length_extension: 3,
				decay_rate: 20.0,
				top_k_for_document_selection: 5,
				chunk_length_adjustment: true,
			},
			Self::Balanced => RetrievalPreset {
				max_length: 15,
				overall_max_length: 30,
				minimum_value: 0.5,
				irrelevant_chunk_penalty: 0.18,
				overall_max_length_extension: 5,
				decay_rate: 30.0,
				top_k_for_document_selection: 10,
				chunk_length_adjustment: true,
			},
			Self::Thorough => RetrievalPreset {
				max_length: 20,
				overall_max_length: 50,
				minimum_value: 0.3,
				irrelevant_chunk_penalty: 0.15,
				overall_max_length_extension: 8,
				decay_rate: 40.0,
				top_k_for_document_selection: 15,
				chunk_length_adjustment: true,
			},
			Self::Exhaustive => RetrievalPreset {
				max_length: 25,
				overall_max_length: 100,
				minimum_value: 0.1,
				irrelevant_chunk_penalty: 0.1,
				overall_max_length_extension: 10,
				decay_rate: 50.0,
				top_k_for_document_selection: 20,
				chunk_length_adjustment: true,
			},
		}
	}
}

impl<'de> Deserialize<'de> for SearchMode {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;

		Self::parse(&raw).ok_or_else(|| {
			de::Error::custom(format!(
				"unknown search mode {raw:?}, expected one of precise, balanced, thorough, or exhaustive"
			))
		})
	}
}

/// Segment extraction parameters handed to the knowledge-base engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrievalPreset {
	/// Maximum segment length, in chunks.
	pub max_length: u32,
	/// Total chunk budget across all returned segments.
	pub overall_max_length: u32,
	/// Relevance floor a segment must reach.
	pub minimum_value: f32,
	/// Penalty for each irrelevant chunk a segment straddles.
	pub irrelevant_chunk_penalty: f32,
	/// Extra budget granted when the best segments exceed the overall budget.
	pub overall_max_length_extension: u32,
	/// How fast chunk scores decay with rank.
	pub decay_rate: f32,
	/// Documents considered before segment selection.
	pub top_k_for_document_selection: u32,
	pub chunk_length_adjustment: bool,
}
impl RetrievalPreset {
	pub const RECALL_MIN_VALUE_FLOOR: f32 = 0.1;

	/// Loosened copy used when a stricter attempt returned nothing.
	pub fn loosened_for_recall(&self) -> Self {
		Self {
			minimum_value: (self.minimum_value - 0.2).max(Self::RECALL_MIN_VALUE_FLOOR),
			overall_max_length: (self.overall_max_length as f32 * 1.5) as u32,
			irrelevant_chunk_penalty: self.irrelevant_chunk_penalty * 0.8,
			..*self
		}
	}
}
