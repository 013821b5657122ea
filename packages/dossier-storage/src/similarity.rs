use std::collections::HashMap;

use dossier_domain::keywords;

/// Sparse term-frequency vector.
#[derive(Clone, Debug, Default)]
pub struct TermVector {
	weights: HashMap<String, f32>,
	norm: f32,
}
impl TermVector {
	pub fn from_text(text: &str) -> Self {
		let mut weights = HashMap::<String, f32>::new();

		for token in keywords::normalize_text(text).split(' ') {
			if token.is_empty() || keywords::is_stop_word(token) {
				continue;
			}

			*weights.entry(token.to_string()).or_default() += 1.0;
		}

		let norm = weights.values().map(|w| w * w).sum::<f32>().sqrt();

		Self { weights, norm }
	}

	pub fn is_empty(&self) -> bool {
		self.weights.is_empty()
	}

	/// Cosine similarity in `[0, 1]`.
	pub fn cosine(&self, other: &Self) -> f32 {
		if self.norm == 0.0 || other.norm == 0.0 {
			return 0.0;
		}

		let (small, large) =
			if self.weights.len() <= other.weights.len() { (self, other) } else { (other, self) };
		let dot = small
			.weights
			.iter()
			.filter_map(|(term, weight)| large.weights.get(term).map(|other| weight * other))
			.sum::<f32>();

		(dot / (self.norm * other.norm)).clamp(0.0, 1.0)
	}
}
