//! Relevant segment extraction over per-document chunk similarities.

use dossier_domain::{RetrievalPreset, cmp_score_desc};

/// Chunk length at which length adjustment is neutral.
pub const REFERENCE_CHUNK_CHARS: f32 = 700.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkSignal {
	pub similarity: f32,
	pub chars: usize,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Segment {
	/// Index into the candidate document slice.
	pub document: usize,
	pub start: usize,
	/// Exclusive.
	pub end: usize,
	pub value: f32,
}

/// Picks non-overlapping chunk runs with the highest summed value until the preset budget runs out.
///
/// A chunk's value is its similarity decayed by global rank, optionally scaled by its length, minus
/// the irrelevant-chunk penalty. Segments below `minimum_value` are never returned.
pub fn select_segments(documents: &[Vec<ChunkSignal>], preset: &RetrievalPreset) -> Vec<Segment> {
	let values = chunk_values(documents, preset);
	let max_length = preset.max_length.max(1) as usize;
	let budget = preset.overall_max_length as usize;
	let hard_budget = budget + preset.overall_max_length_extension as usize;
	let mut taken: Vec<Vec<bool>> = values.iter().map(|doc| vec![false; doc.len()]).collect();
	let mut segments = Vec::new();
	let mut used = 0_usize;

	while used < budget {
		let Some(best) = best_segment(&values, &taken, max_length) else {
			break;
		};

		if best.value < preset.minimum_value {
			break;
		}

		let len = best.end - best.start;

		if used + len > hard_budget {
			break;
		}

		taken[best.document][best.start..best.end].iter_mut().for_each(|slot| *slot = true);
		used += len;
		segments.push(best);
	}

	segments
}

fn chunk_values(documents: &[Vec<ChunkSignal>], preset: &RetrievalPreset) -> Vec<Vec<f32>> {
	let mut ranked = documents
		.iter()
		.enumerate()
		.flat_map(|(doc, chunks)| {
			chunks
				.iter()
				.enumerate()
				.filter(|(_, signal)| signal.similarity > 0.0)
				.map(move |(chunk, signal)| (doc, chunk, signal.similarity))
		})
		.collect::<Vec<_>>();

	ranked.sort_by(|a, b| cmp_score_desc(a.2, b.2));

	let mut values: Vec<Vec<f32>> = documents
		.iter()
		.map(|chunks| vec![-preset.irrelevant_chunk_penalty; chunks.len()])
		.collect();

	for (rank, (doc, chunk, similarity)) in ranked.into_iter().enumerate() {
		let decay =
			if preset.decay_rate > 0.0 { (-(rank as f32) / preset.decay_rate).exp() } else { 1.0 };
		let length_factor = if preset.chunk_length_adjustment {
			(documents[doc][chunk].chars as f32 / REFERENCE_CHUNK_CHARS).clamp(0.5, 1.5)
		} else {
			1.0
		};

		values[doc][chunk] = similarity * decay * length_factor - preset.irrelevant_chunk_penalty;
	}

	values
}

fn best_segment(values: &[Vec<f32>], taken: &[Vec<bool>], max_length: usize) -> Option<Segment> {
	let mut best: Option<Segment> = None;

	for (document, chunks) in values.iter().enumerate() {
		for start in 0..chunks.len() {
			let mut sum = 0.0;

			for end in start..chunks.len().min(start + max_length) {
				if taken[document][end] {
					break;
				}

				sum += chunks[end];

				if best.is_none_or(|current| sum > current.value) {
					best = Some(Segment { document, start, end: end + 1, value: sum });
				}
			}
		}
	}

	best
}

#[cfg(test)]
mod tests {
	use super::*;
	use dossier_domain::SearchMode;

	fn signals(similarities: &[f32]) -> Vec<ChunkSignal> {
		similarities
			.iter()
			.map(|similarity| ChunkSignal { similarity: *similarity, chars: 700 })
			.collect()
	}

	#[test]
	fn joins_adjacent_relevant_chunks() {
		let preset = SearchMode::Exhaustive.preset();
		let docs = vec![signals(&[0.0, 0.9, 0.8, 0.0, 0.0])];
		let segments = select_segments(&docs, &preset);

		assert_eq!(segments.len(), 1);
		assert_eq!((segments[0].start, segments[0].end), (1, 3));
	}

	#[test]
	fn weak_chunks_fall_below_the_floor() {
		let preset = SearchMode::Precise.preset();
		let docs = vec![signals(&[0.3, 0.0, 0.2])];

		assert!(select_segments(&docs, &preset).is_empty());
	}

	#[test]
	fn respects_segment_and_overall_budgets() {
		let mut preset = SearchMode::Exhaustive.preset();

		preset.max_length = 2;
		preset.overall_max_length = 3;
		preset.overall_max_length_extension = 0;

		let docs = vec![signals(&[0.9, 0.9, 0.9, 0.9, 0.9, 0.9])];
		let segments = select_segments(&docs, &preset);
		let used: usize = segments.iter().map(|s| s.end - s.start).sum();

		assert!(segments.iter().all(|s| s.end - s.start <= 2));
		assert!(used <= 3);
		assert!(!segments.is_empty());
	}
}
