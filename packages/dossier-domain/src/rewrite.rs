//! Deterministic query rewrites used when no model-generated reformulation is available.

use std::{collections::HashSet, sync::LazyLock};

use regex::Regex;

/// Words kept by [`simplify_query`].
pub const SIMPLIFIED_MAX_WORDS: usize = 4;

static VAGUE_INTENSIFIERS: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"(?i)\b(exactement|précisément|spécifiquement|exactly|precisely|specifically)\b")
		.expect("intensifier pattern is valid")
});
static SPECIFIC_TERMS: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"\b\d+\b|\b[A-Z0-9-]+\b").expect("specific-term pattern is valid"));
static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^\s*(?:[-*•]+|\d+[.)])\s*").expect("list-marker pattern is valid")
});

/// Drops vague intensifiers and keeps the first few words.
pub fn simplify_query(query: &str) -> String {
	let stripped = VAGUE_INTENSIFIERS.replace_all(query, " ");

	stripped.split_whitespace().take(SIMPLIFIED_MAX_WORDS).collect::<Vec<_>>().join(" ")
}

/// Drops standalone numbers and upper-case or code-like tokens.
pub fn strip_specific_terms(query: &str) -> String {
	let stripped = SPECIFIC_TERMS.replace_all(query, " ");

	stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The two syntactic fallbacks for `query`, without blanks.
pub fn fallback_variants(query: &str) -> Vec<String> {
	[simplify_query(query), strip_specific_terms(query)]
		.into_iter()
		.filter(|variant| !variant.is_empty())
		.collect()
}

/// Removes list bullets, numbering, and surrounding quotes from a generated query line.
pub fn clean_generated_query(line: &str) -> String {
	let unmarked = LIST_MARKER.replace(line, "");

	unmarked.trim().trim_matches(|ch| matches!(ch, '"' | '\'' | '«' | '»' | '“' | '”')).trim().to_string()
}

/// Cleans, de-duplicates (case-insensitively), and caps generated queries. The original query is
/// never returned as its own reformulation.
pub fn normalize_reformulations<I>(candidates: I, original: &str, max: usize) -> Vec<String>
where
	I: IntoIterator,
	I::Item: AsRef<str>,
{
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	seen.insert(original.trim().to_lowercase());

	for candidate in candidates {
		if out.len() >= max {
			break;
		}

		let cleaned = clean_generated_query(candidate.as_ref());

		if cleaned.is_empty() {
			continue;
		}
		if seen.insert(cleaned.to_lowercase()) {
			out.push(cleaned);
		}
	}

	out
}
