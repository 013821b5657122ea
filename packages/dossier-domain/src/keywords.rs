//! Keyword extraction and overlap scoring for the lexical retrieval strategy.

use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;

/// Bonus for each adjacent keyword pair found verbatim in a passage.
pub const BIGRAM_BONUS: f32 = 0.1;
/// Keywords must be longer than this many characters.
pub const MIN_KEYWORD_CHARS: usize = 2;

const ENGLISH_STOP_WORDS: &[&str] = &[
	"a", "about", "above", "after", "again", "against", "ain", "all", "am", "an", "and", "any",
	"are", "aren", "as", "at", "be", "because", "been", "before", "being", "below", "between",
	"both", "but", "by", "can", "couldn", "d", "did", "didn", "do", "does", "doesn", "doing", "don",
	"down", "during", "each", "few", "for", "from", "further", "had", "hadn", "has", "hasn",
	"have", "haven", "having", "he", "her", "here", "hers", "herself", "him", "himself", "his",
	"how", "i", "if", "in", "into", "is", "isn", "it", "its", "itself", "just", "ll", "m", "ma",
	"me", "mightn", "more", "most", "mustn", "my", "myself", "needn", "no", "nor", "not", "now",
	"o", "of", "off", "on", "once", "only", "or", "other", "our", "ours", "ourselves", "out",
	"over", "own", "re", "s", "same", "shan", "she", "should", "shouldn", "so", "some", "such",
	"t", "than", "that", "the", "their", "theirs", "them", "themselves", "then", "there", "these",
	"they", "this", "those", "through", "to", "too", "under", "until", "up", "ve", "very", "was",
	"wasn", "we", "were", "weren", "what", "when", "where", "which", "while", "who", "whom",
	"why", "will", "with", "won", "wouldn", "y", "you", "your", "yours", "yourself",
	"yourselves",
];
const FRENCH_STOP_WORDS: &[&str] = &[
	"ai", "aie", "aient", "aies", "ait", "as", "au", "aura", "aurai", "auraient", "aurais",
	"aurait", "auras", "aurez", "auriez", "aurions", "aurons", "auront", "aux", "avaient",
	"avais", "avait", "avec", "avez", "aviez", "avions", "avons", "ayant", "ayez", "ayons", "c",
	"ce", "ceci", "cela", "ces", "cet", "cette", "d", "dans", "de", "des", "du", "elle", "en",
	"es", "est", "et", "étaient", "étais", "était", "étant", "été", "êtes", "étiez", "étions",
	"eu", "eue", "eues", "eûmes", "eurent", "eus", "eusse", "eussent", "eusses", "eussiez",
	"eussions", "eut", "eût", "eûtes", "eux", "fûmes", "furent", "fus", "fusse", "fussent",
	"fusses", "fussiez", "fussions", "fut", "fût", "fûtes", "il", "ils", "j", "je", "l", "la",
	"le", "les", "leur", "leurs", "lui", "m", "ma", "mais", "me", "même", "mes", "moi", "mon",
	"n", "ne", "nos", "notre", "nous", "on", "ont", "ou", "par", "pas", "pour", "qu", "que",
	"quel", "quelle", "quelles", "quels", "qui", "s", "sa", "sans", "se", "sera", "serai",
	"seraient", "serais", "serait", "seras", "serez", "seriez", "serions", "serons", "seront",
	"ses", "soi", "soient", "sois", "soit", "sommes", "son", "sont", "soyez", "soyons", "suis",
	"sur", "t", "ta", "te", "tes", "toi", "ton", "tu", "un", "une", "vos", "votre", "vous", "y",
];

pub fn is_stop_word(word: &str) -> bool {
	ENGLISH_STOP_WORDS.contains(&word) || FRENCH_STOP_WORDS.contains(&word)
}

/// Case-folds `text` and replaces punctuation with single spaces.
pub fn normalize_text(text: &str) -> String {
	let mut normalized = String::with_capacity(text.len());

	for ch in text.nfkc().flat_map(char::to_lowercase) {
		if ch.is_alphanumeric() || ch == '_' {
			normalized.push(ch);
		} else {
			normalized.push(' ');
		}
	}

	normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Distinct significant words of `query`, in first-occurrence order.
pub fn extract_keywords(query: &str) -> Vec<String> {
	let normalized = normalize_text(query);
	let mut seen = HashSet::new();
	let mut out = Vec::new();

	for word in normalized.split(' ') {
		if word.chars().count() <= MIN_KEYWORD_CHARS || is_stop_word(word) {
			continue;
		}
		if seen.insert(word) {
			out.push(word.to_string());
		}
	}

	out
}

/// Fraction of `keywords` present in `text`, plus a bonus for each adjacent keyword pair that
/// occurs verbatim. Capped at 1.0.
pub fn keyword_score(text: &str, keywords: &[String]) -> f32 {
	if keywords.is_empty() {
		return 0.0;
	}

	let normalized = normalize_text(text);
	let words: HashSet<&str> = normalized.split(' ').filter(|word| !is_stop_word(word)).collect();
	let matches = keywords.iter().filter(|keyword| words.contains(keyword.as_str())).count();
	let mut score = matches as f32 / keywords.len() as f32;
	let padded = format!(" {normalized} ");

	for pair in keywords.windows(2) {
		let bigram = format!(" {} {} ", pair[0], pair[1]);

		if padded.contains(&bigram) {
			score += BIGRAM_BONUS;
		}
	}

	score.min(1.0)
}
