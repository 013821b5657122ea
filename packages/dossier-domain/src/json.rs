//! Strict-then-lenient decoding of structured model output.

use serde::de::DeserializeOwned;

/// Decodes `raw` as `T`, first directly, then from the first balanced `{...}` block inside it.
pub fn decode_lenient<T>(raw: &str) -> Option<T>
where
	T: DeserializeOwned,
{
	if let Ok(value) = serde_json::from_str(raw.trim()) {
		return Some(value);
	}

	let block = first_object_block(raw)?;

	serde_json::from_str(block).ok()
}

/// The first brace-delimited substring whose braces balance, ignoring braces inside strings.
pub fn first_object_block(raw: &str) -> Option<&str> {
	let start = raw.find('{')?;
	let mut depth = 0_usize;
	let mut in_string = false;
	let mut escaped = false;

	for (offset, ch) in raw[start..].char_indices() {
		if in_string {
			match ch {
				_ if escaped => escaped = false,
				'\\' => escaped = true,
				'"' => in_string = false,
				_ => {},
			}

			continue;
		}

		match ch {
			'"' => in_string = true,
			'{' => depth += 1,
			'}' => {
				depth -= 1;

				if depth == 0 {
					return Some(&raw[start..start + offset + ch.len_utf8()]);
				}
			},
			_ => {},
		}
	}

	None
}
