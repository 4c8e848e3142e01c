use std::collections::HashSet;

/// Cosine similarity in [-1, 1]; 0.0 for mismatched or empty vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
	if a.is_empty() || a.len() != b.len() {
		return 0.0;
	}

	let mut dot = 0.0f32;
	let mut norm_a = 0.0f32;
	let mut norm_b = 0.0f32;

	for (x, y) in a.iter().zip(b.iter()) {
		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a == 0.0 || norm_b == 0.0 {
		return 0.0;
	}

	dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Lowercased alphanumeric tokens, length >= 2, deduplicated in order.
pub fn tokenize(text: &str) -> Vec<String> {
	let mut normalized = String::with_capacity(text.len());
	for ch in text.chars() {
		if ch.is_ascii_alphanumeric() {
			normalized.push(ch.to_ascii_lowercase());
		} else {
			normalized.push(' ');
		}
	}

	let mut out = Vec::new();
	let mut seen = HashSet::new();
	for token in normalized.split_whitespace() {
		if token.len() < 2 {
			continue;
		}
		if seen.insert(token.to_string()) {
			out.push(token.to_string());
		}
	}
	out
}

/// Token-overlap ratio: |query ∩ doc| / |query|, in [0, 1].
pub fn keyword_overlap(query: &str, text: &str) -> f32 {
	let query_tokens = tokenize(query);
	if query_tokens.is_empty() {
		return 0.0;
	}

	let text_tokens: HashSet<String> = tokenize(text).into_iter().collect();
	let hits = query_tokens.iter().filter(|token| text_tokens.contains(*token)).count();

	hits as f32 / query_tokens.len() as f32
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cosine_of_identical_vectors_is_one() {
		let v = vec![0.3, 0.4, 0.5];
		assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
	}

	#[test]
	fn cosine_of_orthogonal_vectors_is_zero() {
		assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
	}

	#[test]
	fn cosine_handles_dimension_mismatch() {
		assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
	}

	#[test]
	fn overlap_counts_shared_tokens_only_once() {
		let score = keyword_overlap("foo function", "function foo() {} function bar() {}");
		assert!((score - 1.0).abs() < 1e-6);
	}

	#[test]
	fn overlap_is_zero_without_shared_tokens() {
		assert_eq!(keyword_overlap("alpha beta", "gamma delta"), 0.0);
	}

	#[test]
	fn tokenizer_drops_single_characters() {
		assert_eq!(tokenize("a bb c dd"), vec!["bb".to_string(), "dd".to_string()]);
	}
}
