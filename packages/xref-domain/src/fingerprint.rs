use std::collections::BTreeSet;

use unicode_normalization::UnicodeNormalization;

/// Corporate suffixes and stop-tokens that carry no identity signal.
const STOP_TOKENS: [&str; 14] = [
	"ag", "bv", "co", "corp", "gmbh", "inc", "llc", "llp", "ltd", "nv", "plc", "sa", "sarl", "the",
];

/// Normalize a name into a sortable fingerprint: compatibility-decomposed,
/// marks stripped, lowercased, stop-tokens removed, tokens sorted.
pub fn fingerprint(name: &str) -> Option<String> {
	let tokens = token_set(name);

	if tokens.is_empty() {
		return None;
	}

	Some(tokens.into_iter().collect::<Vec<_>>().join(" "))
}

/// The normalized token set of a name.
pub fn token_set(name: &str) -> BTreeSet<String> {
	let mut normalized = String::with_capacity(name.len());

	for ch in name.nfkd() {
		if ch.is_alphanumeric() && ch.is_ascii() {
			normalized.push(ch.to_ascii_lowercase());
		} else if ch.is_ascii_whitespace() || ch == '-' || ch == '.' || ch == ',' || ch == '\'' {
			normalized.push(' ');
		}
		// Combining marks and other non-ascii fall away entirely.
	}

	normalized
		.split_whitespace()
		.filter(|token| !STOP_TOKENS.contains(token))
		.map(str::to_string)
		.collect()
}

/// Jaccard similarity of two token sets.
pub fn token_jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
	if a.is_empty() || b.is_empty() {
		return 0.0;
	}

	let intersection = a.intersection(b).count();
	let union = a.len() + b.len() - intersection;

	intersection as f64 / union as f64
}

/// Normalized Levenshtein similarity in [0, 1].
pub fn edit_similarity(a: &str, b: &str) -> f64 {
	let longest = a.chars().count().max(b.chars().count());

	if longest == 0 {
		return 0.0;
	}

	1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
	let a: Vec<char> = a.chars().collect();
	let b: Vec<char> = b.chars().collect();

	if a.is_empty() {
		return b.len();
	}
	if b.is_empty() {
		return a.len();
	}

	let mut previous: Vec<usize> = (0..=b.len()).collect();
	let mut current = vec![0; b.len() + 1];

	for (i, ca) in a.iter().enumerate() {
		current[0] = i + 1;

		for (j, cb) in b.iter().enumerate() {
			let substitution = previous[j] + usize::from(ca != cb);

			current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
		}

		std::mem::swap(&mut previous, &mut current);
	}

	previous[b.len()]
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fingerprint_sorts_and_strips() {
		assert_eq!(fingerprint("The Acme Holdings Ltd."), Some("acme holdings".to_string()));
		assert_eq!(fingerprint("Holdings Acme"), Some("acme holdings".to_string()));
		assert_eq!(fingerprint("Ltd."), None);
		assert_eq!(fingerprint(""), None);
	}

	#[test]
	fn fingerprint_folds_diacritics() {
		assert_eq!(fingerprint("Müller Straße"), fingerprint("Muller Strae"));
		assert_eq!(fingerprint("José Peña"), Some("jose pena".to_string()));
	}

	#[test]
	fn jaccard_bounds() {
		let a = token_set("acme holdings");
		let b = token_set("acme industries");

		let sim = token_jaccard(&a, &b);

		assert!(sim > 0.0 && sim < 1.0);
		assert_eq!(token_jaccard(&a, &a), 1.0);
		assert_eq!(token_jaccard(&a, &BTreeSet::new()), 0.0);
	}

	#[test]
	fn edit_similarity_handles_typos() {
		assert!(edit_similarity("petrov", "petroff") > 0.7);
		assert_eq!(edit_similarity("same", "same"), 1.0);
		assert_eq!(edit_similarity("", ""), 0.0);
	}
}
