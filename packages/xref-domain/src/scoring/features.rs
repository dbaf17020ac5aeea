use crate::{
	entity::EntityProxy,
	fingerprint::{edit_similarity, fingerprint, token_jaccard, token_set},
	schema::Schema,
};

// Comparing every name against every name is quadratic; real-world
// aggregates can carry hundreds of OCR'd aliases.
const MAX_NAMES: usize = 10;

/// Structural signals extracted from an entity pair, consumed by both the
/// rule-based comparator and the trained classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairFeatures {
	pub name_similarity: f64,
	pub country_overlap: f64,
	pub date_overlap: f64,
	pub identifier_match: f64,
	pub schema_compatible: bool,
}

impl PairFeatures {
	pub fn extract(entity: &EntityProxy, candidate: &EntityProxy) -> Self {
		Self {
			name_similarity: name_similarity(entity, candidate),
			country_overlap: value_overlap(&entity.countries(), &candidate.countries()),
			date_overlap: year_overlap(&entity.dates(), &candidate.dates()),
			identifier_match: value_overlap(&entity.identifiers(), &candidate.identifiers()),
			schema_compatible: Schema::common_schema(entity.schema, candidate.schema).is_ok(),
		}
	}
}

fn name_similarity(entity: &EntityProxy, candidate: &EntityProxy) -> f64 {
	let mut best: f64 = 0.0;

	for left in entity.names().into_iter().take(MAX_NAMES) {
		let Some(left_print) = fingerprint(left) else {
			continue;
		};
		let left_tokens = token_set(left);

		for right in candidate.names().into_iter().take(MAX_NAMES) {
			let Some(right_print) = fingerprint(right) else {
				continue;
			};

			if left_print == right_print {
				return 1.0;
			}

			let sim = token_jaccard(&left_tokens, &token_set(right))
				.max(edit_similarity(&left_print, &right_print));

			best = best.max(sim);
		}
	}

	best
}

fn value_overlap(left: &[&str], right: &[&str]) -> f64 {
	if left.is_empty() || right.is_empty() {
		return 0.0;
	}

	let shared = left
		.iter()
		.filter(|value| right.iter().any(|other| value.eq_ignore_ascii_case(other)))
		.count();

	shared as f64 / left.len().min(right.len()) as f64
}

fn year_overlap(left: &[&str], right: &[&str]) -> f64 {
	let left_years: Vec<&str> = left.iter().filter_map(|date| date.get(0..4)).collect();
	let right_years: Vec<&str> = right.iter().filter_map(|date| date.get(0..4)).collect();

	value_overlap(&left_years, &right_years)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::entity::prop;

	#[test]
	fn equal_fingerprints_saturate_name_similarity() {
		let mut a = EntityProxy::new("a", Schema::Company);
		let mut b = EntityProxy::new("b", Schema::Company);

		a.add(prop::NAME, "Acme Holdings Ltd.");
		b.add(prop::NAME, "Holdings Acme");

		let features = PairFeatures::extract(&a, &b);

		assert_eq!(features.name_similarity, 1.0);
	}

	#[test]
	fn year_overlap_ignores_day_precision() {
		let mut a = EntityProxy::new("a", Schema::Person);
		let mut b = EntityProxy::new("b", Schema::Person);

		a.add(prop::BIRTH_DATE, "1974-03-01");
		b.add(prop::BIRTH_DATE, "1974");

		let features = PairFeatures::extract(&a, &b);

		assert_eq!(features.date_overlap, 1.0);
	}

	#[test]
	fn missing_values_yield_zero_overlap() {
		let a = EntityProxy::new("a", Schema::Person);
		let b = EntityProxy::new("b", Schema::Person);

		let features = PairFeatures::extract(&a, &b);

		assert_eq!(features.name_similarity, 0.0);
		assert_eq!(features.country_overlap, 0.0);
		assert_eq!(features.identifier_match, 0.0);
	}
}
