use super::{Comparison, PairFeatures};
use crate::entity::EntityProxy;

pub const RULES_METHOD: &str = "rules-v1";

const NAME_WEIGHT: f64 = 0.6;
const COUNTRY_WEIGHT: f64 = 0.1;
const DATE_WEIGHT: f64 = 0.1;
const IDENT_WEIGHT: f64 = 0.2;

/// The always-available structural comparison. Names dominate; country,
/// date and identifier agreement nudge the score up.
pub fn compare(entity: &EntityProxy, candidate: &EntityProxy) -> Comparison {
	let features = PairFeatures::extract(entity, candidate);

	if !features.schema_compatible {
		return Comparison { score: 0.0, doubt: None, method: RULES_METHOD.to_string() };
	}

	// A candidate with no name agreement at all is not a match, whatever
	// its secondary fields happen to share.
	let score = if features.name_similarity > 0.0 {
		NAME_WEIGHT * features.name_similarity
			+ COUNTRY_WEIGHT * features.country_overlap
			+ DATE_WEIGHT * features.date_overlap
			+ IDENT_WEIGHT * features.identifier_match
	} else {
		0.0
	};

	Comparison { score, doubt: None, method: RULES_METHOD.to_string() }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{entity::prop, schema::Schema};

	#[test]
	fn identifier_agreement_lifts_the_score() {
		let mut a = EntityProxy::new("a", Schema::Company);
		let mut b = EntityProxy::new("b", Schema::Company);

		a.add(prop::NAME, "Acme Trading");
		b.add(prop::NAME, "Acme Trading International");

		let without_ident = compare(&a, &b).score;

		a.add(prop::REGISTRATION_NUMBER, "HRB-44821");
		b.add(prop::REGISTRATION_NUMBER, "HRB-44821");

		let with_ident = compare(&a, &b).score;

		assert!(with_ident > without_ident);
	}

	#[test]
	fn secondary_fields_alone_never_score() {
		let mut a = EntityProxy::new("a", Schema::Person);
		let mut b = EntityProxy::new("b", Schema::Person);

		a.add(prop::COUNTRY, "de");
		b.add(prop::COUNTRY, "de");
		a.add(prop::BIRTH_DATE, "1980-01-01");
		b.add(prop::BIRTH_DATE, "1980-06-30");

		assert_eq!(compare(&a, &b).score, 0.0);
	}
}
