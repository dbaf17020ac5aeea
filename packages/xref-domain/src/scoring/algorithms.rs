use super::{Comparison, PairFeatures};
use crate::entity::EntityProxy;

/// Named, deterministic scoring algorithms selectable by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
	/// Pure name agreement; ignores secondary fields entirely.
	NameMatch,
	/// Identifier-gated: without a shared registration/IMO/tax number the
	/// pair scores zero, with one it scores on names.
	IdentMatch,
}

impl Algorithm {
	pub fn parse(name: &str) -> Option<Algorithm> {
		match name {
			"name-match" => Some(Self::NameMatch),
			"ident-match" => Some(Self::IdentMatch),
			_ => None,
		}
	}

	pub fn name(self) -> &'static str {
		match self {
			Self::NameMatch => "name-match",
			Self::IdentMatch => "ident-match",
		}
	}

	pub fn compare(self, entity: &EntityProxy, candidate: &EntityProxy) -> Comparison {
		let features = PairFeatures::extract(entity, candidate);
		let score = if !features.schema_compatible {
			0.0
		} else {
			match self {
				Self::NameMatch => features.name_similarity,
				Self::IdentMatch =>
					if features.identifier_match > 0.0 {
						features.name_similarity.max(features.identifier_match * 0.5)
					} else {
						0.0
					},
			}
		};

		Comparison { score, doubt: None, method: self.name().to_string() }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{entity::prop, schema::Schema};

	#[test]
	fn parse_known_names() {
		assert_eq!(Algorithm::parse("name-match"), Some(Algorithm::NameMatch));
		assert_eq!(Algorithm::parse("ident-match"), Some(Algorithm::IdentMatch));
		assert_eq!(Algorithm::parse("unknown"), None);
	}

	#[test]
	fn ident_match_requires_a_shared_identifier() {
		let mut a = EntityProxy::new("a", Schema::Company);
		let mut b = EntityProxy::new("b", Schema::Company);

		a.add(prop::NAME, "Northwind Shipping");
		b.add(prop::NAME, "Northwind Shipping");

		assert_eq!(Algorithm::IdentMatch.compare(&a, &b).score, 0.0);

		a.add(prop::REGISTRATION_NUMBER, "RC-1001");
		b.add(prop::REGISTRATION_NUMBER, "RC-1001");

		assert!(Algorithm::IdentMatch.compare(&a, &b).score > 0.9);
	}
}
