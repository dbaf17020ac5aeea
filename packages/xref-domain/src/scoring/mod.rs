mod algorithms;
mod classifier;
mod features;
mod rules;

pub use algorithms::Algorithm;
pub use classifier::{ClassifierError, TrainedClassifier};
pub use features::PairFeatures;
pub use rules::RULES_METHOD;

use crate::entity::EntityProxy;

/// Matches below this score are persisted but do not count toward the
/// user-facing match telemetry.
pub const SCORE_CUTOFF: f64 = 0.5;

/// The outcome of comparing one candidate against a source entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
	pub score: f64,
	pub doubt: Option<f64>,
	pub method: String,
}

/// One of three interchangeable comparison backends, resolved once at
/// process start and immutable afterwards.
#[derive(Debug)]
pub enum ScoringStrategy {
	ExternalAlgorithm(Algorithm),
	TrainedClassifier(TrainedClassifier),
	DefaultRules,
}

impl ScoringStrategy {
	pub fn compare(&self, entity: &EntityProxy, candidate: &EntityProxy) -> Comparison {
		match self {
			Self::ExternalAlgorithm(algorithm) => algorithm.compare(entity, candidate),
			Self::TrainedClassifier(classifier) => classifier.compare(entity, candidate),
			Self::DefaultRules => rules::compare(entity, candidate),
		}
	}

	pub fn method(&self) -> &str {
		match self {
			Self::ExternalAlgorithm(algorithm) => algorithm.name(),
			Self::TrainedClassifier(classifier) => classifier.version(),
			Self::DefaultRules => RULES_METHOD,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{entity::prop, schema::Schema};

	fn person(id: &str, name: &str, country: &str) -> EntityProxy {
		let mut proxy = EntityProxy::new(id, Schema::Person);

		proxy.add(prop::NAME, name);
		proxy.add(prop::COUNTRY, country);

		proxy
	}

	#[test]
	fn identical_people_score_high() {
		let a = person("a", "Maria Santos", "pt");
		let b = person("b", "Maria Santos", "pt");

		let result = ScoringStrategy::DefaultRules.compare(&a, &b);

		assert!(result.score > SCORE_CUTOFF, "score was {}", result.score);
		assert_eq!(result.method, RULES_METHOD);
		assert_eq!(result.doubt, None);
	}

	#[test]
	fn unrelated_people_score_low() {
		let a = person("a", "Maria Santos", "pt");
		let b = person("b", "Dmitri Volkov", "ru");

		let result = ScoringStrategy::DefaultRules.compare(&a, &b);

		assert!(result.score < SCORE_CUTOFF, "score was {}", result.score);
	}

	#[test]
	fn incompatible_schemata_score_zero() {
		let a = person("a", "Sea Breeze", "pa");
		let mut b = EntityProxy::new("b", Schema::Vessel);

		b.add(prop::NAME, "Sea Breeze");

		let result = ScoringStrategy::DefaultRules.compare(&a, &b);

		assert_eq!(result.score, 0.0);
	}
}
