use xref_config::XrefSettings;
use xref_domain::{
	Comparison, EntityProxy, ScoringStrategy,
	scoring::{Algorithm, TrainedClassifier},
};

/// The comparison backend for this process. Resolved once at startup; a
/// missing or unreadable model artifact demotes the process to the rule
/// based scorer for its entire lifetime rather than retrying per entity.
pub struct ScoringService {
	strategy: ScoringStrategy,
}

impl ScoringService {
	pub fn resolve(cfg: &XrefSettings) -> Self {
		if let Some(name) = cfg.algorithm.as_deref() {
			match Algorithm::parse(name) {
				Some(algorithm) => {
					tracing::info!(algorithm = name, "Using external scoring algorithm.");

					return Self { strategy: ScoringStrategy::ExternalAlgorithm(algorithm) };
				},
				None => {
					tracing::warn!(
						algorithm = name,
						"Unknown scoring algorithm, falling back to rules."
					);
				},
			}
		}
		if let Some(path) = cfg.model_path.as_deref() {
			match TrainedClassifier::load(path) {
				Ok(classifier) => {
					tracing::info!(
						model = classifier.version(),
						path = %path.display(),
						"Using trained scoring model."
					);

					return Self { strategy: ScoringStrategy::TrainedClassifier(classifier) };
				},
				Err(err) => {
					tracing::warn!(
						error = %err,
						path = %path.display(),
						"Scoring model unavailable, falling back to rules for this run."
					);
				},
			}
		}

		Self { strategy: ScoringStrategy::DefaultRules }
	}

	pub fn compare(&self, entity: &EntityProxy, candidate: &EntityProxy) -> Comparison {
		self.strategy.compare(entity, candidate)
	}

	pub fn method(&self) -> &str {
		self.strategy.method()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use xref_domain::scoring::RULES_METHOD;

	fn settings(algorithm: Option<&str>, model_path: Option<&str>) -> XrefSettings {
		XrefSettings {
			algorithm: algorithm.map(str::to_string),
			model_path: model_path.map(std::path::PathBuf::from),
			candidate_limit: 50,
			scroll_size: 1_000,
		}
	}

	#[test]
	fn defaults_to_rules() {
		let service = ScoringService::resolve(&settings(None, None));

		assert_eq!(service.method(), RULES_METHOD);
	}

	#[test]
	fn algorithm_takes_precedence() {
		let service = ScoringService::resolve(&settings(Some("name-match"), None));

		assert_eq!(service.method(), "name-match");
	}

	#[test]
	fn missing_model_artifact_falls_back_to_rules() {
		let service =
			ScoringService::resolve(&settings(None, Some("/nonexistent/model.json")));

		assert_eq!(service.method(), RULES_METHOD);
	}
}
