use serde::Deserialize;

use super::{Comparison, PairFeatures};
use crate::entity::EntityProxy;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
	#[error("Failed to read model artifact at {path}.")]
	Read { path: String, source: std::io::Error },
	#[error("Failed to parse model artifact at {path}.")]
	Parse { path: String, source: serde_json::Error },
}

#[derive(Debug, Deserialize)]
struct Weights {
	name_similarity: f64,
	country_overlap: f64,
	date_overlap: f64,
	identifier_match: f64,
	schema_compatible: f64,
}

#[derive(Debug, Deserialize)]
struct Artifact {
	version: String,
	bias: f64,
	weights: Weights,
}

/// A logistic model over the structural pair features, loaded once from a
/// JSON artifact. Produces a doubt value alongside the score.
#[derive(Debug)]
pub struct TrainedClassifier {
	artifact: Artifact,
}

impl TrainedClassifier {
	pub fn load(path: &std::path::Path) -> Result<Self, ClassifierError> {
		let display = path.display().to_string();
		let raw = std::fs::read(path)
			.map_err(|err| ClassifierError::Read { path: display.clone(), source: err })?;

		Self::from_json(&raw, &display)
	}

	pub fn from_json(raw: &[u8], path: &str) -> Result<Self, ClassifierError> {
		let artifact: Artifact = serde_json::from_slice(raw)
			.map_err(|err| ClassifierError::Parse { path: path.to_string(), source: err })?;

		Ok(Self { artifact })
	}

	pub fn version(&self) -> &str {
		&self.artifact.version
	}

	pub fn compare(&self, entity: &EntityProxy, candidate: &EntityProxy) -> Comparison {
		let features = PairFeatures::extract(entity, candidate);

		if !features.schema_compatible {
			return Comparison {
				score: 0.0,
				doubt: None,
				method: self.artifact.version.clone(),
			};
		}

		let weights = &self.artifact.weights;
		let logit = self.artifact.bias
			+ weights.name_similarity * features.name_similarity
			+ weights.country_overlap * features.country_overlap
			+ weights.date_overlap * features.date_overlap
			+ weights.identifier_match * features.identifier_match
			+ weights.schema_compatible;
		let score = sigmoid(logit);
		// Doubt peaks at the decision boundary and vanishes at either end
		// of the scale.
		let doubt = 1.0 - (2.0 * score - 1.0).abs();

		Comparison { score, doubt: Some(doubt), method: self.artifact.version.clone() }
	}
}

fn sigmoid(x: f64) -> f64 {
	1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{entity::prop, schema::Schema};

	const ARTIFACT: &str = r#"{
		"version": "glm-2024.1",
		"bias": -4.0,
		"weights": {
			"name_similarity": 6.0,
			"country_overlap": 1.0,
			"date_overlap": 1.0,
			"identifier_match": 2.0,
			"schema_compatible": 0.5
		}
	}"#;

	fn classifier() -> TrainedClassifier {
		TrainedClassifier::from_json(ARTIFACT.as_bytes(), "inline").expect("Failed to parse model.")
	}

	#[test]
	fn strong_pairs_score_above_the_cutoff() {
		let mut a = EntityProxy::new("a", Schema::Person);
		let mut b = EntityProxy::new("b", Schema::Person);

		a.add(prop::NAME, "Elena Marquez");
		b.add(prop::NAME, "Elena Marquez");
		a.add(prop::COUNTRY, "es");
		b.add(prop::COUNTRY, "es");

		let result = classifier().compare(&a, &b);

		assert!(result.score > 0.5, "score was {}", result.score);
		assert_eq!(result.method, "glm-2024.1");

		let doubt = result.doubt.expect("Classifier must emit doubt.");

		assert!((0.0..=1.0).contains(&doubt));
	}

	#[test]
	fn rejects_malformed_artifacts() {
		assert!(TrainedClassifier::from_json(b"{\"version\": 1}", "inline").is_err());
	}
}
