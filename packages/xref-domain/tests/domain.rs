use xref_domain::{
	EntityProxy, MentionMerger, SCORE_CUTOFF, Schema, ScoringStrategy,
	entity::prop,
	scoring::{Algorithm, TrainedClassifier},
};

fn person(id: &str, name: &str, country: &str) -> EntityProxy {
	let mut proxy = EntityProxy::new(id, Schema::Person);

	proxy.add(prop::NAME, name);
	proxy.add(prop::COUNTRY, country);
	proxy
}

fn mention(resolved: &str, name: &str, schema: &str) -> EntityProxy {
	let mut proxy = EntityProxy::new(format!("m-{resolved}-{name}"), Schema::Mention);

	proxy.add(prop::RESOLVED, resolved);
	proxy.add(prop::NAME, name);
	proxy.add(prop::DETECTED_SCHEMA, schema);
	proxy
}

#[test]
fn identical_people_clear_the_cutoff() {
	let a = person("a", "Viktor Baranov", "ru");
	let b = person("b", "Viktor Baranov", "ru");
	let result = ScoringStrategy::DefaultRules.compare(&a, &b);

	assert!(result.score >= SCORE_CUTOFF, "score was {}", result.score);
}

#[test]
fn unrelated_people_score_zero() {
	let a = person("a", "Viktor Baranov", "ru");
	let b = person("b", "Mariam Kassar", "lb");
	let result = ScoringStrategy::DefaultRules.compare(&a, &b);

	assert_eq!(result.score, 0.0);
}

#[test]
fn cross_hierarchy_pairs_never_score() {
	let a = person("a", "Meridian", "pa");
	let mut b = EntityProxy::new("b", Schema::Vessel);

	b.add(prop::NAME, "Meridian");

	let result = ScoringStrategy::DefaultRules.compare(&a, &b);

	assert_eq!(result.score, 0.0);
}

#[test]
fn external_algorithm_gates_on_identifiers() {
	let mut a = EntityProxy::new("a", Schema::Company);
	let mut b = EntityProxy::new("b", Schema::Company);

	a.add(prop::NAME, "Helix Trading Ltd");
	b.add(prop::NAME, "Helix Trading Limited");

	let strategy = ScoringStrategy::ExternalAlgorithm(Algorithm::IdentMatch);

	assert_eq!(strategy.compare(&a, &b).score, 0.0);

	a.add(prop::REGISTRATION_NUMBER, "HK-4471");
	b.add(prop::REGISTRATION_NUMBER, "hk-4471");

	assert!(strategy.compare(&a, &b).score > 0.0);
}

#[test]
fn classifier_reports_its_artifact_version_as_method() {
	let artifact = r#"{
		"version": "glm-2024.1",
		"bias": -3.0,
		"weights": {
			"name_similarity": 5.0,
			"country_overlap": 1.0,
			"date_overlap": 1.0,
			"identifier_match": 2.0,
			"schema_compatible": 0.5
		}
	}"#;
	let classifier =
		TrainedClassifier::from_json(artifact.as_bytes(), "inline").expect("Failed to parse model.");
	let strategy = ScoringStrategy::TrainedClassifier(classifier);

	assert_eq!(strategy.method(), "glm-2024.1");

	let a = person("a", "Elena Marquez", "es");
	let b = person("b", "Elena Marquez", "es");
	let result = strategy.compare(&a, &b);

	assert_eq!(result.method, "glm-2024.1");
	assert!(result.doubt.is_some());
}

#[test]
fn mention_stream_folds_by_resolved_run() {
	let stream = [
		mention("r3", "Orion Shipping", "Company"),
		mention("r2", "Dana 부산", "Person"),
		mention("r2", "Dana Busan", "Person"),
		mention("r2", "Dana B.", "Person"),
		mention("r1", "Karl Weiss", "Person"),
	];
	let mut merger = MentionMerger::new();
	let mut aggregates = Vec::new();

	for item in &stream {
		aggregates.extend(merger.push(item));
	}
	aggregates.extend(merger.finish());

	assert_eq!(aggregates.len(), 3);
	assert_eq!(aggregates[0].id, "r3");
	assert_eq!(aggregates[1].id, "r2");
	assert_eq!(aggregates[1].names().len(), 3);
	assert_eq!(aggregates[2].id, "r1");
	assert_eq!(merger.schema_conflicts(), 0);
}
