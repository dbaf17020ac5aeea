use crate::{
	entity::{prop, EntityProxy},
	schema::Schema,
};

/// Folds a stream of mention records, sorted by their resolved identifier,
/// into one aggregate entity per resolved target.
///
/// Mentions carrying no resolved identifier are dropped. Detected schemata
/// are widened to their common ancestor; when two detections have no common
/// matchable ancestor, the aggregate falls back to `LegalEntity` and the
/// conflict is counted.
#[derive(Debug, Default)]
pub struct MentionMerger {
	current: Option<Aggregate>,
	schema_conflicts: u64,
}

#[derive(Debug)]
struct Aggregate {
	resolved: String,
	schema: Schema,
	names: Vec<String>,
	countries: Vec<String>,
}

impl MentionMerger {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn schema_conflicts(&self) -> u64 {
		self.schema_conflicts
	}

	/// Feed the next mention. Returns the completed aggregate when the
	/// resolved identifier changes from the previous run.
	pub fn push(&mut self, mention: &EntityProxy) -> Option<EntityProxy> {
		let Some(resolved) = mention.first(prop::RESOLVED) else {
			return None;
		};
		let resolved = resolved.to_string();
		let mut completed = None;

		if self.current.as_ref().is_some_and(|aggregate| aggregate.resolved != resolved) {
			completed = self.take_current();
		}

		let detected = detect_schema(mention);
		let schema = match self.current.as_ref() {
			Some(aggregate) => self.widen(aggregate.schema, detected),
			None => detected,
		};
		let aggregate = self.current.get_or_insert_with(|| Aggregate {
			resolved,
			schema,
			names: Vec::new(),
			countries: Vec::new(),
		});

		aggregate.schema = schema;

		for name in mention.get(prop::NAME) {
			if !aggregate.names.contains(name) {
				aggregate.names.push(name.clone());
			}
		}
		for country in mention.get(prop::CONTEXT_COUNTRY) {
			let country = country.to_lowercase();

			if !aggregate.countries.contains(&country) {
				aggregate.countries.push(country);
			}
		}

		completed
	}

	/// Flush the trailing aggregate once the stream is exhausted.
	pub fn finish(&mut self) -> Option<EntityProxy> {
		self.take_current()
	}

	fn take_current(&mut self) -> Option<EntityProxy> {
		let aggregate = self.current.take()?;
		let mut proxy = EntityProxy::new(aggregate.resolved, aggregate.schema);

		proxy.add_all(prop::NAME, aggregate.names);
		proxy.add_all(prop::COUNTRY, aggregate.countries);
		proxy.pick_principal_name();

		Some(proxy)
	}

	fn widen(&mut self, left: Schema, right: Schema) -> Schema {
		if left == right {
			return left;
		}

		match Schema::common_schema(left, right) {
			Ok(schema) => schema,
			Err(_) => {
				self.schema_conflicts += 1;

				Schema::LegalEntity
			},
		}
	}
}

fn detect_schema(mention: &EntityProxy) -> Schema {
	mention
		.first(prop::DETECTED_SCHEMA)
		.and_then(Schema::parse)
		.filter(|schema| schema.matchable())
		.unwrap_or(Schema::LegalEntity)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn mention(resolved: &str, name: &str, schema: &str, country: &str) -> EntityProxy {
		let mut proxy = EntityProxy::new(format!("m-{name}"), Schema::Mention);

		proxy.add(prop::RESOLVED, resolved);
		proxy.add(prop::NAME, name);
		proxy.add(prop::DETECTED_SCHEMA, schema);
		proxy.add(prop::CONTEXT_COUNTRY, country);
		proxy
	}

	#[test]
	fn merges_adjacent_runs_into_one_aggregate() {
		let mut merger = MentionMerger::new();
		let mut out = Vec::new();
		let stream = [
			mention("r2", "Acme Corp", "Company", "DE"),
			mention("r2", "Acme Corporation", "Company", "de"),
			mention("r1", "Jane Doe", "Person", "us"),
		];

		for item in &stream {
			out.extend(merger.push(item));
		}
		out.extend(merger.finish());

		assert_eq!(out.len(), 2);
		assert_eq!(out[0].id, "r2");
		assert_eq!(out[0].schema, Schema::Company);
		assert_eq!(out[0].get(prop::NAME), ["Acme Corporation"]);
		assert_eq!(out[0].get(prop::ALIAS), ["Acme Corp"]);
		assert_eq!(out[0].get(prop::COUNTRY), ["de"]);
		assert_eq!(out[1].id, "r1");
		assert_eq!(out[1].schema, Schema::Person);
	}

	#[test]
	fn conflicting_detections_fall_back_to_legal_entity() {
		let mut merger = MentionMerger::new();

		merger.push(&mention("r1", "Meridian", "Person", "gb"));
		merger.push(&mention("r1", "Meridian", "Company", "gb"));

		let aggregate = merger.finish().expect("Aggregate must flush.");

		assert_eq!(aggregate.schema, Schema::LegalEntity);
		assert_eq!(merger.schema_conflicts(), 1);
	}

	#[test]
	fn unresolved_mentions_are_dropped() {
		let mut merger = MentionMerger::new();
		let mut loose = EntityProxy::new("m-x", Schema::Mention);

		loose.add(prop::NAME, "Unknown Actor");

		assert!(merger.push(&loose).is_none());
		assert!(merger.finish().is_none());
	}

	#[test]
	fn unknown_detected_schema_defaults_to_legal_entity() {
		let mut merger = MentionMerger::new();

		merger.push(&mention("r1", "Meridian", "Airplane", "fr"));

		let aggregate = merger.finish().expect("Aggregate must flush.");

		assert_eq!(aggregate.schema, Schema::LegalEntity);
	}
}
