use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::Schema;

/// Property names shared between the fragment store and the index payloads.
pub mod prop {
	pub const NAME: &str = "name";
	pub const ALIAS: &str = "alias";
	pub const COUNTRY: &str = "country";
	pub const JURISDICTION: &str = "jurisdiction";
	pub const BIRTH_DATE: &str = "birthDate";
	pub const INCORPORATION_DATE: &str = "incorporationDate";
	pub const REGISTRATION_NUMBER: &str = "registrationNumber";
	pub const IMO_NUMBER: &str = "imoNumber";
	pub const TAX_NUMBER: &str = "taxNumber";
	pub const RESOLVED: &str = "resolved";
	pub const DETECTED_SCHEMA: &str = "detectedSchema";
	pub const CONTEXT_COUNTRY: &str = "contextCountry";
}

const NAME_PROPS: [&str; 2] = [prop::NAME, prop::ALIAS];
const COUNTRY_PROPS: [&str; 2] = [prop::COUNTRY, prop::JURISDICTION];
const DATE_PROPS: [&str; 2] = [prop::BIRTH_DATE, prop::INCORPORATION_DATE];
const IDENT_PROPS: [&str; 3] = [prop::REGISTRATION_NUMBER, prop::IMO_NUMBER, prop::TAX_NUMBER];

/// A typed, multi-valued entity record. Identifiers are unique within a
/// dataset; proxies are treated as immutable values during a match pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProxy {
	pub id: String,
	pub schema: Schema,
	#[serde(default)]
	pub properties: BTreeMap<String, Vec<String>>,
}

impl EntityProxy {
	pub fn new(id: impl Into<String>, schema: Schema) -> Self {
		Self { id: id.into(), schema, properties: BTreeMap::new() }
	}

	/// Append a value, ignoring empties and duplicates.
	pub fn add(&mut self, property: &str, value: impl Into<String>) {
		let value = value.into();
		let trimmed = value.trim();

		if trimmed.is_empty() {
			return;
		}

		let values = self.properties.entry(property.to_string()).or_default();

		if !values.iter().any(|existing| existing == trimmed) {
			values.push(trimmed.to_string());
		}
	}

	pub fn add_all<I, S>(&mut self, property: &str, values: I)
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		for value in values {
			self.add(property, value);
		}
	}

	/// Replace all values of a property.
	pub fn set<I, S>(&mut self, property: &str, values: I)
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.properties.remove(property);
		self.add_all(property, values);
	}

	pub fn get(&self, property: &str) -> &[String] {
		self.properties.get(property).map(Vec::as_slice).unwrap_or(&[])
	}

	pub fn first(&self, property: &str) -> Option<&str> {
		self.get(property).first().map(String::as_str)
	}

	pub fn names(&self) -> Vec<&str> {
		self.collect(&NAME_PROPS)
	}

	pub fn countries(&self) -> Vec<&str> {
		self.collect(&COUNTRY_PROPS)
	}

	pub fn dates(&self) -> Vec<&str> {
		self.collect(&DATE_PROPS)
	}

	pub fn identifiers(&self) -> Vec<&str> {
		self.collect(&IDENT_PROPS)
	}

	pub fn caption(&self) -> &str {
		self.first(prop::NAME)
			.or_else(|| self.first(prop::ALIAS))
			.unwrap_or(self.id.as_str())
	}

	/// Promote the longest known name to the principal `name` slot and move
	/// the rest to `alias`. Used when reifying mention aggregates.
	pub fn pick_principal_name(&mut self) {
		let mut names: Vec<String> = self.names().into_iter().map(str::to_string).collect();

		if names.is_empty() {
			return;
		}

		names.sort_by_key(|name| std::cmp::Reverse(name.chars().count()));

		let principal = names.remove(0);

		self.set(prop::NAME, [principal]);
		self.set(prop::ALIAS, names);
	}

	fn collect(&self, properties: &[&str]) -> Vec<&str> {
		let mut out = Vec::new();

		for property in properties {
			for value in self.get(property) {
				if !out.contains(&value.as_str()) {
					out.push(value.as_str());
				}
			}
		}

		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn add_dedupes_and_skips_blank_values() {
		let mut proxy = EntityProxy::new("p1", Schema::Person);

		proxy.add(prop::NAME, "Jane Doe");
		proxy.add(prop::NAME, "Jane Doe");
		proxy.add(prop::NAME, "  ");

		assert_eq!(proxy.get(prop::NAME), ["Jane Doe"]);
	}

	#[test]
	fn caption_falls_back_to_id() {
		let proxy = EntityProxy::new("p2", Schema::Person);

		assert_eq!(proxy.caption(), "p2");
	}

	#[test]
	fn principal_name_is_the_longest() {
		let mut proxy = EntityProxy::new("c1", Schema::Company);

		proxy.add(prop::NAME, "Acme");
		proxy.add(prop::ALIAS, "Acme Holdings International");

		proxy.pick_principal_name();

		assert_eq!(proxy.get(prop::NAME), ["Acme Holdings International"]);
		assert_eq!(proxy.get(prop::ALIAS), ["Acme"]);
	}

	#[test]
	fn fragment_round_trip() {
		let mut proxy = EntityProxy::new("c2", Schema::Company);

		proxy.add(prop::NAME, "Acme GmbH");
		proxy.add(prop::JURISDICTION, "de");

		let raw = serde_json::to_string(&proxy).expect("Failed to serialize proxy.");
		let back: EntityProxy = serde_json::from_str(&raw).expect("Failed to deserialize proxy.");

		assert_eq!(back, proxy);
	}
}
