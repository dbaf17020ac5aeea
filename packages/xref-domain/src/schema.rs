use serde::{Deserialize, Serialize};

/// Two schemata that share no ancestry cannot be merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("No common schema between {left} and {right}.")]
pub struct SchemaConflict {
	pub left: Schema,
	pub right: Schema,
}

/// The closed registry of entity types. Single-inheritance hierarchy
/// rooted at `Thing`; only a subset is eligible for cross-referencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Schema {
	Thing,
	LegalEntity,
	Person,
	Organization,
	Company,
	PublicBody,
	Asset,
	Vessel,
	RealEstate,
	Address,
	Document,
	Event,
	Mention,
}

impl Schema {
	pub const ALL: [Schema; 13] = [
		Schema::Thing,
		Schema::LegalEntity,
		Schema::Person,
		Schema::Organization,
		Schema::Company,
		Schema::PublicBody,
		Schema::Asset,
		Schema::Vessel,
		Schema::RealEstate,
		Schema::Address,
		Schema::Document,
		Schema::Event,
		Schema::Mention,
	];

	pub fn name(self) -> &'static str {
		match self {
			Self::Thing => "Thing",
			Self::LegalEntity => "LegalEntity",
			Self::Person => "Person",
			Self::Organization => "Organization",
			Self::Company => "Company",
			Self::PublicBody => "PublicBody",
			Self::Asset => "Asset",
			Self::Vessel => "Vessel",
			Self::RealEstate => "RealEstate",
			Self::Address => "Address",
			Self::Document => "Document",
			Self::Event => "Event",
			Self::Mention => "Mention",
		}
	}

	pub fn parse(name: &str) -> Option<Schema> {
		Self::ALL.into_iter().find(|schema| schema.name() == name)
	}

	pub fn parent(self) -> Option<Schema> {
		match self {
			Self::Thing => None,
			Self::LegalEntity => Some(Self::Thing),
			Self::Person => Some(Self::LegalEntity),
			Self::Organization => Some(Self::LegalEntity),
			Self::Company => Some(Self::Organization),
			Self::PublicBody => Some(Self::Organization),
			Self::Asset => Some(Self::Thing),
			Self::Vessel => Some(Self::Asset),
			Self::RealEstate => Some(Self::Asset),
			Self::Address => Some(Self::Thing),
			Self::Document => Some(Self::Thing),
			Self::Event => Some(Self::Thing),
			Self::Mention => Some(Self::Thing),
		}
	}

	/// Whether entities of this type are eligible for cross-referencing.
	pub fn matchable(self) -> bool {
		matches!(
			self,
			Self::LegalEntity
				| Self::Person
				| Self::Organization
				| Self::Company
				| Self::PublicBody
				| Self::Vessel
				| Self::RealEstate
		)
	}

	/// Names of every matchable schema, for storage-side filters.
	pub fn matchable_names() -> Vec<&'static str> {
		Self::ALL.into_iter().filter(|schema| schema.matchable()).map(Self::name).collect()
	}

	/// True when `self` is `other` or a descendant of it.
	pub fn is_a(self, other: Schema) -> bool {
		let mut current = Some(self);

		while let Some(schema) = current {
			if schema == other {
				return true;
			}
			current = schema.parent();
		}

		false
	}

	/// The more specific of two compatible schemata.
	pub fn common_schema(left: Schema, right: Schema) -> Result<Schema, SchemaConflict> {
		if left.is_a(right) {
			return Ok(left);
		}
		if right.is_a(left) {
			return Ok(right);
		}

		Err(SchemaConflict { left, right })
	}

	/// Matchable schemata compatible with `self`: itself plus matchable
	/// ancestors and descendants. A Person query must not match vessels.
	pub fn matchable_schemata(self) -> Vec<Schema> {
		Self::ALL
			.into_iter()
			.filter(|other| other.matchable() && (self.is_a(*other) || other.is_a(self)))
			.collect()
	}
}

impl std::fmt::Display for Schema {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn hierarchy_is_reflexive_and_transitive() {
		assert!(Schema::Company.is_a(Schema::Company));
		assert!(Schema::Company.is_a(Schema::Organization));
		assert!(Schema::Company.is_a(Schema::LegalEntity));
		assert!(!Schema::Person.is_a(Schema::Organization));
	}

	#[test]
	fn matchable_names_line_up_with_the_flag() {
		let names = Schema::matchable_names();

		assert!(names.contains(&"Person"));
		assert!(names.contains(&"Company"));
		assert!(!names.contains(&"Document"));
		assert!(!names.contains(&"Mention"));
		assert_eq!(names.len(), Schema::ALL.iter().filter(|schema| schema.matchable()).count());
	}

	#[test]
	fn common_schema_picks_the_more_specific() {
		assert_eq!(Schema::common_schema(Schema::Company, Schema::LegalEntity), Ok(Schema::Company));
		assert_eq!(Schema::common_schema(Schema::LegalEntity, Schema::Person), Ok(Schema::Person));
		assert!(Schema::common_schema(Schema::Person, Schema::Vessel).is_err());
	}

	#[test]
	fn person_does_not_match_vessels() {
		let compatible = Schema::Person.matchable_schemata();

		assert!(compatible.contains(&Schema::Person));
		assert!(compatible.contains(&Schema::LegalEntity));
		assert!(!compatible.contains(&Schema::Vessel));
		assert!(!compatible.contains(&Schema::Company));
	}

	#[test]
	fn mention_is_not_matchable() {
		assert!(!Schema::Mention.matchable());
		assert!(!Schema::Document.matchable());
	}

	#[test]
	fn parse_round_trips() {
		for schema in Schema::ALL {
			assert_eq!(Schema::parse(schema.name()), Some(schema));
		}
		assert_eq!(Schema::parse("Widget"), None);
	}
}
