pub mod collections;
pub mod db;
pub mod exports;
pub mod fragments;
pub mod index;
pub mod matches;
pub mod models;
pub mod queue;
pub mod schema;
pub mod sources;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Point identifiers are derived from entity identifiers so that the write
/// store and the search index agree on ordering without a shared sequence.
pub fn point_id(entity_id: &str) -> uuid::Uuid {
	uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, entity_id.as_bytes())
}

/// Key for one directed match pair within one collection. Stable across
/// re-runs so repeated xref passes update matches in place, and scoped so
/// the same entity id in two collections never collides.
pub fn match_key(collection_id: &str, entity_id: &str, match_id: &str) -> uuid::Uuid {
	let joined = format!("{collection_id}\u{1f}{entity_id}\u{1f}{match_id}");

	uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, joined.as_bytes())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn point_ids_are_stable() {
		assert_eq!(point_id("ent-1"), point_id("ent-1"));
		assert_ne!(point_id("ent-1"), point_id("ent-2"));
	}

	#[test]
	fn match_keys_are_directed() {
		assert_ne!(match_key("c1", "a", "b"), match_key("c1", "b", "a"));
	}

	#[test]
	fn match_keys_are_scoped_to_their_collection() {
		assert_eq!(match_key("c1", "a", "b"), match_key("c1", "a", "b"));
		assert_ne!(match_key("c1", "a", "b"), match_key("c2", "a", "b"));
	}
}
