use std::collections::{BTreeSet, HashMap};

use xref_domain::EntityProxy;
use xref_storage::{db::Db, fragments};

use crate::Result;

type Key = (String, String);

/// Coalesces entity lookups within one export batch: each unique
/// (collection, entity) key is fetched at most once, one round trip per
/// collection. Batches do not share state, so memory stays bounded by the
/// page size.
#[derive(Debug, Default)]
pub struct BatchResolver {
	pending: BTreeSet<Key>,
	resolved: HashMap<Key, EntityProxy>,
	lookups: u64,
}

impl BatchResolver {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn queue(&mut self, collection_id: &str, entity_id: &str) {
		let key = (collection_id.to_string(), entity_id.to_string());

		if !self.resolved.contains_key(&key) {
			self.pending.insert(key);
		}
	}

	pub async fn resolve_all(&mut self, db: &Db) -> Result<()> {
		let pending = std::mem::take(&mut self.pending);
		let mut by_collection: HashMap<String, Vec<String>> = HashMap::new();

		for (collection_id, entity_id) in pending {
			by_collection.entry(collection_id).or_default().push(entity_id);
		}

		for (collection_id, entity_ids) in by_collection {
			self.lookups += entity_ids.len() as u64;

			let entities = fragments::fetch_entities(db, &collection_id, &entity_ids).await?;

			for (entity_id, entity) in entities {
				self.resolved.insert((collection_id.clone(), entity_id), entity);
			}
		}

		Ok(())
	}

	pub fn get(&self, collection_id: &str, entity_id: &str) -> Option<&EntityProxy> {
		self.resolved.get(&(collection_id.to_string(), entity_id.to_string()))
	}

	pub fn pending_count(&self) -> usize {
		self.pending.len()
	}

	/// Keys sent to storage so far.
	pub fn lookups(&self) -> u64 {
		self.lookups
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn duplicate_keys_are_queued_once() {
		let mut resolver = BatchResolver::new();

		resolver.queue("c1", "e1");
		resolver.queue("c1", "e1");
		resolver.queue("c1", "e2");
		resolver.queue("c2", "e1");

		assert_eq!(resolver.pending_count(), 3);
	}
}
