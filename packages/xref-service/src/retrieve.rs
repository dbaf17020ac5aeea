use xref_domain::EntityProxy;
use xref_storage::index::Candidate;

use crate::{Result, XrefMetrics, XrefService};

/// Entities that cannot produce matches: non-matchable schemata and
/// entities without a single name. Skipping them avoids an index round
/// trip per document row.
pub fn match_nothing(entity: &EntityProxy) -> bool {
	!entity.schema.matchable() || entity.names().is_empty()
}

impl XrefService {
	/// Candidate retrieval for one entity, bounded by the configured
	/// candidate window.
	pub async fn candidates(
		&self,
		collection_id: &str,
		entity: &EntityProxy,
	) -> Result<Vec<Candidate>> {
		if match_nothing(entity) {
			return Ok(Vec::new());
		}

		let found = self
			.index
			.match_query(entity, collection_id, u64::from(self.cfg.xref.candidate_limit))
			.await?;

		// The backend reports its own query time, so the histogram stays
		// free of network transfer.
		self.metrics.record_index_ms(found.index_ms);
		XrefMetrics::add(&self.metrics.candidates_considered, found.candidates.len() as u64);

		Ok(found.candidates)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use xref_domain::{Schema, entity::prop};

	#[test]
	fn unnamed_entities_match_nothing() {
		let entity = EntityProxy::new("e1", Schema::Person);

		assert!(match_nothing(&entity));
	}

	#[test]
	fn non_matchable_schemata_match_nothing() {
		let mut entity = EntityProxy::new("d1", Schema::Document);

		entity.add(prop::NAME, "annual_report.pdf");

		assert!(match_nothing(&entity));
	}

	#[test]
	fn named_people_are_queried() {
		let mut entity = EntityProxy::new("p1", Schema::Person);

		entity.add(prop::NAME, "Ana Silva");

		assert!(!match_nothing(&entity));
	}
}
