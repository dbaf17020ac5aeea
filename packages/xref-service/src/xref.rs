use std::{collections::HashSet, time::Instant};

use serde_json::json;

use xref_domain::{EntityProxy, MentionMerger, SCORE_CUTOFF, Schema, entity::prop};
use xref_storage::{
	collections,
	fragments::{self, FragmentFilter, FragmentWriter, origin},
	index::Candidate,
	matches::{self, MatchInsert},
};

use crate::{Error, Result, XrefMetrics, XrefService, reindex::ReindexOpts, retrieve};

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct XrefReport {
	pub collection_id: String,
	pub entities: u64,
	pub mentions: u64,
	pub matches: u64,
	pub above_cutoff: u64,
	pub schema_conflicts: u64,
	pub malformed_fragments: u64,
}

struct ScoredEntity {
	inserts: Vec<MatchInsert>,
	above_cutoff: u64,
	matched: Vec<Candidate>,
}

fn above_cutoff(score: f64) -> bool {
	score > SCORE_CUTOFF
}

// All inserts of one scoring pass share their source entity.
fn entityset_subject(inserts: &[MatchInsert]) -> Option<&str> {
	inserts.first().map(|insert| insert.entity_id.as_str())
}

fn narrowed_schema(start: Schema, matched: &[Candidate]) -> Schema {
	matched.iter().fold(start, |schema, candidate| {
		Schema::common_schema(schema, candidate.entity.schema).unwrap_or(Schema::LegalEntity)
	})
}

fn backed_countries(aggregate: &EntityProxy, matched: &[Candidate]) -> Vec<String> {
	let candidate_countries: HashSet<&str> =
		matched.iter().flat_map(|candidate| candidate.entity.countries()).collect();

	aggregate
		.countries()
		.into_iter()
		.filter(|country| candidate_countries.contains(country))
		.map(str::to_string)
		.collect()
}

impl XrefService {
	/// Re-match a single entity in place. Prior matches for the entity are
	/// replaced; nothing happens for non-matchable schemata.
	pub async fn xref_entity(&self, collection_id: &str, entity: &EntityProxy) -> Result<u64> {
		if !entity.schema.matchable() {
			return Ok(0);
		}

		// Unnamed entities yield no candidates, but their matches from a
		// previous run still have to go.
		matches::delete_entity_matches(&self.db, collection_id, &entity.id).await?;

		let started = Instant::now();
		let scored = self.score_one(collection_id, entity).await?;
		let written = self.persist(scored.inserts, true).await?;

		self.metrics.record_match_count(written);
		self.metrics.record_roundtrip_ms(started.elapsed().as_millis() as u64);

		XrefMetrics::add(&self.metrics.matches_above_cutoff, scored.above_cutoff);

		Ok(written)
	}

	/// Cross-reference every entity and mention of one collection against
	/// the rest of the index. Existing matches and reified mention
	/// aggregates from earlier passes are replaced.
	pub async fn xref_collection(&self, collection_id: &str) -> Result<XrefReport> {
		if collections::get_collection(&self.db, collection_id).await?.is_none() {
			return Err(Error::NotFound {
				message: format!("collection {collection_id} does not exist"),
			});
		}

		let started = Instant::now();
		let replaced = matches::delete_matches(&self.db, collection_id).await?;

		if replaced > 0 {
			tracing::info!(collection_id, count = replaced, "Dropped matches from previous pass.");
		}

		let stale_points =
			fragments::origin_point_ids(&self.db, collection_id, origin::XREF).await?;

		self.index.delete_points(stale_points).await?;
		fragments::delete_origin(&self.db, collection_id, origin::XREF).await?;

		let mut report =
			XrefReport { collection_id: collection_id.to_string(), ..Default::default() };

		self.xref_entities(collection_id, &mut report).await?;
		self.xref_mentions(collection_id, &mut report).await?;

		// Reified mention aggregates only become searchable once indexed.
		self.reindex_collection(collection_id, &ReindexOpts::default()).await?;

		report.malformed_fragments = self.metrics.snapshot().malformed_fragments;

		tracing::info!(
			collection_id,
			entities = report.entities,
			mentions = report.mentions,
			matches = report.matches,
			above_cutoff = report.above_cutoff,
			elapsed_ms = started.elapsed().as_millis() as u64,
			"Cross-reference finished."
		);

		Ok(report)
	}

	async fn xref_entities(&self, collection_id: &str, report: &mut XrefReport) -> Result<()> {
		let page_size = i64::from(self.cfg.xref.scroll_size);
		let filter = FragmentFilter::default();
		let mut after = None;

		loop {
			let page =
				fragments::entity_page(&self.db, collection_id, &filter, after, page_size).await?;

			XrefMetrics::add(&self.metrics.malformed_fragments, page.malformed);

			if page.entries.is_empty() {
				break;
			}

			after = page.entries.last().map(|(point_id, _)| *point_id);

			for (_, entity) in &page.entries {
				if retrieve::match_nothing(entity) {
					continue;
				}

				report.entities += 1;

				let started = Instant::now();
				let scored = self.score_one(collection_id, entity).await?;
				let written =
					self.persist(scored.inserts, true).await?;

				report.matches += written;
				report.above_cutoff += scored.above_cutoff;

				self.metrics.record_match_count(written);
				self.metrics.record_roundtrip_ms(started.elapsed().as_millis() as u64);

				XrefMetrics::add(&self.metrics.matches_above_cutoff, scored.above_cutoff);
			}

			XrefMetrics::add(&self.metrics.entities_scanned, page.entries.len() as u64);
		}

		Ok(())
	}

	/// Mentions are folded into one synthetic entity per resolved target
	/// before querying. Aggregates with no candidates at all are dropped;
	/// kept aggregates are written back as `xref` origin fragments so a
	/// later reindex makes them searchable.
	async fn xref_mentions(&self, collection_id: &str, report: &mut XrefReport) -> Result<()> {
		let page_size = i64::from(self.cfg.xref.scroll_size);
		let mut merger = MentionMerger::new();
		let mut writer = FragmentWriter::default();
		let mut after = None;

		loop {
			let page = fragments::mention_page(&self.db, collection_id, after, page_size).await?;

			XrefMetrics::add(&self.metrics.malformed_fragments, page.malformed);
			XrefMetrics::add(&self.metrics.mentions_scanned, page.mentions.len() as u64);

			for mention in &page.mentions {
				if let Some(aggregate) = merger.push(mention) {
					self.match_aggregate(collection_id, aggregate, &mut writer, report).await?;
				}
			}

			if page.next.is_none() {
				break;
			}

			after = page.next.clone();
		}

		if let Some(aggregate) = merger.finish() {
			self.match_aggregate(collection_id, aggregate, &mut writer, report).await?;
		}

		writer.flush(&self.db).await?;

		report.schema_conflicts = merger.schema_conflicts();

		XrefMetrics::add(&self.metrics.schema_conflicts, merger.schema_conflicts());

		Ok(())
	}

	async fn match_aggregate(
		&self,
		collection_id: &str,
		mut aggregate: EntityProxy,
		writer: &mut FragmentWriter,
		report: &mut XrefReport,
	) -> Result<()> {
		report.mentions += 1;

		let started = Instant::now();
		let scored = self.score_one(collection_id, &aggregate).await?;

		// Aggregates with no scoring match at all are not worth reifying.
		if scored.inserts.is_empty() {
			return Ok(());
		}

		// Keep only the countries that at least one match backs up. Mention
		// context countries are guesses; the matches are evidence.
		let backed = backed_countries(&aggregate, &scored.matched);

		aggregate.set(prop::COUNTRY, backed);
		aggregate.schema = narrowed_schema(aggregate.schema, &scored.matched);

		let written = self.persist(scored.inserts, false).await?;

		report.matches += written;
		report.above_cutoff += scored.above_cutoff;

		self.metrics.record_match_count(written);
		self.metrics.record_roundtrip_ms(started.elapsed().as_millis() as u64);

		XrefMetrics::add(&self.metrics.matches_above_cutoff, scored.above_cutoff);

		writer.put(&self.db, collection_id, origin::XREF, &aggregate).await?;

		Ok(())
	}

	/// Score every candidate and keep the pairs with a positive score.
	async fn score_one(&self, collection_id: &str, entity: &EntityProxy) -> Result<ScoredEntity> {
		let candidates = self.candidates(collection_id, entity).await?;
		let mut inserts = Vec::new();
		let mut matched = Vec::new();
		let mut counted = 0;

		for candidate in candidates {
			let comparison = self.scoring.compare(entity, &candidate.entity);

			if comparison.score <= 0.0 {
				continue;
			}
			if above_cutoff(comparison.score) {
				counted += 1;
			}

			inserts.push(MatchInsert {
				collection_id: collection_id.to_string(),
				entity_id: entity.id.clone(),
				match_collection_id: candidate.collection_id.clone(),
				match_id: candidate.entity.id.clone(),
				score: comparison.score,
				doubt: comparison.doubt,
				method: comparison.method,
				entityset_ids: json!([]),
			});
			matched.push(candidate);
		}

		Ok(ScoredEntity { inserts, above_cutoff: counted, matched })
	}

	async fn persist(
		&self,
		mut inserts: Vec<MatchInsert>,
		include_entitysets: bool,
	) -> Result<u64> {
		if include_entitysets {
			if let Some(entity_id) = entityset_subject(&inserts).map(str::to_string) {
				let memberships =
					collections::entityset_memberships(&self.db, std::slice::from_ref(&entity_id))
						.await?;
				let sets = json!(memberships.get(&entity_id).map(Vec::as_slice).unwrap_or(&[]));

				for insert in &mut inserts {
					insert.entityset_ids = sets.clone();
				}
			}
		}

		let written = inserts.len() as u64;

		matches::upsert_matches(&self.db, inserts).await?;

		XrefMetrics::add(&self.metrics.matches_written, written);

		Ok(written)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn candidate(id: &str, schema: Schema, country: Option<&str>) -> Candidate {
		let mut entity = EntityProxy::new(id, schema);

		if let Some(country) = country {
			entity.add(prop::COUNTRY, country);
		}

		Candidate { entity, collection_id: "other".to_string() }
	}

	fn insert(entity_id: &str, match_id: &str) -> MatchInsert {
		MatchInsert {
			collection_id: "c1".to_string(),
			entity_id: entity_id.to_string(),
			match_collection_id: "other".to_string(),
			match_id: match_id.to_string(),
			score: 0.7,
			doubt: None,
			method: "rules-v1".to_string(),
			entityset_ids: json!([]),
		}
	}

	#[test]
	fn memberships_follow_the_source_entity() {
		let inserts = vec![insert("src", "m1"), insert("src", "m2")];

		assert_eq!(entityset_subject(&inserts), Some("src"));
		assert_eq!(entityset_subject(&[]), None);
	}

	#[test]
	fn cutoff_is_strict() {
		assert!(!above_cutoff(SCORE_CUTOFF));
		assert!(above_cutoff(SCORE_CUTOFF + 0.01));
	}

	#[test]
	fn match_schemata_narrow_the_aggregate() {
		let matched = vec![candidate("m1", Schema::Company, None)];

		assert_eq!(narrowed_schema(Schema::LegalEntity, &matched), Schema::Company);

		let conflicting =
			vec![candidate("m1", Schema::Company, None), candidate("m2", Schema::Person, None)];

		assert_eq!(narrowed_schema(Schema::LegalEntity, &conflicting), Schema::LegalEntity);
	}

	#[test]
	fn only_match_backed_countries_survive() {
		let mut aggregate = EntityProxy::new("a1", Schema::LegalEntity);

		aggregate.add(prop::COUNTRY, "de");
		aggregate.add(prop::COUNTRY, "us");

		let matched = vec![candidate("m1", Schema::Company, Some("de"))];

		assert_eq!(backed_countries(&aggregate, &matched), ["de"]);
	}

	#[test]
	fn unnamed_entities_still_carry_a_matchable_schema() {
		let entity = EntityProxy::new("p1", Schema::Person);

		assert!(retrieve::match_nothing(&entity));
		assert!(entity.schema.matchable());
	}
}
