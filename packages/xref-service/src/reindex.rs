use qdrant_client::qdrant::PointId;
use serde_json::json;
use time::OffsetDateTime;
use uuid::Uuid;

use xref_domain::{EntityProxy, Schema};
use xref_storage::{
	db::Db,
	fragments::{self, FragmentFilter, FragmentWriter, origin},
	index::EntityIndex,
	queue, sources,
};

use crate::{
	Error, Result, XrefMetrics, XrefService,
	diff::{DiffSide, Entry, IdSource, IndexDiff},
	retrieve,
};

/// Queue task name for one batched diff repair.
pub const REINDEX_BATCH_TASK: &str = "reindex-batch";

const PROGRESS_EVERY: u64 = 1_000;

#[derive(Debug, Default, Clone, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ReindexOpts {
	/// Re-aggregate `source_entities` rows into fragments first.
	pub model: bool,
	/// Drop the collection's index points before indexing.
	pub flush: bool,
	/// Repair only the divergence between store and index.
	pub diff_only: bool,
	pub schema: Option<String>,
	pub since: Option<OffsetDateTime>,
	pub until: Option<OffsetDateTime>,
	/// Enqueue repair batches as tasks instead of applying them inline.
	pub queue_batches: bool,
	pub batch_size: Option<u32>,
}

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct ReindexReport {
	pub collection_id: String,
	pub aggregated: u64,
	pub indexed: u64,
	pub skipped: u64,
	pub deleted: u64,
	pub queued_batches: u64,
}

pub(crate) struct StoreIds<'a> {
	db: &'a Db,
	collection_id: &'a str,
	after: Option<Uuid>,
	page_size: i64,
}

impl IdSource for StoreIds<'_> {
	async fn next_page(&mut self) -> Result<Vec<Entry>> {
		let rows =
			fragments::sorted_point_ids(self.db, self.collection_id, self.after, self.page_size)
				.await?;

		self.after = rows.last().map(|(point_id, _)| *point_id);

		Ok(rows.into_iter().map(|(key, entity_id)| Entry::new(key, entity_id)).collect())
	}
}

pub(crate) struct IndexIds<'a> {
	index: &'a EntityIndex,
	collection_id: &'a str,
	offset: Option<PointId>,
	page_size: u32,
	done: bool,
}

impl IdSource for IndexIds<'_> {
	async fn next_page(&mut self) -> Result<Vec<Entry>> {
		if self.done {
			return Ok(Vec::new());
		}

		let page = self
			.index
			.scroll_page(Some(self.collection_id), self.offset.take(), self.page_size)
			.await?;

		match page.next_offset {
			Some(offset) => self.offset = Some(offset),
			None => self.done = true,
		}

		Ok(page.entries.into_iter().map(|(key, entity_id)| Entry::new(key, entity_id)).collect())
	}
}

impl XrefService {
	pub async fn reindex_collection(
		&self,
		collection_id: &str,
		opts: &ReindexOpts,
	) -> Result<ReindexReport> {
		if let Some(name) = opts.schema.as_deref()
			&& Schema::parse(name).is_none()
		{
			return Err(Error::InvalidRequest { message: format!("unknown schema {name}") });
		}

		let mut report =
			ReindexReport { collection_id: collection_id.to_string(), ..Default::default() };

		if opts.model {
			self.aggregate_model(collection_id, &mut report).await?;
		}
		if opts.flush {
			self.index.delete_collection_points(collection_id).await?;
			tracing::info!(collection_id, "Flushed index points before reindex.");
		}
		if opts.diff_only {
			self.reindex_diff(collection_id, opts, &mut report).await?;
		} else {
			self.index_aggregator(collection_id, opts, &mut report).await?;
		}

		tracing::info!(
			collection_id,
			aggregated = report.aggregated,
			indexed = report.indexed,
			skipped = report.skipped,
			deleted = report.deleted,
			queued_batches = report.queued_batches,
			"Reindex finished."
		);

		Ok(report)
	}

	/// Apply one repair batch that was queued by `reindex_diff`.
	pub async fn reindex_batch(
		&self,
		collection_id: &str,
		entity_ids: &[String],
		delete_keys: Vec<Uuid>,
	) -> Result<(u64, u64)> {
		let entities = fragments::fetch_entities(&self.db, collection_id, entity_ids).await?;
		let batch: Vec<EntityProxy> = entities.into_values().collect();
		let indexed = self.index.upsert_entities(collection_id, &batch).await? as u64;
		let deleted = delete_keys.len() as u64;

		self.index.delete_points(delete_keys).await?;

		Ok((indexed, deleted))
	}

	/// Fold raw source rows into `model` origin fragments. A bad row is a
	/// data problem in one record, not a reason to abort the collection.
	async fn aggregate_model(&self, collection_id: &str, report: &mut ReindexReport) -> Result<()> {
		let page_size = i64::from(self.cfg.reindex.page_size);
		let mut writer = FragmentWriter::default();
		let mut after: Option<String> = None;

		loop {
			let rows =
				sources::source_page(&self.db, collection_id, after.as_deref(), page_size).await?;

			if rows.is_empty() {
				break;
			}

			after = rows.last().map(|row| row.entity_id.clone());

			for row in rows {
				match source_proxy(&row) {
					Some(entity) => {
						writer.put(&self.db, collection_id, origin::MODEL, &entity).await?;

						report.aggregated += 1;
					},
					None => {
						tracing::warn!(
							collection_id,
							entity_id = row.entity_id,
							schema = row.schema,
							"Skipped malformed source row."
						);

						report.skipped += 1;

						XrefMetrics::add(&self.metrics.malformed_fragments, 1);
					},
				}
			}
		}

		writer.flush(&self.db).await?;

		Ok(())
	}

	async fn index_aggregator(
		&self,
		collection_id: &str,
		opts: &ReindexOpts,
		report: &mut ReindexReport,
	) -> Result<()> {
		let page_size = i64::from(self.cfg.reindex.page_size);
		let filter = FragmentFilter {
			schema: opts.schema.clone(),
			since: opts.since,
			until: opts.until,
		};
		let mut after = None;
		let mut last_logged = 0;

		loop {
			let page =
				fragments::entity_page(&self.db, collection_id, &filter, after, page_size).await?;

			XrefMetrics::add(&self.metrics.malformed_fragments, page.malformed);

			report.skipped += page.malformed;

			if page.entries.is_empty() {
				break;
			}

			after = page.entries.last().map(|(point_id, _)| *point_id);

			let batch: Vec<EntityProxy> = page
				.entries
				.into_iter()
				.map(|(_, entity)| entity)
				.filter(|entity| !retrieve::match_nothing(entity))
				.collect();

			report.indexed += self.index.upsert_entities(collection_id, &batch).await? as u64;

			if report.indexed - last_logged >= PROGRESS_EVERY {
				tracing::info!(collection_id, indexed = report.indexed, "Reindex progress.");

				last_logged = report.indexed;
			}
		}

		Ok(())
	}

	/// Sorted streams over both sides of one collection, ready for the
	/// reconciliation merge.
	pub(crate) fn collection_diff<'a>(
		&'a self,
		collection_id: &'a str,
	) -> IndexDiff<StoreIds<'a>, IndexIds<'a>> {
		let store = StoreIds {
			db: &self.db,
			collection_id,
			after: None,
			page_size: i64::from(self.cfg.xref.scroll_size),
		};
		let index = IndexIds {
			index: &self.index,
			collection_id,
			offset: None,
			page_size: self.cfg.xref.scroll_size,
			done: false,
		};

		IndexDiff::new(store, index)
	}

	/// Streaming divergence counts without any repair.
	pub async fn index_diff_stats(&self, collection_id: &str) -> Result<crate::diff::DiffStats> {
		self.collection_diff(collection_id).stats().await
	}

	/// Sorted-merge the store against the index and repair only the
	/// divergence, in bounded batches.
	async fn reindex_diff(
		&self,
		collection_id: &str,
		opts: &ReindexOpts,
		report: &mut ReindexReport,
	) -> Result<()> {
		let batch_size = opts.batch_size.unwrap_or(self.cfg.reindex.batch_size).max(1) as usize;
		let mut diff = self.collection_diff(collection_id);
		let mut missing: Vec<String> = Vec::new();
		let mut stale: Vec<Uuid> = Vec::new();

		while let Some(item) = diff.next().await? {
			match item.side {
				DiffSide::Both => {},
				DiffSide::StoreOnly => missing.push(item.entity_id),
				DiffSide::IndexOnly => stale.push(item.key),
			}

			if missing.len() + stale.len() >= batch_size {
				self.flush_repair_batch(collection_id, &mut missing, &mut stale, opts, report)
					.await?;
			}
		}

		self.flush_repair_batch(collection_id, &mut missing, &mut stale, opts, report).await?;

		Ok(())
	}

	async fn flush_repair_batch(
		&self,
		collection_id: &str,
		missing: &mut Vec<String>,
		stale: &mut Vec<Uuid>,
		opts: &ReindexOpts,
		report: &mut ReindexReport,
	) -> Result<()> {
		if missing.is_empty() && stale.is_empty() {
			return Ok(());
		}

		let entity_ids = std::mem::take(missing);
		let delete_keys = std::mem::take(stale);

		if opts.queue_batches {
			let payload = json!({
				"entity_ids": entity_ids,
				"delete_keys": delete_keys,
			});

			queue::enqueue_task(&self.db, collection_id, REINDEX_BATCH_TASK, &payload).await?;

			report.queued_batches += 1;

			return Ok(());
		}

		let (indexed, deleted) = self.reindex_batch(collection_id, &entity_ids, delete_keys).await?;

		report.indexed += indexed;
		report.deleted += deleted;

		Ok(())
	}
}

fn source_proxy(row: &sources::SourceEntityRow) -> Option<EntityProxy> {
	let schema = Schema::parse(&row.schema)?;
	let properties = row.properties.as_object()?;
	let mut entity = EntityProxy::new(row.entity_id.clone(), schema);

	for (property, values) in properties {
		match values {
			serde_json::Value::String(value) => entity.add(property, value.clone()),
			serde_json::Value::Array(values) => {
				for value in values {
					entity.add(property, value.as_str()?.to_string());
				}
			},
			_ => return None,
		}
	}

	Some(entity)
}

#[cfg(test)]
mod tests {
	use super::*;
	use time::OffsetDateTime;

	fn row(entity_id: &str, schema: &str, properties: serde_json::Value) -> sources::SourceEntityRow {
		sources::SourceEntityRow {
			collection_id: "c1".to_string(),
			entity_id: entity_id.to_string(),
			schema: schema.to_string(),
			properties,
			created_at: OffsetDateTime::UNIX_EPOCH,
			updated_at: OffsetDateTime::UNIX_EPOCH,
		}
	}

	#[test]
	fn source_rows_become_proxies() {
		let entity = source_proxy(&row(
			"e1",
			"Company",
			json!({ "name": ["Acme GmbH"], "jurisdiction": "de" }),
		))
		.expect("row must aggregate");

		assert_eq!(entity.schema, Schema::Company);
		assert_eq!(entity.names(), ["Acme GmbH"]);
	}

	#[test]
	fn unknown_schemata_are_rejected() {
		assert!(source_proxy(&row("e1", "Spaceship", json!({}))).is_none());
	}

	#[test]
	fn non_string_property_values_are_rejected() {
		assert!(source_proxy(&row("e1", "Person", json!({ "name": [42] }))).is_none());
	}
}
