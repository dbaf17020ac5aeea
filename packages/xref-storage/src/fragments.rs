use serde_json::Value;
use sqlx::QueryBuilder;
use uuid::Uuid;

use xref_domain::{EntityProxy, Schema, entity::prop};

use crate::{Result, db::Db, models::FragmentRow, point_id};

const DEFAULT_BUFFER: usize = 1_000;

/// Fragment origins written by this system. Ingestion pipelines use their
/// own origin labels.
pub mod origin {
	/// Rows aggregated from the `source_entities` table.
	pub const MODEL: &str = "model";
	/// Mention aggregates reified during a cross-reference pass.
	pub const XREF: &str = "xref";
}

/// Optional restrictions for fragment scans.
#[derive(Debug, Default, Clone)]
pub struct FragmentFilter {
	pub schema: Option<String>,
	pub since: Option<time::OffsetDateTime>,
	pub until: Option<time::OffsetDateTime>,
}

struct FragmentInsert {
	collection_id: String,
	entity_id: String,
	origin: String,
	point_id: Uuid,
	schema: String,
	resolved: Option<String>,
	data: Value,
}

/// Buffered writer for entity fragments. Callers stream proxies in and the
/// writer batches them into multi-row upserts.
pub struct FragmentWriter {
	buffer: Vec<FragmentInsert>,
	capacity: usize,
}

impl FragmentWriter {
	pub fn new(capacity: usize) -> Self {
		Self { buffer: Vec::new(), capacity: capacity.max(1) }
	}

	pub async fn put(
		&mut self,
		db: &Db,
		collection_id: &str,
		origin: &str,
		entity: &EntityProxy,
	) -> Result<()> {
		let insert = FragmentInsert {
			collection_id: collection_id.to_string(),
			entity_id: entity.id.clone(),
			origin: origin.to_string(),
			point_id: point_id(&entity.id),
			schema: entity.schema.name().to_string(),
			resolved: entity.first(prop::RESOLVED).map(str::to_string),
			data: serde_json::to_value(entity)?,
		};

		self.buffer.push(insert);

		if self.buffer.len() >= self.capacity {
			self.flush(db).await?;
		}

		Ok(())
	}

	pub async fn flush(&mut self, db: &Db) -> Result<()> {
		if self.buffer.is_empty() {
			return Ok(());
		}

		let inserts = std::mem::take(&mut self.buffer);
		let mut builder = QueryBuilder::new(
			"\
INSERT INTO entity_fragments (
	collection_id,
	entity_id,
	origin,
	point_id,
	schema,
	resolved,
	data
) ",
		);

		builder.push_values(inserts, |mut b, insert| {
			b.push_bind(insert.collection_id)
				.push_bind(insert.entity_id)
				.push_bind(insert.origin)
				.push_bind(insert.point_id)
				.push_bind(insert.schema)
				.push_bind(insert.resolved)
				.push_bind(insert.data);
		});
		builder.push(
			"\
 ON CONFLICT (collection_id, entity_id, origin) DO UPDATE
SET point_id = EXCLUDED.point_id,
	schema = EXCLUDED.schema,
	resolved = EXCLUDED.resolved,
	data = EXCLUDED.data,
	updated_at = now()",
		);
		builder.build().execute(&db.pool).await?;

		Ok(())
	}
}

impl Default for FragmentWriter {
	fn default() -> Self {
		Self::new(DEFAULT_BUFFER)
	}
}

pub async fn delete_origin(db: &Db, collection_id: &str, origin: &str) -> Result<u64> {
	let result =
		sqlx::query("DELETE FROM entity_fragments WHERE collection_id = $1 AND origin = $2")
			.bind(collection_id)
			.bind(origin)
			.execute(&db.pool)
			.await?;

	Ok(result.rows_affected())
}

/// Point identifiers of every fragment a given origin wrote. Used to purge
/// the matching index points when the origin is reset.
pub async fn origin_point_ids(db: &Db, collection_id: &str, origin: &str) -> Result<Vec<Uuid>> {
	let rows: Vec<(Uuid,)> = sqlx::query_as(
		"\
SELECT DISTINCT point_id
FROM entity_fragments
WHERE collection_id = $1 AND origin = $2",
	)
	.bind(collection_id)
	.bind(origin)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows.into_iter().map(|(point_id,)| point_id).collect())
}

/// A page of assembled entities plus the count of fragment rows whose
/// payload could not be decoded. Malformed rows are skipped rather than
/// aborting the scan.
#[derive(Debug, Default)]
pub struct EntityPage {
	pub entries: Vec<(Uuid, EntityProxy)>,
	pub malformed: u64,
}

/// One keyset page of assembled entities, ordered by point identifier. The
/// limit applies to entities, not fragment rows, so an entity never straddles
/// a page boundary.
pub async fn entity_page(
	db: &Db,
	collection_id: &str,
	filter: &FragmentFilter,
	after: Option<Uuid>,
	limit: i64,
) -> Result<EntityPage> {
	let ids: Vec<(Uuid, String)> = sqlx::query_as(
		"\
SELECT DISTINCT point_id, entity_id
FROM entity_fragments
WHERE collection_id = $1
	AND ($2::uuid IS NULL OR point_id > $2)
	AND ($3::text IS NULL OR schema = $3)
	AND ($4::timestamptz IS NULL OR updated_at >= $4)
	AND ($5::timestamptz IS NULL OR updated_at < $5)
ORDER BY point_id
LIMIT $6",
	)
	.bind(collection_id)
	.bind(after)
	.bind(filter.schema.as_deref())
	.bind(filter.since)
	.bind(filter.until)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	if ids.is_empty() {
		return Ok(EntityPage::default());
	}

	let point_ids: Vec<Uuid> = ids.iter().map(|(point_id, _)| *point_id).collect();
	let rows: Vec<FragmentRow> = sqlx::query_as(
		"\
SELECT collection_id, entity_id, origin, point_id, schema, resolved, data, updated_at
FROM entity_fragments
WHERE collection_id = $1 AND point_id = ANY($2)
ORDER BY point_id, origin",
	)
	.bind(collection_id)
	.bind(&point_ids)
	.fetch_all(&db.pool)
	.await?;

	Ok(assemble(rows))
}

pub async fn fetch_entity(
	db: &Db,
	collection_id: &str,
	entity_id: &str,
) -> Result<Option<EntityProxy>> {
	let mut entities = fetch_entities(db, collection_id, &[entity_id.to_string()]).await?;

	Ok(entities.remove(entity_id))
}

/// Assemble a batch of entities in one round trip, keyed by entity
/// identifier. Missing entities are simply absent from the map.
pub async fn fetch_entities(
	db: &Db,
	collection_id: &str,
	entity_ids: &[String],
) -> Result<std::collections::HashMap<String, EntityProxy>> {
	if entity_ids.is_empty() {
		return Ok(std::collections::HashMap::new());
	}

	let rows: Vec<FragmentRow> = sqlx::query_as(
		"\
SELECT collection_id, entity_id, origin, point_id, schema, resolved, data, updated_at
FROM entity_fragments
WHERE collection_id = $1 AND entity_id = ANY($2)
ORDER BY point_id, origin",
	)
	.bind(collection_id)
	.bind(entity_ids)
	.fetch_all(&db.pool)
	.await?;
	let page = assemble(rows);

	Ok(page.entries.into_iter().map(|(_, entity)| (entity.id.clone(), entity)).collect())
}

/// A page of mention proxies plus the cursor for the next page. The cursor
/// tracks the last scanned row, not the last decoded one, so malformed rows
/// cannot stall the scan.
#[derive(Debug, Default)]
pub struct MentionPage {
	pub mentions: Vec<EntityProxy>,
	pub next: Option<(String, String)>,
	pub malformed: u64,
}

/// Mention fragments for a collection, newest resolved identifier first.
/// Keyset-paged on (resolved, entity_id) so the merge pass sees each resolved
/// run contiguously.
pub async fn mention_page(
	db: &Db,
	collection_id: &str,
	after: Option<(String, String)>,
	limit: i64,
) -> Result<MentionPage> {
	let (after_resolved, after_entity) = match after {
		Some((resolved, entity_id)) => (Some(resolved), Some(entity_id)),
		None => (None, None),
	};
	let rows: Vec<FragmentRow> = sqlx::query_as(
		"\
SELECT collection_id, entity_id, origin, point_id, schema, resolved, data, updated_at
FROM entity_fragments
WHERE collection_id = $1
	AND schema = 'Mention'
	AND resolved IS NOT NULL
	AND ($2::text IS NULL OR (resolved, entity_id) < ($2, $3))
ORDER BY resolved DESC, entity_id DESC
LIMIT $4",
	)
	.bind(collection_id)
	.bind(after_resolved)
	.bind(after_entity)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	let next = rows.last().and_then(|row| {
		row.resolved.as_ref().map(|resolved| (resolved.clone(), row.entity_id.clone()))
	});
	let (mentions, malformed) = decode_mentions(rows);

	Ok(MentionPage { mentions, next, malformed })
}

fn decode_mentions(rows: Vec<FragmentRow>) -> (Vec<EntityProxy>, u64) {
	let mut malformed = 0;
	let mentions = rows
		.into_iter()
		.filter_map(|row| match serde_json::from_value(row.data) {
			Ok(mention) => Some(mention),
			Err(_) => {
				malformed += 1;

				None
			},
		})
		.collect();

	(mentions, malformed)
}

/// Sorted (point_id, entity_id) pairs for the index diff. Matches the scroll
/// order of the search index and its population rules: only matchable
/// schemata with at least one name ever get indexed, so only those may be
/// reported as missing.
pub async fn sorted_point_ids(
	db: &Db,
	collection_id: &str,
	after: Option<Uuid>,
	limit: i64,
) -> Result<Vec<(Uuid, String)>> {
	let matchable: Vec<String> =
		Schema::matchable_names().into_iter().map(str::to_string).collect();
	let rows = sqlx::query_as(
		"\
SELECT point_id, entity_id
FROM entity_fragments
WHERE collection_id = $1 AND schema = ANY($2) AND ($3::uuid IS NULL OR point_id > $3)
GROUP BY point_id, entity_id
HAVING bool_or(
	jsonb_array_length(coalesce(data -> 'properties' -> 'name', '[]'::jsonb)) > 0
	OR jsonb_array_length(coalesce(data -> 'properties' -> 'alias', '[]'::jsonb)) > 0)
ORDER BY point_id
LIMIT $4",
	)
	.bind(collection_id)
	.bind(&matchable)
	.bind(after)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

fn assemble(rows: Vec<FragmentRow>) -> EntityPage {
	let mut page = EntityPage::default();

	for row in rows {
		let fragment: EntityProxy = match serde_json::from_value(row.data) {
			Ok(fragment) => fragment,
			Err(_) => {
				page.malformed += 1;

				continue;
			},
		};

		match page.entries.last_mut() {
			Some((point_id, entity)) if *point_id == row.point_id => {
				entity.schema = widen(entity.schema, fragment.schema);

				for (property, values) in fragment.properties {
					entity.add_all(&property, values);
				}
			},
			_ => page.entries.push((row.point_id, fragment)),
		}
	}

	page
}

fn widen(left: Schema, right: Schema) -> Schema {
	Schema::common_schema(left, right).unwrap_or(Schema::LegalEntity)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn row(data: Value) -> FragmentRow {
		FragmentRow {
			collection_id: "c1".to_string(),
			entity_id: "m1".to_string(),
			origin: "ingest".to_string(),
			point_id: Uuid::nil(),
			schema: "Mention".to_string(),
			resolved: Some("r1".to_string()),
			data,
			updated_at: time::OffsetDateTime::UNIX_EPOCH,
		}
	}

	#[test]
	fn undecodable_mention_rows_are_counted() {
		let mut mention = EntityProxy::new("m1", Schema::Mention);

		mention.add(prop::NAME, "Ana Silva");

		let good = serde_json::to_value(&mention).expect("Failed to serialize mention.");
		let (mentions, malformed) = decode_mentions(vec![row(good), row(Value::from(42))]);

		assert_eq!(mentions.len(), 1);
		assert_eq!(malformed, 1);
	}
}
