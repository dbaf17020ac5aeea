use std::collections::HashMap;

use crate::{Result, db::Db, models::Collection};

pub async fn upsert_collection(
	db: &Db,
	collection_id: &str,
	foreign_id: &str,
	label: &str,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO collections (collection_id, foreign_id, label)
VALUES ($1, $2, $3)
ON CONFLICT (collection_id) DO UPDATE
SET foreign_id = EXCLUDED.foreign_id,
	label = EXCLUDED.label,
	updated_at = now()",
	)
	.bind(collection_id)
	.bind(foreign_id)
	.bind(label)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn get_collection(db: &Db, collection_id: &str) -> Result<Option<Collection>> {
	let row = sqlx::query_as(
		"\
SELECT collection_id, foreign_id, label, created_at, updated_at
FROM collections
WHERE collection_id = $1",
	)
	.bind(collection_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

pub async fn get_by_foreign_id(db: &Db, foreign_id: &str) -> Result<Option<Collection>> {
	let row = sqlx::query_as(
		"\
SELECT collection_id, foreign_id, label, created_at, updated_at
FROM collections
WHERE foreign_id = $1",
	)
	.bind(foreign_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(row)
}

pub async fn all_collections(db: &Db) -> Result<Vec<Collection>> {
	let rows = sqlx::query_as(
		"\
SELECT collection_id, foreign_id, label, created_at, updated_at
FROM collections
ORDER BY collection_id",
	)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}

/// Batched label lookup keyed by collection identifier. One round trip per
/// page of match results instead of one per row.
pub async fn labels_for(db: &Db, collection_ids: &[String]) -> Result<HashMap<String, String>> {
	if collection_ids.is_empty() {
		return Ok(HashMap::new());
	}

	let rows: Vec<(String, String)> =
		sqlx::query_as("SELECT collection_id, label FROM collections WHERE collection_id = ANY($1)")
			.bind(collection_ids)
			.fetch_all(&db.pool)
			.await?;

	Ok(rows.into_iter().collect())
}

/// Entity set memberships for a batch of entities, used to annotate match
/// rows at persist time.
pub async fn entityset_memberships(
	db: &Db,
	entity_ids: &[String],
) -> Result<HashMap<String, Vec<String>>> {
	if entity_ids.is_empty() {
		return Ok(HashMap::new());
	}

	let rows: Vec<(String, String)> = sqlx::query_as(
		"\
SELECT entity_id, entityset_id
FROM entity_set_members
WHERE entity_id = ANY($1)
ORDER BY entityset_id",
	)
	.bind(entity_ids)
	.fetch_all(&db.pool)
	.await?;
	let mut out: HashMap<String, Vec<String>> = HashMap::new();

	for (entity_id, entityset_id) in rows {
		out.entry(entity_id).or_default().push(entityset_id);
	}

	Ok(out)
}
