use serde_json::Value;
use sqlx::QueryBuilder;
use uuid::Uuid;

use crate::{Result, db::Db, match_key, models::MatchRow};

pub struct MatchInsert {
	pub collection_id: String,
	pub entity_id: String,
	pub match_collection_id: String,
	pub match_id: String,
	pub score: f64,
	pub doubt: Option<f64>,
	pub method: String,
	pub entityset_ids: Value,
}

pub async fn upsert_matches(db: &Db, inserts: Vec<MatchInsert>) -> Result<u64> {
	if inserts.is_empty() {
		return Ok(0);
	}

	let mut builder = QueryBuilder::new(
		"\
INSERT INTO xref_matches (
	match_key,
	collection_id,
	entity_id,
	match_collection_id,
	match_id,
	score,
	doubt,
	method,
	entityset_ids
) ",
	);

	builder.push_values(inserts, |mut b, insert| {
		b.push_bind(match_key(&insert.collection_id, &insert.entity_id, &insert.match_id))
			.push_bind(insert.collection_id)
			.push_bind(insert.entity_id)
			.push_bind(insert.match_collection_id)
			.push_bind(insert.match_id)
			.push_bind(insert.score)
			.push_bind(insert.doubt)
			.push_bind(insert.method)
			.push_bind(insert.entityset_ids);
	});
	builder.push(
		"\
 ON CONFLICT (match_key) DO UPDATE
SET score = EXCLUDED.score,
	doubt = EXCLUDED.doubt,
	method = EXCLUDED.method,
	entityset_ids = EXCLUDED.entityset_ids,
	updated_at = now()",
	);

	let result = builder.build().execute(&db.pool).await?;

	Ok(result.rows_affected())
}

pub async fn delete_entity_matches(db: &Db, collection_id: &str, entity_id: &str) -> Result<u64> {
	let result =
		sqlx::query("DELETE FROM xref_matches WHERE collection_id = $1 AND entity_id = $2")
			.bind(collection_id)
			.bind(entity_id)
			.execute(&db.pool)
			.await?;

	Ok(result.rows_affected())
}

pub async fn delete_matches(db: &Db, collection_id: &str) -> Result<u64> {
	let result = sqlx::query("DELETE FROM xref_matches WHERE collection_id = $1")
		.bind(collection_id)
		.execute(&db.pool)
		.await?;

	Ok(result.rows_affected())
}

/// One keyset page of matches for a collection, best score first.
pub async fn match_page(
	db: &Db,
	collection_id: &str,
	after: Option<(f64, Uuid)>,
	limit: i64,
) -> Result<Vec<MatchRow>> {
	let (after_score, after_key) = match after {
		Some((score, key)) => (Some(score), Some(key)),
		None => (None, None),
	};
	let rows = sqlx::query_as(
		"\
SELECT
	match_key,
	collection_id,
	entity_id,
	match_collection_id,
	match_id,
	score,
	doubt,
	method,
	entityset_ids,
	created_at,
	updated_at
FROM xref_matches
WHERE collection_id = $1
	AND ($2::double precision IS NULL OR (score, match_key) < ($2, $3))
ORDER BY score DESC, match_key DESC
LIMIT $4",
	)
	.bind(collection_id)
	.bind(after_score)
	.bind(after_key)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}
