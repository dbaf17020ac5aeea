use serde_json::Value;
use time::OffsetDateTime;

use crate::{Result, db::Db};

/// One raw row from the structured-data loader. Aggregated into `model`
/// origin fragments during reindexing.
#[derive(Debug, sqlx::FromRow)]
pub struct SourceEntityRow {
	pub collection_id: String,
	pub entity_id: String,
	pub schema: String,
	pub properties: Value,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

/// Keyset page over the source rows of one collection, ordered by entity
/// identifier.
pub async fn source_page(
	db: &Db,
	collection_id: &str,
	after: Option<&str>,
	limit: i64,
) -> Result<Vec<SourceEntityRow>> {
	let rows = sqlx::query_as(
		"\
SELECT collection_id, entity_id, schema, properties, created_at, updated_at
FROM source_entities
WHERE collection_id = $1 AND ($2::text IS NULL OR entity_id > $2)
ORDER BY entity_id
LIMIT $3",
	)
	.bind(collection_id)
	.bind(after)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(rows)
}
