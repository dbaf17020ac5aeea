use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Collection {
	pub collection_id: String,
	pub foreign_id: String,
	pub label: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct FragmentRow {
	pub collection_id: String,
	pub entity_id: String,
	pub origin: String,
	pub point_id: Uuid,
	pub schema: String,
	pub resolved: Option<String>,
	pub data: Value,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MatchRow {
	pub match_key: Uuid,
	pub collection_id: String,
	pub entity_id: String,
	pub match_collection_id: String,
	pub match_id: String,
	pub score: f64,
	pub doubt: Option<f64>,
	pub method: String,
	pub entityset_ids: Value,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct QueueTask {
	pub task_id: Uuid,
	pub collection_id: String,
	pub operation: String,
	pub payload: Value,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ExportRecord {
	pub export_id: Uuid,
	pub collection_id: String,
	pub kind: String,
	pub status: String,
	pub file_path: Option<String>,
	pub row_count: i64,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
