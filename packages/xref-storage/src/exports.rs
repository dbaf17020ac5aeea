use uuid::Uuid;

use crate::{Result, db::Db};

pub mod status {
	pub const PENDING: &str = "PENDING";
	pub const SUCCESS: &str = "SUCCESS";
	pub const FAILED: &str = "FAILED";
}

pub async fn create_export(db: &Db, collection_id: &str, kind: &str) -> Result<Uuid> {
	let export_id = Uuid::new_v4();

	sqlx::query("INSERT INTO exports (export_id, collection_id, kind) VALUES ($1, $2, $3)")
		.bind(export_id)
		.bind(collection_id)
		.bind(kind)
		.execute(&db.pool)
		.await?;

	Ok(export_id)
}

pub async fn mark_export(
	db: &Db,
	export_id: Uuid,
	status: &str,
	file_path: Option<&str>,
	row_count: i64,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE exports
SET status = $1,
	file_path = COALESCE($2, file_path),
	row_count = $3,
	updated_at = now()
WHERE export_id = $4",
	)
	.bind(status)
	.bind(file_path)
	.bind(row_count)
	.bind(export_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}
