use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, db::Db, models::QueueTask};

pub mod status {
	pub const PENDING: &str = "PENDING";
	pub const CLAIMED: &str = "CLAIMED";
	pub const FAILED: &str = "FAILED";
	pub const DONE: &str = "DONE";
	/// Retry budget exhausted. Left in place for operator inspection.
	pub const DEAD: &str = "DEAD";
	/// The payload was invalid on arrival. Never retried.
	pub const REJECTED: &str = "REJECTED";
	pub const CANCELLED: &str = "CANCELLED";
}

pub async fn enqueue_task(
	db: &Db,
	collection_id: &str,
	operation: &str,
	payload: &Value,
) -> Result<Uuid> {
	let task_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO queue_tasks (task_id, collection_id, operation, payload, status)
VALUES ($1, $2, $3, $4, 'PENDING')",
	)
	.bind(task_id)
	.bind(collection_id)
	.bind(operation)
	.bind(payload)
	.execute(&db.pool)
	.await?;

	Ok(task_id)
}

pub async fn claim_next_task(
	db: &Db,
	now: OffsetDateTime,
	lease_seconds: i64,
) -> Result<Option<QueueTask>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, QueueTask>(
		"\
SELECT
	task_id,
	collection_id,
	operation,
	payload,
	status,
	attempts,
	last_error,
	available_at,
	created_at,
	updated_at
FROM queue_tasks
WHERE status IN ('PENDING','FAILED','CLAIMED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let task = if let Some(mut task) = row {
		let lease_until = now + time::Duration::seconds(lease_seconds);

		sqlx::query(
			"UPDATE queue_tasks SET status = 'CLAIMED', available_at = $1, updated_at = $2 WHERE task_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(task.task_id)
		.execute(&mut *tx)
		.await?;

		task.available_at = lease_until;
		task.updated_at = now;

		Some(task)
	} else {
		None
	};

	tx.commit().await?;

	Ok(task)
}

pub async fn mark_task_done(db: &Db, task_id: Uuid, now: OffsetDateTime) -> Result<()> {
	set_terminal_status(db, task_id, status::DONE, None, now).await
}

pub async fn mark_task_failed(
	db: &Db,
	task_id: Uuid,
	attempts: i32,
	error_text: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE queue_tasks
SET status = 'FAILED',
	attempts = $1,
	last_error = $2,
	available_at = $3,
	updated_at = $4
WHERE task_id = $5",
	)
	.bind(attempts)
	.bind(error_text)
	.bind(available_at)
	.bind(now)
	.bind(task_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}

pub async fn mark_task_dead(
	db: &Db,
	task_id: Uuid,
	error_text: &str,
	now: OffsetDateTime,
) -> Result<()> {
	set_terminal_status(db, task_id, status::DEAD, Some(error_text), now).await
}

pub async fn mark_task_rejected(
	db: &Db,
	task_id: Uuid,
	error_text: &str,
	now: OffsetDateTime,
) -> Result<()> {
	set_terminal_status(db, task_id, status::REJECTED, Some(error_text), now).await
}

/// Withdraw every runnable task for a collection. Claimed tasks finish their
/// current attempt and are dropped by the worker when it notices the status.
pub async fn cancel_collection_tasks(
	db: &Db,
	collection_id: &str,
	now: OffsetDateTime,
) -> Result<u64> {
	let result = sqlx::query(
		"\
UPDATE queue_tasks
SET status = 'CANCELLED', updated_at = $1
WHERE collection_id = $2 AND status IN ('PENDING','FAILED','CLAIMED')",
	)
	.bind(now)
	.bind(collection_id)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected())
}

pub async fn task_status(db: &Db, task_id: Uuid) -> Result<Option<String>> {
	let row: Option<(String,)> =
		sqlx::query_as("SELECT status FROM queue_tasks WHERE task_id = $1")
			.bind(task_id)
			.fetch_optional(&db.pool)
			.await?;

	Ok(row.map(|(status,)| status))
}

async fn set_terminal_status(
	db: &Db,
	task_id: Uuid,
	status: &str,
	error_text: Option<&str>,
	now: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
UPDATE queue_tasks
SET status = $1,
	last_error = COALESCE($2, last_error),
	updated_at = $3
WHERE task_id = $4",
	)
	.bind(status)
	.bind(error_text)
	.bind(now)
	.bind(task_id)
	.execute(&db.pool)
	.await?;

	Ok(())
}
