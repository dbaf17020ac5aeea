use std::{path::PathBuf, time::Duration as StdDuration};

use color_eyre::Result;
use time::{Duration, OffsetDateTime};
use tokio::time as tokio_time;
use uuid::Uuid;

use xref_service::{
	XrefService,
	export::EXPORT_MATCHES_TASK,
	reindex::{REINDEX_BATCH_TASK, ReindexOpts},
};
use xref_storage::{models::QueueTask, queue};

const XREF_TASK: &str = "xref";
const REINDEX_TASK: &str = "reindex";
const CLAIM_LEASE_SECONDS: i64 = 30;
const BASE_BACKOFF_MS: i64 = 500;
const MAX_BACKOFF_MS: i64 = 30_000;

#[derive(Debug)]
enum Job {
	Xref,
	Reindex(ReindexOpts),
	ReindexBatch { entity_ids: Vec<String>, delete_keys: Vec<Uuid> },
	ExportMatches { path: PathBuf },
}

#[derive(Debug, serde::Deserialize)]
struct BatchPayload {
	entity_ids: Vec<String>,
	delete_keys: Vec<Uuid>,
}

#[derive(Debug, serde::Deserialize)]
struct ExportPayload {
	path: PathBuf,
}

pub async fn run_worker(service: &XrefService) -> Result<()> {
	let poll_interval = StdDuration::from_millis(service.cfg.worker.poll_interval_ms);

	tracing::info!("Worker started.");

	loop {
		match process_queue_once(service).await {
			Ok(true) => {},
			Ok(false) => tokio_time::sleep(poll_interval).await,
			Err(err) => {
				tracing::error!(error = %err, "Queue processing failed.");
				tokio_time::sleep(poll_interval).await;
			},
		}
	}
}

/// Claim and run at most one task. Returns `false` when the queue is idle.
async fn process_queue_once(service: &XrefService) -> Result<bool> {
	let now = OffsetDateTime::now_utc();
	let Some(task) = queue::claim_next_task(&service.db, now, CLAIM_LEASE_SECONDS).await? else {
		return Ok(false);
	};

	match parse_job(&task) {
		Err(reason) => {
			queue::mark_task_rejected(
				&service.db,
				task.task_id,
				&reason,
				OffsetDateTime::now_utc(),
			)
			.await?;

			tracing::warn!(
				task_id = %task.task_id,
				operation = %task.operation,
				reason,
				"Rejected a task with an invalid payload."
			);
		},
		Ok(job) => {
			let result = run_job(service, &task, job).await;

			settle_task(service, &task, result).await?;
		},
	}

	Ok(true)
}

/// Payload problems are permanent; everything else is left to the retry
/// budget.
fn parse_job(task: &QueueTask) -> Result<Job, String> {
	match task.operation.as_str() {
		XREF_TASK => Ok(Job::Xref),
		REINDEX_TASK => serde_json::from_value::<ReindexOpts>(task.payload.clone())
			.map(Job::Reindex)
			.map_err(|err| format!("Invalid reindex payload: {err}.")),
		REINDEX_BATCH_TASK => serde_json::from_value::<BatchPayload>(task.payload.clone())
			.map(|payload| Job::ReindexBatch {
				entity_ids: payload.entity_ids,
				delete_keys: payload.delete_keys,
			})
			.map_err(|err| format!("Invalid reindex batch payload: {err}.")),
		EXPORT_MATCHES_TASK => serde_json::from_value::<ExportPayload>(task.payload.clone())
			.map(|payload| Job::ExportMatches { path: payload.path })
			.map_err(|err| format!("Invalid export payload: {err}.")),
		other => Err(format!("Unsupported task: {other}.")),
	}
}

async fn run_job(service: &XrefService, task: &QueueTask, job: Job) -> xref_service::Result<()> {
	match job {
		Job::Xref => {
			let report = service.xref_collection(&task.collection_id).await?;

			tracing::info!(
				collection_id = %task.collection_id,
				matches = report.matches,
				"Cross-reference task finished."
			);
		},
		Job::Reindex(opts) => {
			service.reindex_collection(&task.collection_id, &opts).await?;
		},
		Job::ReindexBatch { entity_ids, delete_keys } => {
			service.reindex_batch(&task.collection_id, &entity_ids, delete_keys).await?;
		},
		Job::ExportMatches { path } => {
			// The export record already carries the failure. Retrying would
			// clobber it with a second record.
			if let Err(err) = service.export_matches(&task.collection_id, &path).await {
				tracing::error!(
					error = %err,
					task_id = %task.task_id,
					collection_id = %task.collection_id,
					"Match export failed."
				);
			}
		},
	}

	Ok(())
}

async fn settle_task(
	service: &XrefService,
	task: &QueueTask,
	result: xref_service::Result<()>,
) -> Result<()> {
	let now = OffsetDateTime::now_utc();

	match result {
		Ok(()) => {
			let status = queue::task_status(&service.db, task.task_id).await?;

			if status.as_deref() == Some(queue::status::CANCELLED) {
				tracing::info!(task_id = %task.task_id, "Dropped a task cancelled mid-run.");

				return Ok(());
			}

			queue::mark_task_done(&service.db, task.task_id, now).await?;
		},
		Err(err) => {
			let next_attempts = task.attempts.saturating_add(1);
			let error_text = err.to_string();

			if next_attempts >= service.cfg.worker.max_attempts as i32 {
				queue::mark_task_dead(&service.db, task.task_id, &error_text, now).await?;

				tracing::error!(
					error = %err,
					task_id = %task.task_id,
					operation = %task.operation,
					"Task exhausted its retry budget."
				);
			} else {
				let available_at = now + backoff_for_attempt(next_attempts);

				queue::mark_task_failed(
					&service.db,
					task.task_id,
					next_attempts,
					&error_text,
					available_at,
					now,
				)
				.await?;

				tracing::error!(
					error = %err,
					task_id = %task.task_id,
					operation = %task.operation,
					attempts = next_attempts,
					"Task failed."
				);
			}
		},
	}

	Ok(())
}

fn backoff_for_attempt(attempt: i32) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(6);
	let base = BASE_BACKOFF_MS.saturating_mul(1 << exp);
	let capped = base.min(MAX_BACKOFF_MS);

	Duration::milliseconds(capped)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn task(operation: &str, payload: serde_json::Value) -> QueueTask {
		let now = OffsetDateTime::now_utc();

		QueueTask {
			task_id: Uuid::new_v4(),
			collection_id: "c-1".to_string(),
			operation: operation.to_string(),
			payload,
			status: queue::status::CLAIMED.to_string(),
			attempts: 0,
			last_error: None,
			available_at: now,
			created_at: now,
			updated_at: now,
		}
	}

	#[test]
	fn backoff_doubles_then_caps() {
		assert_eq!(backoff_for_attempt(1), Duration::milliseconds(500));
		assert_eq!(backoff_for_attempt(2), Duration::milliseconds(1_000));
		assert_eq!(backoff_for_attempt(5), Duration::milliseconds(8_000));
		assert_eq!(backoff_for_attempt(7), Duration::milliseconds(30_000));
		assert_eq!(backoff_for_attempt(100), Duration::milliseconds(30_000));
	}

	#[test]
	fn reindex_payload_defaults_are_lenient() {
		let job = parse_job(&task(REINDEX_TASK, json!({"flush": true})));

		match job {
			Ok(Job::Reindex(opts)) => {
				assert!(opts.flush);
				assert!(!opts.diff_only);
				assert_eq!(opts.batch_size, None);
			},
			other => panic!("unexpected job: {other:?}"),
		}
	}

	#[test]
	fn unsupported_and_malformed_tasks_are_rejected() {
		assert!(parse_job(&task("vacuum", json!({}))).is_err());
		assert!(parse_job(&task(REINDEX_BATCH_TASK, json!({"entity_ids": 3}))).is_err());
		assert!(parse_job(&task(EXPORT_MATCHES_TASK, json!({}))).is_err());
	}
}
