use xref_config::Postgres;
use xref_storage::{collections, db::Db};

fn env_dsn() -> Option<String> {
	std::env::var("XREF_PG_DSN").ok().filter(|dsn| !dsn.trim().is_empty())
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set XREF_PG_DSN to run."]
async fn tables_exist_after_bootstrap() {
	let Some(dsn) = env_dsn() else {
		eprintln!("Skipping tables_exist_after_bootstrap; set XREF_PG_DSN to run this test.");

		return;
	};
	let cfg = Postgres { dsn, pool_max_conns: 1 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema().await.expect("Failed to ensure schema.");

	for table in ["collections", "entity_fragments", "xref_matches", "queue_tasks", "exports"] {
		let count: i64 = sqlx::query_scalar(
			"SELECT count(*) FROM information_schema.tables WHERE table_name = $1",
		)
		.bind(table)
		.fetch_one(&db.pool)
		.await
		.expect("Failed to query schema tables.");

		assert_eq!(count, 1, "missing table {table}");
	}

	collections::upsert_collection(&db, "smoke-c1", "smoke-fid-1", "Smoke Test")
		.await
		.expect("Failed to upsert collection.");

	let collection = collections::get_by_foreign_id(&db, "smoke-fid-1")
		.await
		.expect("Failed to look up collection.")
		.expect("Collection must exist after upsert.");

	assert_eq!(collection.collection_id, "smoke-c1");
	assert_eq!(collection.label, "Smoke Test");
}
