use std::{collections::HashMap, path::PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing_subscriber::EnvFilter;

use xref_service::{XrefService, export::DiffExportFiles, reindex::ReindexOpts};
use xref_storage::{collections, db::Db, fragments, index::EntityIndex, queue};

pub mod worker;

#[derive(Debug, Parser)]
#[command(
	version = xref_cli::VERSION,
	rename_all = "kebab",
	styles = xref_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Cross-reference every entity in a collection.
	Xref {
		foreign_id: String,
	},
	/// Re-match a single entity in place.
	XrefEntity {
		foreign_id: String,
		entity_id: String,
	},
	/// Rebuild the search index for a collection.
	Reindex {
		foreign_id: String,
		/// Re-aggregate raw source rows into fragments first.
		#[arg(long)]
		model: bool,
		/// Drop the collection's index points before indexing.
		#[arg(long)]
		flush: bool,
		/// Repair only the divergence between store and index.
		#[arg(long)]
		diff_only: bool,
		/// Enqueue repair batches as tasks instead of applying them inline.
		#[arg(long)]
		queue_batches: bool,
		#[arg(long, value_name = "N")]
		batch_size: Option<u32>,
		#[arg(long, value_name = "SCHEMA")]
		schema: Option<String>,
		#[arg(long, value_name = "RFC3339", value_parser = parse_timestamp)]
		since: Option<OffsetDateTime>,
		#[arg(long, value_name = "RFC3339", value_parser = parse_timestamp)]
		until: Option<OffsetDateTime>,
	},
	/// Report the divergence between the fragment store and the index.
	IndexDiff {
		foreign_id: String,
	},
	/// Stream the store/index divergence into plain-text id files.
	ExportIndexDiff {
		foreign_id: String,
		#[arg(long, value_name = "FILE")]
		aggregator_ids: Option<PathBuf>,
		#[arg(long, value_name = "FILE")]
		index_ids: Option<PathBuf>,
		#[arg(long, value_name = "FILE")]
		only_aggregator: Option<PathBuf>,
		#[arg(long, value_name = "FILE")]
		only_index: Option<PathBuf>,
	},
	/// Export a collection's matches to a CSV file.
	ExportMatches {
		foreign_id: String,
		output: PathBuf,
	},
	/// Check every collection foreign id for blanks and duplicates.
	ValidateForeignIds,
	/// Withdraw queued tasks for a collection.
	Cancel {
		foreign_id: String,
	},
	/// Run the queue-polling worker loop.
	Worker,
}

fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, String> {
	OffsetDateTime::parse(raw, &Rfc3339).map_err(|err| err.to_string())
}

pub async fn run(args: Args) -> Result<()> {
	let config = xref_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());
	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;
	db.ensure_schema().await?;
	let index = EntityIndex::new(&config.storage.qdrant)?;
	index.ensure_collection().await?;
	let service = XrefService::new(config, db, index);

	match args.command {
		Command::Xref { foreign_id } => {
			let collection_id = resolve_collection(&service, &foreign_id).await?;
			let report = service.xref_collection(&collection_id).await?;

			print_report(&report)?;
		},
		Command::XrefEntity { foreign_id, entity_id } => {
			let collection_id = resolve_collection(&service, &foreign_id).await?;
			let entity = fragments::fetch_entity(&service.db, &collection_id, &entity_id)
				.await?
				.ok_or_else(|| eyre::eyre!("No entity {entity_id} in {foreign_id}."))?;
			let written = service.xref_entity(&collection_id, &entity).await?;

			tracing::info!(collection_id, entity_id, matches = written, "Entity re-matched.");
		},
		Command::Reindex {
			foreign_id,
			model,
			flush,
			diff_only,
			queue_batches,
			batch_size,
			schema,
			since,
			until,
		} => {
			let collection_id = resolve_collection(&service, &foreign_id).await?;
			let opts = ReindexOpts {
				model,
				flush,
				diff_only,
				schema,
				since,
				until,
				queue_batches,
				batch_size,
			};
			let report = service.reindex_collection(&collection_id, &opts).await?;

			print_report(&report)?;
		},
		Command::IndexDiff { foreign_id } => {
			let collection_id = resolve_collection(&service, &foreign_id).await?;
			let stats = service.index_diff_stats(&collection_id).await?;

			print_report(&stats)?;
		},
		Command::ExportIndexDiff {
			foreign_id,
			aggregator_ids,
			index_ids,
			only_aggregator,
			only_index,
		} => {
			let collection_id = resolve_collection(&service, &foreign_id).await?;
			let files = DiffExportFiles { aggregator_ids, index_ids, only_aggregator, only_index };
			let stats = service.export_index_diff(&collection_id, &files).await?;

			print_report(&stats)?;
		},
		Command::ExportMatches { foreign_id, output } => {
			let collection_id = resolve_collection(&service, &foreign_id).await?;
			let report = service.export_matches(&collection_id, &output).await?;

			print_report(&report)?;
		},
		Command::ValidateForeignIds => validate_foreign_ids(&service).await?,
		Command::Cancel { foreign_id } => {
			let collection_id = resolve_collection(&service, &foreign_id).await?;
			let cancelled = queue::cancel_collection_tasks(
				&service.db,
				&collection_id,
				OffsetDateTime::now_utc(),
			)
			.await?;

			tracing::info!(collection_id, cancelled, "Cancelled queued tasks.");
		},
		Command::Worker => worker::run_worker(&service).await?,
	}

	Ok(())
}

async fn resolve_collection(service: &XrefService, foreign_id: &str) -> Result<String> {
	let collection = collections::get_by_foreign_id(&service.db, foreign_id)
		.await?
		.ok_or_else(|| eyre::eyre!("No collection with foreign id {foreign_id}."))?;

	Ok(collection.collection_id)
}

async fn validate_foreign_ids(service: &XrefService) -> Result<()> {
	let all = collections::all_collections(&service.db).await?;
	let mut seen: HashMap<String, String> = HashMap::new();
	let mut problems = 0_u64;

	for collection in all {
		if collection.foreign_id.trim().is_empty() {
			tracing::error!(collection_id = %collection.collection_id, "Blank foreign id.");

			problems += 1;

			continue;
		}

		if let Some(other) =
			seen.insert(collection.foreign_id.clone(), collection.collection_id.clone())
		{
			tracing::error!(
				foreign_id = %collection.foreign_id,
				collection_id = %collection.collection_id,
				duplicate_of = %other,
				"Duplicate foreign id."
			);

			problems += 1;
		}
	}

	if problems > 0 {
		eyre::bail!("{problems} invalid foreign id(s).");
	}

	Ok(())
}

fn print_report<T>(report: &T) -> Result<()>
where
	T: serde::Serialize,
{
	println!("{}", serde_json::to_string_pretty(report)?);

	Ok(())
}
