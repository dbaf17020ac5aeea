use std::{
	fs::File,
	io::{BufWriter, Write},
	path::Path,
};

use uuid::Uuid;

use xref_domain::EntityProxy;
use xref_storage::{collections, exports, matches, models::MatchRow};

use crate::{
	Error, Result, XrefMetrics, XrefService,
	diff::{DiffItem, DiffSide, DiffStats},
	resolver::BatchResolver,
};

/// Queue task name for a match export.
pub const EXPORT_MATCHES_TASK: &str = "export-matches";

const CSV_HEADER: [&str; 13] = [
	"score",
	"doubt",
	"method",
	"entity_id",
	"entity_caption",
	"entity_date",
	"entity_countries",
	"entity_link",
	"match_collection",
	"match_id",
	"match_caption",
	"match_countries",
	"match_link",
];

#[derive(Debug, Clone, serde::Serialize)]
pub struct ExportReport {
	pub collection_id: String,
	pub export_id: Uuid,
	pub rows: u64,
	pub skipped_rows: u64,
	pub file_path: String,
}

/// Output targets for the index diff export. At least one must be set.
#[derive(Debug, Default)]
pub struct DiffExportFiles {
	pub aggregator_ids: Option<std::path::PathBuf>,
	pub index_ids: Option<std::path::PathBuf>,
	pub only_aggregator: Option<std::path::PathBuf>,
	pub only_index: Option<std::path::PathBuf>,
}

impl DiffExportFiles {
	pub fn is_empty(&self) -> bool {
		self.aggregator_ids.is_none()
			&& self.index_ids.is_none()
			&& self.only_aggregator.is_none()
			&& self.only_index.is_none()
	}
}

impl XrefService {
	/// Write the collection's matches to a CSV file. The export record in
	/// the store tracks the outcome either way; rows referencing entities
	/// that disappeared mid-export are skipped and counted, not errors.
	pub async fn export_matches(&self, collection_id: &str, dest: &Path) -> Result<ExportReport> {
		let export_id = exports::create_export(&self.db, collection_id, "matches").await?;

		match self.write_matches_csv(collection_id, dest).await {
			Ok((rows, skipped_rows)) => {
				let file_path = dest.display().to_string();

				exports::mark_export(
					&self.db,
					export_id,
					exports::status::SUCCESS,
					Some(&file_path),
					rows as i64,
				)
				.await?;

				tracing::info!(collection_id, rows, skipped_rows, "Match export finished.");

				Ok(ExportReport {
					collection_id: collection_id.to_string(),
					export_id,
					rows,
					skipped_rows,
					file_path,
				})
			},
			Err(err) => {
				exports::mark_export(&self.db, export_id, exports::status::FAILED, None, 0).await?;
				tracing::warn!(collection_id, error = %err, "Match export failed.");

				Err(err)
			},
		}
	}

	async fn write_matches_csv(&self, collection_id: &str, dest: &Path) -> Result<(u64, u64)> {
		// Staged into a temporary directory that is removed when this
		// function returns, success or not.
		let staging = tempfile::tempdir()?;
		let staged_path = staging.path().join("xref.csv");
		let mut writer = csv::Writer::from_path(&staged_path)?;

		writer.write_record(CSV_HEADER)?;

		let page_size = i64::from(self.cfg.export.page_size);
		let mut rows = 0;
		let mut skipped_rows = 0;
		let mut after = None;

		loop {
			let page = matches::match_page(&self.db, collection_id, after, page_size).await?;

			if page.is_empty() {
				break;
			}

			after = page.last().map(|row| (row.score, row.match_key));

			let (written, skipped) = self.write_match_page(collection_id, &page, &mut writer).await?;

			rows += written;
			skipped_rows += skipped;
		}

		writer.flush()?;
		drop(writer);
		std::fs::copy(&staged_path, dest)?;

		XrefMetrics::add(&self.metrics.skipped_rows, skipped_rows);

		Ok((rows, skipped_rows))
	}

	async fn write_match_page(
		&self,
		collection_id: &str,
		page: &[MatchRow],
		writer: &mut csv::Writer<File>,
	) -> Result<(u64, u64)> {
		let mut resolver = BatchResolver::new();
		let mut match_collections: Vec<String> = Vec::new();

		for row in page {
			resolver.queue(collection_id, &row.entity_id);
			resolver.queue(&row.match_collection_id, &row.match_id);

			if !match_collections.contains(&row.match_collection_id) {
				match_collections.push(row.match_collection_id.clone());
			}
		}

		resolver.resolve_all(&self.db).await?;

		tracing::debug!(lookups = resolver.lookups(), rows = page.len(), "Resolved export page.");

		let labels = collections::labels_for(&self.db, &match_collections).await?;
		let ui_url = self.cfg.service.app_ui_url.as_str();
		let mut written = 0;
		let mut skipped = 0;

		for row in page {
			let entity = resolver.get(collection_id, &row.entity_id);
			let matched = resolver.get(&row.match_collection_id, &row.match_id);
			let label = labels.get(&row.match_collection_id);
			let (Some(entity), Some(matched), Some(label)) = (entity, matched, label) else {
				skipped += 1;

				continue;
			};

			writer.write_record([
				format!("{:.4}", row.score),
				row.doubt.map(|doubt| format!("{doubt:.4}")).unwrap_or_default(),
				row.method.clone(),
				entity.id.clone(),
				entity.caption().to_string(),
				earliest_date(entity),
				countries(entity),
				format!("{ui_url}/entities/{}", entity.id),
				label.clone(),
				matched.id.clone(),
				matched.caption().to_string(),
				countries(matched),
				format!("{ui_url}/entities/{}", matched.id),
			])?;

			written += 1;
		}

		Ok((written, skipped))
	}

	/// Stream the reconciliation diff into plain-text id files, one id per
	/// line. Returns the diff stats for the caller's report.
	pub async fn export_index_diff(
		&self,
		collection_id: &str,
		files: &DiffExportFiles,
	) -> Result<DiffStats> {
		if files.is_empty() {
			return Err(Error::InvalidRequest {
				message: "no output file requested for the index diff".to_string(),
			});
		}

		let mut sinks = DiffSinks::open(files)?;
		let mut diff = self.collection_diff(collection_id);
		let mut stats = DiffStats::default();

		while let Some(item) = diff.next().await? {
			sinks.write(&mut stats, &item)?;
		}

		sinks.finish()?;

		Ok(stats)
	}
}

/// All four buckets carry aggregator entity ids, never index point ids, so
/// the files feed straight back into repair tooling.
struct DiffSinks {
	aggregator_ids: Option<BufWriter<File>>,
	index_ids: Option<BufWriter<File>>,
	only_aggregator: Option<BufWriter<File>>,
	only_index: Option<BufWriter<File>>,
}

impl DiffSinks {
	fn open(files: &DiffExportFiles) -> Result<Self> {
		Ok(Self {
			aggregator_ids: open_sink(files.aggregator_ids.as_deref())?,
			index_ids: open_sink(files.index_ids.as_deref())?,
			only_aggregator: open_sink(files.only_aggregator.as_deref())?,
			only_index: open_sink(files.only_index.as_deref())?,
		})
	}

	fn write(&mut self, stats: &mut DiffStats, item: &DiffItem) -> Result<()> {
		match item.side {
			DiffSide::Both => {
				stats.in_both += 1;

				write_line(&mut self.aggregator_ids, &item.entity_id)?;
				write_line(&mut self.index_ids, &item.entity_id)?;
			},
			DiffSide::StoreOnly => {
				stats.store_only += 1;

				write_line(&mut self.aggregator_ids, &item.entity_id)?;
				write_line(&mut self.only_aggregator, &item.entity_id)?;
			},
			DiffSide::IndexOnly => {
				stats.index_only += 1;

				write_line(&mut self.index_ids, &item.entity_id)?;
				write_line(&mut self.only_index, &item.entity_id)?;
			},
		}

		Ok(())
	}

	fn finish(self) -> Result<()> {
		let sinks =
			[self.aggregator_ids, self.index_ids, self.only_aggregator, self.only_index];

		for mut sink in sinks.into_iter().flatten() {
			sink.flush()?;
		}

		Ok(())
	}
}

fn open_sink(path: Option<&Path>) -> Result<Option<BufWriter<File>>> {
	path.map(|path| Ok(BufWriter::new(File::create(path)?))).transpose()
}

fn write_line(sink: &mut Option<BufWriter<File>>, line: &str) -> Result<()> {
	if let Some(sink) = sink {
		writeln!(sink, "{line}").map_err(Error::from)?;
	}

	Ok(())
}

fn earliest_date(entity: &EntityProxy) -> String {
	entity.dates().into_iter().min().map(str::to_string).unwrap_or_default()
}

fn countries(entity: &EntityProxy) -> String {
	entity
		.countries()
		.iter()
		.map(|country| country.to_uppercase())
		.collect::<Vec<_>>()
		.join(";")
}

#[cfg(test)]
mod tests {
	use super::*;
	use xref_domain::{Schema, entity::prop};

	#[test]
	fn countries_are_uppercased_and_joined() {
		let mut entity = EntityProxy::new("e1", Schema::Company);

		entity.add(prop::JURISDICTION, "vg");
		entity.add(prop::COUNTRY, "pa");

		assert_eq!(countries(&entity), "PA;VG");
	}

	#[test]
	fn earliest_date_wins() {
		let mut entity = EntityProxy::new("p1", Schema::Person);

		entity.add(prop::BIRTH_DATE, "1975-04-02");
		entity.add(prop::BIRTH_DATE, "1975");

		assert_eq!(earliest_date(&entity), "1975");
	}

	#[test]
	fn empty_diff_export_request_is_invalid() {
		assert!(DiffExportFiles::default().is_empty());
	}

	#[test]
	fn diff_files_carry_entity_ids_on_both_sides() {
		let dir = tempfile::tempdir().expect("Failed to create a staging directory.");
		let index_path = dir.path().join("index_ids.txt");
		let only_index_path = dir.path().join("only_index.txt");
		let files = DiffExportFiles {
			index_ids: Some(index_path.clone()),
			only_index: Some(only_index_path.clone()),
			..Default::default()
		};
		let mut sinks = DiffSinks::open(&files).expect("Failed to open diff sinks.");
		let mut stats = DiffStats::default();
		let items = [
			DiffItem { key: Uuid::nil(), entity_id: "e1".to_string(), side: DiffSide::Both },
			DiffItem {
				key: Uuid::from_u128(7),
				entity_id: "e2".to_string(),
				side: DiffSide::IndexOnly,
			},
		];

		for item in &items {
			sinks.write(&mut stats, item).expect("Failed to write a diff line.");
		}

		sinks.finish().expect("Failed to flush diff sinks.");

		let index_ids =
			std::fs::read_to_string(&index_path).expect("Failed to read the index id file.");
		let only_index =
			std::fs::read_to_string(&only_index_path).expect("Failed to read the only-index file.");

		assert_eq!(index_ids, "e1\ne2\n");
		assert_eq!(only_index, "e2\n");
		assert_eq!(stats, DiffStats { in_both: 1, store_only: 0, index_only: 1 });
	}
}
