use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub xref: XrefSettings,
	pub reindex: ReindexSettings,
	pub export: ExportSettings,
	pub worker: WorkerSettings,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
	/// Base URL of the UI, used to render entity links in exports.
	pub app_ui_url: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
}

#[derive(Debug, Deserialize)]
pub struct XrefSettings {
	/// Named scoring algorithm. Takes precedence over the trained model.
	pub algorithm: Option<String>,
	/// Path to a trained classifier artifact (JSON weights).
	pub model_path: Option<PathBuf>,
	#[serde(default = "default_candidate_limit")]
	pub candidate_limit: u32,
	#[serde(default = "default_scroll_size")]
	pub scroll_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct ReindexSettings {
	#[serde(default = "default_reindex_batch_size")]
	pub batch_size: u32,
	#[serde(default = "default_index_page_size")]
	pub page_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct ExportSettings {
	#[serde(default = "default_export_page_size")]
	pub page_size: u32,
}

#[derive(Debug, Deserialize)]
pub struct WorkerSettings {
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
	#[serde(default = "default_max_attempts")]
	pub max_attempts: u32,
}

fn default_candidate_limit() -> u32 {
	50
}

fn default_scroll_size() -> u32 {
	1_000
}

fn default_reindex_batch_size() -> u32 {
	10_000
}

fn default_index_page_size() -> u32 {
	1_000
}

fn default_export_page_size() -> u32 {
	500
}

fn default_poll_interval_ms() -> u64 {
	500
}

fn default_max_attempts() -> u32 {
	5
}
