mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, ExportSettings, Postgres, Qdrant, ReindexSettings, Service, Storage, WorkerSettings,
	XrefSettings,
};

use std::{fs, path::Path};

/// Scoring algorithms that may be named in `xref.algorithm`.
pub const KNOWN_ALGORITHMS: [&str; 2] = ["name-match", "ident-match"];

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.app_ui_url.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.app_ui_url must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}

	if let Some(algorithm) = cfg.xref.algorithm.as_deref()
		&& !KNOWN_ALGORITHMS.contains(&algorithm)
	{
		return Err(Error::Validation {
			message: format!(
				"xref.algorithm must be one of {}.",
				KNOWN_ALGORITHMS.join(", ")
			),
		});
	}

	if cfg.xref.candidate_limit == 0 {
		return Err(Error::Validation {
			message: "xref.candidate_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.xref.scroll_size == 0 {
		return Err(Error::Validation {
			message: "xref.scroll_size must be greater than zero.".to_string(),
		});
	}
	if cfg.reindex.batch_size == 0 {
		return Err(Error::Validation {
			message: "reindex.batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.reindex.page_size == 0 {
		return Err(Error::Validation {
			message: "reindex.page_size must be greater than zero.".to_string(),
		});
	}
	if cfg.export.page_size == 0 {
		return Err(Error::Validation {
			message: "export.page_size must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.max_attempts == 0 {
		return Err(Error::Validation {
			message: "worker.max_attempts must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg.xref.algorithm.as_deref().map(|name| name.trim().is_empty()).unwrap_or(false) {
		cfg.xref.algorithm = None;
	}

	while cfg.service.app_ui_url.ends_with('/') {
		cfg.service.app_ui_url.pop();
	}
}
