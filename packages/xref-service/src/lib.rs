pub mod diff;
pub mod export;
pub mod metrics;
pub mod reindex;
pub mod resolver;
pub mod retrieve;
pub mod scoring;
pub mod xref;

mod error;

pub use error::{Error, Result};
pub use metrics::{MetricsSnapshot, XrefMetrics};
pub use scoring::ScoringService;

use xref_config::Config;
use xref_storage::{db::Db, index::EntityIndex};

pub struct XrefService {
	pub cfg: Config,
	pub db: Db,
	pub index: EntityIndex,
	pub scoring: ScoringService,
	pub metrics: XrefMetrics,
}
impl XrefService {
	pub fn new(cfg: Config, db: Db, index: EntityIndex) -> Self {
		let scoring = ScoringService::resolve(&cfg.xref);

		Self { cfg, db, index, scoring, metrics: XrefMetrics::default() }
	}
}
