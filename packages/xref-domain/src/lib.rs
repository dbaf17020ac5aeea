pub mod entity;
pub mod fingerprint;
pub mod mention;
pub mod schema;
pub mod scoring;

pub use entity::EntityProxy;
pub use mention::MentionMerger;
pub use schema::{Schema, SchemaConflict};
pub use scoring::{Comparison, SCORE_CUTOFF, ScoringStrategy};
