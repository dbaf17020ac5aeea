/// The write-store schema. Statements are idempotent so `ensure_schema` can
/// run on every boot.
pub const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS collections (
	collection_id TEXT PRIMARY KEY,
	foreign_id    TEXT NOT NULL DEFAULT '',
	label         TEXT NOT NULL DEFAULT '',
	created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
	updated_at    TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS entity_fragments (
	collection_id TEXT NOT NULL,
	entity_id     TEXT NOT NULL,
	origin        TEXT NOT NULL,
	point_id      UUID NOT NULL,
	schema        TEXT NOT NULL,
	resolved      TEXT,
	data          JSONB NOT NULL,
	updated_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
	PRIMARY KEY (collection_id, entity_id, origin)
);

CREATE INDEX IF NOT EXISTS entity_fragments_point_idx
	ON entity_fragments (collection_id, point_id);

CREATE INDEX IF NOT EXISTS entity_fragments_resolved_idx
	ON entity_fragments (collection_id, resolved DESC)
	WHERE resolved IS NOT NULL;

CREATE TABLE IF NOT EXISTS source_entities (
	collection_id TEXT NOT NULL,
	entity_id     TEXT NOT NULL,
	schema        TEXT NOT NULL,
	properties    JSONB NOT NULL DEFAULT '{}'::jsonb,
	created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
	updated_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
	PRIMARY KEY (collection_id, entity_id)
);

CREATE TABLE IF NOT EXISTS entity_sets (
	entityset_id  TEXT PRIMARY KEY,
	collection_id TEXT NOT NULL,
	label         TEXT NOT NULL DEFAULT '',
	set_type      TEXT NOT NULL DEFAULT 'generic',
	created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS entity_set_members (
	entityset_id TEXT NOT NULL,
	entity_id    TEXT NOT NULL,
	PRIMARY KEY (entityset_id, entity_id)
);

CREATE INDEX IF NOT EXISTS entity_set_members_entity_idx
	ON entity_set_members (entity_id);

CREATE TABLE IF NOT EXISTS xref_matches (
	match_key           UUID PRIMARY KEY,
	collection_id       TEXT NOT NULL,
	entity_id           TEXT NOT NULL,
	match_collection_id TEXT NOT NULL,
	match_id            TEXT NOT NULL,
	score               DOUBLE PRECISION NOT NULL,
	doubt               DOUBLE PRECISION,
	method              TEXT NOT NULL,
	entityset_ids       JSONB NOT NULL DEFAULT '[]'::jsonb,
	created_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
	updated_at          TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS xref_matches_collection_idx
	ON xref_matches (collection_id, score DESC, match_key DESC);

CREATE TABLE IF NOT EXISTS queue_tasks (
	task_id       UUID PRIMARY KEY,
	collection_id TEXT NOT NULL,
	operation     TEXT NOT NULL,
	payload       JSONB NOT NULL DEFAULT '{}'::jsonb,
	status        TEXT NOT NULL DEFAULT 'PENDING',
	attempts      INTEGER NOT NULL DEFAULT 0,
	last_error    TEXT,
	available_at  TIMESTAMPTZ NOT NULL DEFAULT now(),
	created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
	updated_at    TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX IF NOT EXISTS queue_tasks_claim_idx
	ON queue_tasks (status, available_at);

CREATE TABLE IF NOT EXISTS exports (
	export_id     UUID PRIMARY KEY,
	collection_id TEXT NOT NULL,
	kind          TEXT NOT NULL,
	status        TEXT NOT NULL DEFAULT 'PENDING',
	file_path     TEXT,
	row_count     BIGINT NOT NULL DEFAULT 0,
	created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
	updated_at    TIMESTAMPTZ NOT NULL DEFAULT now()
)";

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn every_statement_is_idempotent() {
		for statement in SCHEMA.split(';') {
			let trimmed = statement.trim();

			if trimmed.is_empty() {
				continue;
			}

			assert!(
				trimmed.contains("IF NOT EXISTS"),
				"statement is not idempotent: {trimmed}"
			);
		}
	}
}
