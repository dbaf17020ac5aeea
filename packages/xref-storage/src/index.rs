use std::collections::HashMap;

use qdrant_client::qdrant::{
	Condition, CreateCollectionBuilder, DeletePointsBuilder, Document, Filter, Modifier,
	PayloadIncludeSelector, PointId, PointStruct, PointsIdsList, Query, QueryPointsBuilder,
	ScrollPointsBuilder,
	SparseVectorParamsBuilder, SparseVectorsConfigBuilder, UpsertPointsBuilder, Value, Vector,
	point_id::PointIdOptions, value::Kind,
};
use uuid::Uuid;

use xref_domain::EntityProxy;

use crate::{Result, point_id};

pub const NAMES_VECTOR_NAME: &str = "names";
pub const BM25_MODEL: &str = "qdrant/bm25";

/// A candidate returned from the search index, reconstructed from the point
/// payload.
#[derive(Debug)]
pub struct Candidate {
	pub entity: EntityProxy,
	pub collection_id: String,
}

/// Candidates plus the query time the search backend reports for itself,
/// which excludes network transfer.
#[derive(Debug)]
pub struct MatchResult {
	pub candidates: Vec<Candidate>,
	pub index_ms: u64,
}

/// One page of the index-order scroll used by the reconciliation diff.
#[derive(Debug)]
pub struct IndexPage {
	pub entries: Vec<(Uuid, String)>,
	pub next_offset: Option<PointId>,
}

pub struct EntityIndex {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
}
impl EntityIndex {
	pub fn new(cfg: &xref_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone() })
	}

	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(self.collection.clone()).await? {
			return Ok(());
		}

		let mut sparse_vectors_config = SparseVectorsConfigBuilder::default();

		sparse_vectors_config.add_named_vector_params(
			NAMES_VECTOR_NAME,
			SparseVectorParamsBuilder::default().modifier(Modifier::Idf as i32),
		);

		let builder = CreateCollectionBuilder::new(self.collection.clone())
			.sparse_vectors_config(sparse_vectors_config);

		self.client.create_collection(builder).await?;

		Ok(())
	}

	/// Index a batch of assembled entities. Entities without a name carry no
	/// searchable signal and are skipped.
	pub async fn upsert_entities(
		&self,
		collection_id: &str,
		entities: &[EntityProxy],
	) -> Result<usize> {
		let mut points = Vec::with_capacity(entities.len());

		for entity in entities {
			let text = entity.names().join("\n");

			if text.is_empty() {
				continue;
			}

			let mut vector_map = HashMap::new();

			vector_map.insert(
				NAMES_VECTOR_NAME.to_string(),
				Vector::from(Document::new(text, BM25_MODEL)),
			);

			let mut payload_map = HashMap::new();

			payload_map.insert("entity".to_string(), Value::from(serde_json::to_string(entity)?));
			payload_map.insert("entity_id".to_string(), Value::from(entity.id.clone()));
			payload_map
				.insert("collection_id".to_string(), Value::from(collection_id.to_string()));
			payload_map.insert("schema".to_string(), Value::from(entity.schema.name()));

			points.push(PointStruct::new(
				point_id(&entity.id).to_string(),
				vector_map,
				payload_map,
			));
		}

		if points.is_empty() {
			return Ok(0);
		}

		let indexed = points.len();
		let upsert = UpsertPointsBuilder::new(self.collection.clone(), points).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(indexed)
	}

	pub async fn delete_collection_points(&self, collection_id: &str) -> Result<()> {
		let filter = Filter::must([Condition::matches("collection_id", collection_id.to_string())]);
		let delete = DeletePointsBuilder::new(self.collection.clone()).points(filter).wait(true);

		self.client.delete_points(delete).await?;

		Ok(())
	}

	pub async fn delete_points(&self, ids: Vec<Uuid>) -> Result<()> {
		if ids.is_empty() {
			return Ok(());
		}

		let ids: Vec<PointId> = ids.into_iter().map(|id| PointId::from(id.to_string())).collect();
		let delete = DeletePointsBuilder::new(self.collection.clone())
			.points(PointsIdsList { ids })
			.wait(true);

		self.client.delete_points(delete).await?;

		Ok(())
	}

	/// Top candidates for one entity, excluding its own collection and
	/// restricted to schemata it may legitimately match.
	pub async fn match_query(
		&self,
		entity: &EntityProxy,
		collection_id: &str,
		limit: u64,
	) -> Result<MatchResult> {
		let text = entity.names().join("\n");

		if text.is_empty() {
			return Ok(MatchResult { candidates: Vec::new(), index_ms: 0 });
		}

		let schemata: Vec<String> = entity
			.schema
			.matchable_schemata()
			.into_iter()
			.map(|schema| schema.name().to_string())
			.collect();
		let filter = Filter {
			must: vec![Condition::matches("schema", schemata)],
			must_not: vec![
				Condition::matches("collection_id", collection_id.to_string()),
				Condition::has_id([PointId::from(point_id(&entity.id).to_string())]),
			],
			..Default::default()
		};
		let query = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(Document::new(text, BM25_MODEL)))
			.using(NAMES_VECTOR_NAME)
			.filter(filter)
			.limit(limit)
			.with_payload(true);
		let response = self.client.query(query).await?;
		let index_ms = reported_millis(response.time);
		let mut candidates = Vec::with_capacity(response.result.len());

		for point in response.result {
			if let Some(candidate) = parse_candidate(&point.payload)? {
				candidates.push(candidate);
			}
		}

		Ok(MatchResult { candidates, index_ms })
	}

	/// Scroll the index in point-id order. Optionally restricted to one
	/// collection.
	pub async fn scroll_page(
		&self,
		collection_id: Option<&str>,
		offset: Option<PointId>,
		limit: u32,
	) -> Result<IndexPage> {
		let mut scroll = ScrollPointsBuilder::new(self.collection.clone())
			.limit(limit)
			.with_payload(PayloadIncludeSelector {
				fields: vec!["entity_id".to_string()],
			});

		if let Some(collection_id) = collection_id {
			scroll = scroll
				.filter(Filter::must([Condition::matches(
					"collection_id",
					collection_id.to_string(),
				)]));
		}
		if let Some(offset) = offset {
			scroll = scroll.offset(offset);
		}

		let response = self.client.scroll(scroll).await?;
		let mut entries = Vec::with_capacity(response.result.len());

		for point in response.result {
			let Some(point_id) = point.id.as_ref().and_then(parse_point_uuid) else {
				continue;
			};
			let entity_id = payload_str(&point.payload, "entity_id").unwrap_or_default();

			entries.push((point_id, entity_id.to_string()));
		}

		Ok(IndexPage { entries, next_offset: response.next_page_offset })
	}
}

fn parse_candidate(payload: &HashMap<String, Value>) -> Result<Option<Candidate>> {
	let Some(raw) = payload_str(payload, "entity") else {
		return Ok(None);
	};
	let Some(collection_id) = payload_str(payload, "collection_id") else {
		return Ok(None);
	};
	let entity: EntityProxy = serde_json::from_str(raw)?;

	if !entity.schema.matchable() {
		// Stale points written before a schema change. Treat as absent.
		return Ok(None);
	}

	Ok(Some(Candidate { entity, collection_id: collection_id.to_string() }))
}

fn payload_str<'p>(payload: &'p HashMap<String, Value>, key: &str) -> Option<&'p str> {
	match payload.get(key)?.kind.as_ref()? {
		Kind::StringValue(value) => Some(value.as_str()),
		_ => None,
	}
}

fn parse_point_uuid(id: &PointId) -> Option<Uuid> {
	match id.point_id_options.as_ref()? {
		PointIdOptions::Uuid(raw) => Uuid::parse_str(raw).ok(),
		PointIdOptions::Num(_) => None,
	}
}

fn reported_millis(seconds: f64) -> u64 {
	(seconds * 1_000.0).max(0.0) as u64
}
