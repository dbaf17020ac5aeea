use std::collections::VecDeque;

use uuid::Uuid;

use crate::{Error, Result};

/// One identifier from either side of the reconciliation: the point key that
/// defines the order, plus the entity it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
	pub key: Uuid,
	pub entity_id: String,
}

impl Entry {
	pub fn new(key: Uuid, entity_id: impl Into<String>) -> Self {
		Self { key, entity_id: entity_id.into() }
	}
}

/// A paged producer of entries in strictly ascending key order. An empty
/// page marks exhaustion.
#[allow(async_fn_in_trait)]
pub trait IdSource {
	async fn next_page(&mut self) -> Result<Vec<Entry>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffSide {
	/// Present in both the write store and the index.
	Both,
	/// Present in the write store but missing from the index.
	StoreOnly,
	/// Present in the index but gone from the write store.
	IndexOnly,
}

#[derive(Debug, Clone)]
pub struct DiffItem {
	pub key: Uuid,
	pub entity_id: String,
	pub side: DiffSide,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DiffStats {
	pub in_both: u64,
	pub store_only: u64,
	pub index_only: u64,
}

impl DiffStats {
	pub fn divergent(&self) -> u64 {
		self.store_only + self.index_only
	}
}

struct SortedStream<S> {
	source: S,
	buffer: VecDeque<Entry>,
	exhausted: bool,
	last_key: Option<Uuid>,
	label: &'static str,
}

impl<S: IdSource> SortedStream<S> {
	fn new(source: S, label: &'static str) -> Self {
		Self { source, buffer: VecDeque::new(), exhausted: false, last_key: None, label }
	}

	async fn peek_key(&mut self) -> Result<Option<Uuid>> {
		while self.buffer.is_empty() && !self.exhausted {
			let page = self.source.next_page().await?;

			if page.is_empty() {
				self.exhausted = true;

				break;
			}

			for entry in &page {
				if self.last_key.is_some_and(|last| entry.key <= last) {
					return Err(Error::OutOfOrder {
						context: format!("{} key {}", self.label, entry.key),
					});
				}

				self.last_key = Some(entry.key);
			}

			self.buffer.extend(page);
		}

		Ok(self.buffer.front().map(|entry| entry.key))
	}

	fn pop(&mut self) -> Option<Entry> {
		self.buffer.pop_front()
	}
}

/// Sorted merge of the write store's point keys against the search index's.
/// Both sides are streamed page by page, so memory stays flat no matter how
/// large the collection is.
pub struct IndexDiff<A, B> {
	store: SortedStream<A>,
	index: SortedStream<B>,
}

impl<A: IdSource, B: IdSource> IndexDiff<A, B> {
	pub fn new(store: A, index: B) -> Self {
		Self {
			store: SortedStream::new(store, "store"),
			index: SortedStream::new(index, "index"),
		}
	}

	pub async fn next(&mut self) -> Result<Option<DiffItem>> {
		let store_key = self.store.peek_key().await?;
		let index_key = self.index.peek_key().await?;
		let item = match (store_key, index_key) {
			(None, None) => None,
			(Some(_), None) => self.store.pop().map(|entry| DiffItem {
				key: entry.key,
				entity_id: entry.entity_id,
				side: DiffSide::StoreOnly,
			}),
			(None, Some(_)) => self.index.pop().map(|entry| DiffItem {
				key: entry.key,
				entity_id: entry.entity_id,
				side: DiffSide::IndexOnly,
			}),
			(Some(store), Some(index)) =>
				if store < index {
					self.store.pop().map(|entry| DiffItem {
						key: entry.key,
						entity_id: entry.entity_id,
						side: DiffSide::StoreOnly,
					})
				} else if index < store {
					self.index.pop().map(|entry| DiffItem {
						key: entry.key,
						entity_id: entry.entity_id,
						side: DiffSide::IndexOnly,
					})
				} else {
					self.index.pop();
					self.store.pop().map(|entry| DiffItem {
						key: entry.key,
						entity_id: entry.entity_id,
						side: DiffSide::Both,
					})
				},
		};

		Ok(item)
	}

	pub async fn stats(mut self) -> Result<DiffStats> {
		let mut stats = DiffStats::default();

		while let Some(item) = self.next().await? {
			match item.side {
				DiffSide::Both => stats.in_both += 1,
				DiffSide::StoreOnly => stats.store_only += 1,
				DiffSide::IndexOnly => stats.index_only += 1,
			}
		}

		Ok(stats)
	}
}

/// In-memory source over pre-paged fixtures. Also used by the reindex path
/// when a side is already materialized.
pub struct PagedEntries {
	pages: VecDeque<Vec<Entry>>,
}

impl PagedEntries {
	pub fn new(pages: Vec<Vec<Entry>>) -> Self {
		Self { pages: pages.into() }
	}
}

impl IdSource for PagedEntries {
	async fn next_page(&mut self) -> Result<Vec<Entry>> {
		Ok(self.pages.pop_front().unwrap_or_default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn entry(key: u128, entity_id: &str) -> Entry {
		Entry::new(Uuid::from_u128(key), entity_id)
	}

	fn source(pages: Vec<Vec<Entry>>) -> PagedEntries {
		PagedEntries::new(pages)
	}

	#[tokio::test]
	async fn disjoint_and_shared_keys_split_three_ways() {
		let store = source(vec![vec![entry(1, "a"), entry(3, "c"), entry(5, "e")]]);
		let index = source(vec![vec![entry(2, "b"), entry(3, "c"), entry(4, "d")]]);
		let mut diff = IndexDiff::new(store, index);
		let mut seen = Vec::new();

		while let Some(item) = diff.next().await.expect("diff must not fail") {
			seen.push((item.entity_id, item.side));
		}

		assert_eq!(
			seen,
			vec![
				("a".to_string(), DiffSide::StoreOnly),
				("b".to_string(), DiffSide::IndexOnly),
				("c".to_string(), DiffSide::Both),
				("d".to_string(), DiffSide::IndexOnly),
				("e".to_string(), DiffSide::StoreOnly),
			]
		);
	}

	#[tokio::test]
	async fn stats_count_each_side() {
		let store = source(vec![vec![entry(1, "a")], vec![entry(2, "b"), entry(4, "d")]]);
		let index = source(vec![vec![entry(2, "b"), entry(3, "c")], vec![entry(4, "d")]]);
		let diff = IndexDiff::new(store, index);
		let stats = diff.stats().await.expect("diff must not fail");

		assert_eq!(stats, DiffStats { in_both: 2, store_only: 1, index_only: 1 });
		assert_eq!(stats.divergent(), 2);
	}

	#[tokio::test]
	async fn identical_streams_have_no_divergence() {
		let entries: Vec<Entry> =
			(1..=1_000_000).map(|key| entry(key, &format!("e{key}"))).collect();
		let store = source(entries.chunks(9_973).map(<[Entry]>::to_vec).collect());
		let index = source(entries.chunks(25_000).map(<[Entry]>::to_vec).collect());
		let stats = IndexDiff::new(store, index).stats().await.expect("diff must not fail");

		assert_eq!(stats, DiffStats { in_both: 1_000_000, store_only: 0, index_only: 0 });
	}

	#[tokio::test]
	async fn one_empty_side_drains_the_other() {
		let store = source(vec![vec![entry(1, "a"), entry(2, "b")]]);
		let index = source(vec![]);
		let stats = IndexDiff::new(store, index).stats().await.expect("diff must not fail");

		assert_eq!(stats, DiffStats { in_both: 0, store_only: 2, index_only: 0 });
	}

	#[tokio::test]
	async fn unsorted_input_is_rejected() {
		let store = source(vec![vec![entry(2, "b")], vec![entry(1, "a")]]);
		let index = source(vec![]);
		let result = IndexDiff::new(store, index).stats().await;

		assert!(matches!(result, Err(Error::OutOfOrder { .. })));
	}

	#[tokio::test]
	async fn duplicate_keys_are_rejected() {
		let store = source(vec![vec![entry(1, "a"), entry(1, "a")]]);
		let index = source(vec![]);
		let result = IndexDiff::new(store, index).stats().await;

		assert!(matches!(result, Err(Error::OutOfOrder { .. })));
	}
}
