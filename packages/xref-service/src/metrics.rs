use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bounds for the per-entity match count distribution.
const MATCH_BUCKETS: [u64; 5] = [0, 5, 10, 25, 50];
/// Upper bounds in milliseconds for retrieval latency distributions.
const LATENCY_BUCKETS_MS: [u64; 6] = [5, 25, 100, 500, 2_000, 10_000];

#[derive(Debug)]
pub struct Histogram<const N: usize> {
	buckets: [AtomicU64; N],
	overflow: AtomicU64,
	sum: AtomicU64,
	count: AtomicU64,
}

impl<const N: usize> Default for Histogram<N> {
	fn default() -> Self {
		Self {
			buckets: std::array::from_fn(|_| AtomicU64::new(0)),
			overflow: AtomicU64::new(0),
			sum: AtomicU64::new(0),
			count: AtomicU64::new(0),
		}
	}
}

impl<const N: usize> Histogram<N> {
	fn record(&self, bounds: &[u64; N], value: u64) {
		match bounds.iter().position(|bound| value <= *bound) {
			Some(index) => self.buckets[index].fetch_add(1, Ordering::Relaxed),
			None => self.overflow.fetch_add(1, Ordering::Relaxed),
		};
		self.sum.fetch_add(value, Ordering::Relaxed);
		self.count.fetch_add(1, Ordering::Relaxed);
	}

	fn snapshot(&self, bounds: &[u64; N]) -> HistogramSnapshot {
		HistogramSnapshot {
			bounds: bounds.to_vec(),
			buckets: self.buckets.iter().map(|bucket| bucket.load(Ordering::Relaxed)).collect(),
			overflow: self.overflow.load(Ordering::Relaxed),
			sum: self.sum.load(Ordering::Relaxed),
			count: self.count.load(Ordering::Relaxed),
		}
	}
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HistogramSnapshot {
	pub bounds: Vec<u64>,
	pub buckets: Vec<u64>,
	pub overflow: u64,
	pub sum: u64,
	pub count: u64,
}

/// Process-local counters for one run. Snapshotted and logged when an
/// operation completes.
#[derive(Debug, Default)]
pub struct XrefMetrics {
	pub entities_scanned: AtomicU64,
	pub mentions_scanned: AtomicU64,
	pub candidates_considered: AtomicU64,
	pub matches_written: AtomicU64,
	pub matches_above_cutoff: AtomicU64,
	pub schema_conflicts: AtomicU64,
	pub malformed_fragments: AtomicU64,
	pub skipped_rows: AtomicU64,
	/// Distribution of match counts per queried entity.
	pub match_counts: Histogram<5>,
	/// Time spent inside the search index per candidate query.
	pub index_ms: Histogram<6>,
	/// Full per-entity latency including scoring and persistence.
	pub roundtrip_ms: Histogram<6>,
}

impl XrefMetrics {
	pub fn add(counter: &AtomicU64, value: u64) {
		counter.fetch_add(value, Ordering::Relaxed);
	}

	pub fn record_match_count(&self, count: u64) {
		self.match_counts.record(&MATCH_BUCKETS, count);
	}

	pub fn record_index_ms(&self, millis: u64) {
		self.index_ms.record(&LATENCY_BUCKETS_MS, millis);
	}

	pub fn record_roundtrip_ms(&self, millis: u64) {
		self.roundtrip_ms.record(&LATENCY_BUCKETS_MS, millis);
	}

	pub fn snapshot(&self) -> MetricsSnapshot {
		MetricsSnapshot {
			entities_scanned: self.entities_scanned.load(Ordering::Relaxed),
			mentions_scanned: self.mentions_scanned.load(Ordering::Relaxed),
			candidates_considered: self.candidates_considered.load(Ordering::Relaxed),
			matches_written: self.matches_written.load(Ordering::Relaxed),
			matches_above_cutoff: self.matches_above_cutoff.load(Ordering::Relaxed),
			schema_conflicts: self.schema_conflicts.load(Ordering::Relaxed),
			malformed_fragments: self.malformed_fragments.load(Ordering::Relaxed),
			skipped_rows: self.skipped_rows.load(Ordering::Relaxed),
			match_counts: self.match_counts.snapshot(&MATCH_BUCKETS),
			index_ms: self.index_ms.snapshot(&LATENCY_BUCKETS_MS),
			roundtrip_ms: self.roundtrip_ms.snapshot(&LATENCY_BUCKETS_MS),
		}
	}
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
	pub entities_scanned: u64,
	pub mentions_scanned: u64,
	pub candidates_considered: u64,
	pub matches_written: u64,
	pub matches_above_cutoff: u64,
	pub schema_conflicts: u64,
	pub malformed_fragments: u64,
	pub skipped_rows: u64,
	pub match_counts: HistogramSnapshot,
	pub index_ms: HistogramSnapshot,
	pub roundtrip_ms: HistogramSnapshot,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn match_counts_land_in_the_right_bucket() {
		let metrics = XrefMetrics::default();

		metrics.record_match_count(0);
		metrics.record_match_count(3);
		metrics.record_match_count(50);
		metrics.record_match_count(51);

		let snapshot = metrics.snapshot().match_counts;

		assert_eq!(snapshot.buckets, vec![1, 1, 0, 0, 1]);
		assert_eq!(snapshot.overflow, 1);
		assert_eq!(snapshot.count, 4);
	}

	#[test]
	fn latency_sum_tracks_recorded_values() {
		let metrics = XrefMetrics::default();

		metrics.record_index_ms(10);
		metrics.record_index_ms(90);

		let snapshot = metrics.snapshot().index_ms;

		assert_eq!(snapshot.sum, 100);
		assert_eq!(snapshot.count, 2);
	}
}
