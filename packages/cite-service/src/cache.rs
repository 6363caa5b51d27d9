use std::{
	collections::HashMap,
	sync::{
		Arc, RwLock,
		atomic::{AtomicU64, Ordering},
	},
	time::{Duration, Instant},
};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use cite_domain::{fingerprint, search::SearchResultSet};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
	#[error("Cache backend error: {message}")]
	Backend { message: String },
}

/// Storage seam used by the search orchestrator. Implementations may fail; callers treat a
/// failure as a miss and never surface it to the requester.
pub trait SearchCache
where
	Self: Send + Sync,
{
	fn lookup(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError>;

	fn store(
		&self,
		fingerprint: &str,
		result: SearchResultSet,
		ttl_override: Option<Duration>,
	) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
	pub fingerprint: String,
	pub result: SearchResultSet,
	pub cached_at: OffsetDateTime,
	pub ttl: Duration,
	stored_at: Instant,
}
impl CacheEntry {
	pub fn is_valid_at(&self, now: Instant) -> bool {
		now.saturating_duration_since(self.stored_at) < self.ttl
	}

	pub fn age(&self) -> Duration {
		self.stored_at.elapsed()
	}

	/// Whole minutes since the entry was written, rounded down.
	pub fn age_minutes(&self) -> i64 {
		(self.age().as_secs() / 60) as i64
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
	pub total_entries: usize,
	pub valid_entries: usize,
	pub hits: u64,
	pub misses: u64,
}

/// Process-local, TTL-bounded store of search results keyed by request fingerprint.
///
/// Expired entries are evicted lazily on read or in bulk through [`ResultCache::purge_expired`].
/// Concurrent writers to the same fingerprint are last-writer-wins.
pub struct ResultCache {
	entries: RwLock<HashMap<String, CacheEntry>>,
	default_ttl: Duration,
	hits: AtomicU64,
	misses: AtomicU64,
}
impl ResultCache {
	pub fn new(default_ttl: Duration) -> Self {
		Self {
			entries: RwLock::new(HashMap::new()),
			default_ttl,
			hits: AtomicU64::new(0),
			misses: AtomicU64::new(0),
		}
	}

	pub fn from_config(cfg: &cite_config::Cache) -> Self {
		Self::new(Duration::from_secs(cfg.ttl_seconds))
	}

	pub fn default_ttl(&self) -> Duration {
		self.default_ttl
	}

	pub fn get(&self, fingerprint: &str) -> Option<CacheEntry> {
		let now = Instant::now();
		let found = {
			let entries = self.entries.read().unwrap_or_else(|err| err.into_inner());

			entries.get(fingerprint).cloned()
		};

		match found {
			Some(entry) if entry.is_valid_at(now) => {
				self.hits.fetch_add(1, Ordering::Relaxed);

				Some(entry)
			},
			Some(_) => {
				let mut entries = self.entries.write().unwrap_or_else(|err| err.into_inner());

				// A concurrent writer may have refreshed the entry since the read above.
				if entries.get(fingerprint).is_some_and(|entry| !entry.is_valid_at(now)) {
					entries.remove(fingerprint);
				}

				self.misses.fetch_add(1, Ordering::Relaxed);

				None
			},
			None => {
				self.misses.fetch_add(1, Ordering::Relaxed);

				None
			},
		}
	}

	pub fn set(&self, fingerprint: &str, result: SearchResultSet, ttl_override: Option<Duration>) {
		let ttl = ttl_override.unwrap_or(self.default_ttl);
		let entry = CacheEntry {
			fingerprint: fingerprint.to_string(),
			result,
			cached_at: OffsetDateTime::now_utc(),
			ttl,
			stored_at: Instant::now(),
		};
		let total_entries = {
			let mut entries = self.entries.write().unwrap_or_else(|err| err.into_inner());

			entries.insert(fingerprint.to_string(), entry);

			entries.len()
		};

		tracing::debug!(
			cache_key_prefix = fingerprint::fingerprint_prefix(fingerprint),
			ttl_seconds = ttl.as_secs(),
			total_entries,
			"Cache entry stored."
		);
	}

	pub fn clear(&self) {
		let removed = {
			let mut entries = self.entries.write().unwrap_or_else(|err| err.into_inner());
			let removed = entries.len();

			entries.clear();

			removed
		};

		tracing::info!(removed, "Result cache cleared.");
	}

	/// Drops every expired entry and returns how many were removed.
	pub fn purge_expired(&self) -> usize {
		let now = Instant::now();
		let mut entries = self.entries.write().unwrap_or_else(|err| err.into_inner());
		let before = entries.len();

		entries.retain(|_, entry| entry.is_valid_at(now));

		before - entries.len()
	}

	/// Sweeps expired entries every `interval`.
	pub fn spawn_purge_loop(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);

			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			ticker.tick().await;

			loop {
				ticker.tick().await;

				let removed = self.purge_expired();

				if removed > 0 {
					tracing::debug!(removed, "Expired cache entries purged.");
				}
			}
		})
	}

	pub fn stats(&self) -> CacheStats {
		let now = Instant::now();
		let entries = self.entries.read().unwrap_or_else(|err| err.into_inner());

		CacheStats {
			total_entries: entries.len(),
			valid_entries: entries.values().filter(|entry| entry.is_valid_at(now)).count(),
			hits: self.hits.load(Ordering::Relaxed),
			misses: self.misses.load(Ordering::Relaxed),
		}
	}
}

impl SearchCache for ResultCache {
	fn lookup(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
		Ok(self.get(fingerprint))
	}

	fn store(
		&self,
		fingerprint: &str,
		result: SearchResultSet,
		ttl_override: Option<Duration>,
	) -> Result<(), CacheError> {
		self.set(fingerprint, result, ttl_override);

		Ok(())
	}
}
