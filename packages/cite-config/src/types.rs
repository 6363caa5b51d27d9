use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub cache: Cache,
	#[serde(default)]
	pub metrics: Metrics,
	#[serde(default)]
	pub worker: Worker,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	/// Semantic search provider that executes fresh prior-art searches.
	pub search: ProviderConfig,
	/// Provider that performs the deep analysis stage on completed citation jobs.
	pub deep_analysis: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub enabled: bool,
	/// Default lifetime of a cached search result.
	pub ttl_seconds: u64,
	/// Optional. Interval between sweeps of expired entries. Reads expire entries lazily even
	/// without a sweep.
	pub purge_interval_seconds: Option<u64>,
}
impl Default for Cache {
	fn default() -> Self {
		Self { enabled: true, ttl_seconds: 3_600, purge_interval_seconds: Some(900) }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
	pub buffer_capacity: usize,
	pub flush_interval_ms: u64,
	pub slow_operation_ms: u64,
}
impl Default for Metrics {
	fn default() -> Self {
		Self { buffer_capacity: 100, flush_interval_ms: 60_000, slow_operation_ms: 5_000 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Worker {
	pub poll_interval_ms: u64,
	pub claim_lease_seconds: i64,
	pub base_backoff_ms: i64,
	pub max_backoff_ms: i64,
	pub max_attempts: i32,
}
impl Default for Worker {
	fn default() -> Self {
		Self {
			poll_interval_ms: 500,
			claim_lease_seconds: 120,
			base_backoff_ms: 500,
			max_backoff_ms: 30_000,
			max_attempts: 8,
		}
	}
}
