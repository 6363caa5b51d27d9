use std::{sync::Arc, time::Instant};

use cite_domain::{
	fingerprint,
	search::{SearchParams, SearchResponse},
};

use crate::{Error, FreshSearchExecutor, Result, SearchCache, metrics::MetricsAggregator};

pub const SEARCH_OPERATION: &str = "semantic_search";

/// Wraps a fresh search with the result cache.
///
/// Cache faults are logged and bypassed: a failed read falls through to a fresh search and skips
/// the write-back. Provider errors are surfaced unchanged and nothing is cached for them.
pub struct SearchOrchestrator {
	cache: Arc<dyn SearchCache>,
	metrics: Arc<MetricsAggregator>,
	caching_enabled: bool,
}
impl SearchOrchestrator {
	pub fn new(cache: Arc<dyn SearchCache>, metrics: Arc<MetricsAggregator>) -> Self {
		Self { cache, metrics, caching_enabled: true }
	}

	/// Disabling caching here overrides any per-request `use_cache` flag.
	pub fn with_caching(mut self, enabled: bool) -> Self {
		self.caching_enabled = enabled;

		self
	}

	pub async fn execute(
		&self,
		params: &SearchParams,
		executor: &dyn FreshSearchExecutor,
	) -> Result<SearchResponse> {
		let started = Instant::now();
		let outcome = self.execute_inner(params, executor).await;

		self.metrics.observe(SEARCH_OPERATION, started, &outcome);

		outcome
	}

	async fn execute_inner(
		&self,
		params: &SearchParams,
		executor: &dyn FreshSearchExecutor,
	) -> Result<SearchResponse> {
		let cache_key = (self.caching_enabled && params.cache_enabled())
			.then(|| fingerprint::build(&params.cache_key_input()));
		let mut write_back = cache_key.is_some();

		if let Some(key) = cache_key.as_deref() {
			let cache_key_prefix = fingerprint::fingerprint_prefix(key);

			match self.cache.lookup(key) {
				Ok(Some(entry)) => {
					let cache_age_minutes = entry.age_minutes();

					tracing::info!(
						cache_key_prefix,
						hit = true,
						cache_age_minutes,
						results = entry.result.results.len(),
						"Cache hit."
					);

					return Ok(SearchResponse::cached(entry.result, cache_age_minutes));
				},
				Ok(None) => {
					tracing::info!(cache_key_prefix, hit = false, "Cache miss.");
				},
				Err(err) => {
					tracing::warn!(error = %err, cache_key_prefix, "Cache read failed.");

					write_back = false;
				},
			}
		}

		let result = executor
			.execute(params)
			.await
			.map_err(|err| Error::Provider { message: err.to_string() })?;

		if let Some(key) = cache_key.as_deref().filter(|_| write_back) {
			let cache_key_prefix = fingerprint::fingerprint_prefix(key);

			match self.cache.store(key, result.clone(), None) {
				Ok(()) => tracing::info!(
					cache_key_prefix,
					results = result.results.len(),
					total_count = result.total_count,
					"Cache stored."
				),
				Err(err) => tracing::warn!(error = %err, cache_key_prefix, "Cache write failed."),
			}
		}

		Ok(SearchResponse::fresh(result))
	}
}
