pub mod cache;
pub mod deep_analysis;
pub mod jobs;
pub mod metrics;
pub mod postgres;
pub mod search;
pub mod store;

mod access;
mod error;
mod examiner;

pub use cache::{CacheEntry, CacheError, CacheStats, ResultCache, SearchCache};
pub use deep_analysis::{DeepAnalysisScheduler, QueueDecision, QueueReason};
pub use error::{Error, Result};
pub use jobs::{CitationJob, CreateJobRequest, DeepAnalysisState, JobService};
pub use metrics::{MetricSample, MetricsAggregator, MetricsSink, OperationStats, TracingMetricsSink};
pub use postgres::{PgJobStore, PgOutboxDispatcher};
pub use search::SearchOrchestrator;
pub use store::MemoryJobStore;

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;

use cite_config::{Config, ProviderConfig};
use cite_domain::{
	search::{SearchParams, SearchResultSet},
	status::JobStatus,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Runs a search against the external provider when the cache cannot answer.
pub trait FreshSearchExecutor
where
	Self: Send + Sync,
{
	fn execute<'a>(
		&'a self,
		params: &'a SearchParams,
	) -> BoxFuture<'a, color_eyre::Result<SearchResultSet>>;
}

/// Hands a completed job over to the asynchronous deep-analysis pipeline.
pub trait DeepAnalysisDispatcher
where
	Self: Send + Sync,
{
	fn dispatch<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, color_eyre::Result<()>>;
}

/// Resolves the owning tenant through the job → search history → project chain.
pub trait TenantResolver
where
	Self: Send + Sync,
{
	fn search_history_tenant<'a>(
		&'a self,
		search_history_id: Uuid,
	) -> BoxFuture<'a, Result<Option<String>>>;

	fn job_tenant<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<Option<String>>>;
}

pub trait JobStore
where
	Self: Send + Sync,
{
	fn insert_job<'a>(&'a self, job: &'a CitationJob) -> BoxFuture<'a, Result<()>>;

	fn find_job<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<Option<CitationJob>>>;

	/// Persists the lifecycle fields of `job` (status, raw results, error message, timestamps) only
	/// if the stored status still equals `expected`. Other columns are left as stored.
	fn update_job<'a>(
		&'a self,
		job: &'a CitationJob,
		expected: JobStatus,
	) -> BoxFuture<'a, Result<bool>>;

	/// Sets the provider's job id unless the job has reached a terminal status.
	fn set_external_job_id<'a>(
		&'a self,
		job_id: Uuid,
		external_job_id: &'a str,
	) -> BoxFuture<'a, Result<bool>>;

	fn list_jobs<'a>(
		&'a self,
		search_history_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<CitationJob>>>;

	fn find_job_by_reference<'a>(
		&'a self,
		search_history_id: Uuid,
		reference_number: &'a str,
	) -> BoxFuture<'a, Result<Option<CitationJob>>>;

	/// Sets `placeholder` as the deep-analysis result if the job is completed, has raw results,
	/// and has no deep analysis yet. At most one concurrent caller observes `true`.
	fn claim_deep_analysis<'a>(
		&'a self,
		job_id: Uuid,
		placeholder: &'a Value,
	) -> BoxFuture<'a, Result<bool>>;

	fn release_deep_analysis<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<bool>>;

	fn save_examiner_analysis<'a>(
		&'a self,
		job_id: Uuid,
		analysis: &'a Value,
	) -> BoxFuture<'a, Result<bool>>;
}

/// Caller identity. Every job operation is checked against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
	pub tenant_id: String,
}
impl TenantContext {
	pub fn new(tenant_id: impl Into<String>) -> Self {
		Self { tenant_id: tenant_id.into() }
	}
}

/// Fresh search backed by the configured HTTP provider.
pub struct ProviderSearchExecutor {
	cfg: ProviderConfig,
}
impl ProviderSearchExecutor {
	pub fn new(cfg: ProviderConfig) -> Self {
		Self { cfg }
	}
}

impl FreshSearchExecutor for ProviderSearchExecutor {
	fn execute<'a>(
		&'a self,
		params: &'a SearchParams,
	) -> BoxFuture<'a, color_eyre::Result<SearchResultSet>> {
		Box::pin(cite_providers::search::execute(&self.cfg, params))
	}
}

/// The full pipeline wired from configuration. Storage, tenancy, and dispatch are injected so the
/// same wiring serves both Postgres and in-memory deployments.
pub struct CiteService {
	pub cache: Arc<ResultCache>,
	pub metrics: Arc<MetricsAggregator>,
	pub search: SearchOrchestrator,
	pub jobs: JobService,
	pub deep_analysis: DeepAnalysisScheduler,
}
impl CiteService {
	pub fn new(
		cfg: &Config,
		store: Arc<dyn JobStore>,
		tenants: Arc<dyn TenantResolver>,
		dispatcher: Arc<dyn DeepAnalysisDispatcher>,
		sink: Arc<dyn MetricsSink>,
	) -> Self {
		let cache = Arc::new(ResultCache::from_config(&cfg.cache));
		let metrics = Arc::new(MetricsAggregator::from_config(&cfg.metrics, sink));
		let search = SearchOrchestrator::new(cache.clone(), metrics.clone())
			.with_caching(cfg.cache.enabled);
		let jobs = JobService::new(store.clone(), tenants.clone(), metrics.clone());
		let deep_analysis = DeepAnalysisScheduler::new(store, tenants, dispatcher, metrics.clone());

		Self { cache, metrics, search, jobs, deep_analysis }
	}

	/// Starts the metrics flush loop and, when configured, the cache purge loop.
	pub fn spawn_background_tasks(&self, cfg: &Config) -> Vec<JoinHandle<()>> {
		let mut handles = vec![
			self.metrics
				.clone()
				.spawn_flush_loop(Duration::from_millis(cfg.metrics.flush_interval_ms)),
		];

		if cfg.cache.enabled
			&& let Some(seconds) = cfg.cache.purge_interval_seconds
		{
			handles.push(self.cache.clone().spawn_purge_loop(Duration::from_secs(seconds)));
		}

		handles
	}
}
