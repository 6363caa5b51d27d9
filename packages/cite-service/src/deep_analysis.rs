use std::{sync::Arc, time::Instant};

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use cite_domain::status::JobStatus;
use cite_storage::jobs::QUEUED_MARKER_KEY;

use crate::{
	DeepAnalysisDispatcher, Error, JobStore, Result, TenantContext, TenantResolver, access,
	metrics::MetricsAggregator,
};

pub const MAYBE_QUEUE_OPERATION: &str = "deep_analysis.maybe_queue";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueReason {
	Queued,
	JobNotFound,
	JobNotCompleted,
	NoResults,
	AlreadyCompleted,
}
impl QueueReason {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Queued => "queued",
			Self::JobNotFound => "job not found",
			Self::JobNotCompleted => "job not completed",
			Self::NoResults => "no results to analyze",
			Self::AlreadyCompleted => "already completed",
		}
	}
}
impl Serialize for QueueReason {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueDecision {
	pub queued: bool,
	pub reason: QueueReason,
}
impl QueueDecision {
	fn skipped(reason: QueueReason) -> Self {
		Self { queued: false, reason }
	}
}

/// True when `value` is the placeholder written while a deep analysis is in flight.
///
/// The marker key is reserved, so a provider result is never mistaken for a claim whatever
/// fields it carries.
pub fn is_queued_marker(value: &Value) -> bool {
	value.get(QUEUED_MARKER_KEY).is_some()
}

pub fn queued_marker(now: OffsetDateTime) -> Result<Value> {
	let queued_at = now
		.format(&Rfc3339)
		.map_err(|err| Error::Storage { message: err.to_string() })?;
	let mut marker = Map::new();

	marker.insert(QUEUED_MARKER_KEY.to_string(), Value::String(queued_at));

	Ok(Value::Object(marker))
}

/// Decides whether a completed job is eligible for deep analysis and hands it to the dispatcher.
///
/// Eligibility is checked in order: the job exists for the caller's tenant, it is `COMPLETED`,
/// it has raw results, and it has no deep analysis yet. The last step is a conditional claim in
/// the store, so concurrent callers dispatch at most once per job.
pub struct DeepAnalysisScheduler {
	store: Arc<dyn JobStore>,
	tenants: Arc<dyn TenantResolver>,
	dispatcher: Arc<dyn DeepAnalysisDispatcher>,
	metrics: Arc<MetricsAggregator>,
}
impl DeepAnalysisScheduler {
	pub fn new(
		store: Arc<dyn JobStore>,
		tenants: Arc<dyn TenantResolver>,
		dispatcher: Arc<dyn DeepAnalysisDispatcher>,
		metrics: Arc<MetricsAggregator>,
	) -> Self {
		Self { store, tenants, dispatcher, metrics }
	}

	pub async fn maybe_queue(&self, ctx: &TenantContext, job_id: Uuid) -> Result<QueueDecision> {
		let started = Instant::now();
		let outcome = self.maybe_queue_inner(ctx, job_id).await;

		self.metrics.observe(MAYBE_QUEUE_OPERATION, started, &outcome);

		outcome
	}

	async fn maybe_queue_inner(&self, ctx: &TenantContext, job_id: Uuid) -> Result<QueueDecision> {
		if !access::job_visible(self.tenants.as_ref(), ctx, job_id).await? {
			return Ok(QueueDecision::skipped(QueueReason::JobNotFound));
		}

		let Some(job) = self.store.find_job(job_id).await? else {
			return Ok(QueueDecision::skipped(QueueReason::JobNotFound));
		};

		if job.status != JobStatus::Completed {
			return Ok(QueueDecision::skipped(QueueReason::JobNotCompleted));
		}
		if job.raw_result_data.is_none() {
			return Ok(QueueDecision::skipped(QueueReason::NoResults));
		}
		if job.deep_analysis_json.is_some() {
			return Ok(QueueDecision::skipped(QueueReason::AlreadyCompleted));
		}

		let marker = queued_marker(OffsetDateTime::now_utc())?;

		if !self.store.claim_deep_analysis(job_id, &marker).await? {
			tracing::info!(job_id = %job_id, "Deep analysis already claimed by another caller.");

			return Ok(QueueDecision::skipped(QueueReason::AlreadyCompleted));
		}

		if let Err(err) = self.dispatcher.dispatch(job_id).await {
			tracing::warn!(error = %err, job_id = %job_id, "Deep analysis dispatch failed.");

			if let Err(release_err) = self.store.release_deep_analysis(job_id).await {
				tracing::warn!(
					error = %release_err,
					job_id = %job_id,
					"Failed to release deep analysis claim."
				);
			}

			return Err(Error::Provider { message: err.to_string() });
		}

		tracing::info!(job_id = %job_id, "Deep analysis queued.");

		Ok(QueueDecision { queued: true, reason: QueueReason::Queued })
	}
}
