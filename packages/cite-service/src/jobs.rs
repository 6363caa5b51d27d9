use std::{sync::Arc, time::Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use cite_domain::status::JobStatus;

use crate::{
	Error, JobStore, Result, TenantContext, TenantResolver, access, deep_analysis,
	metrics::MetricsAggregator,
};

pub const CREATE_OPERATION: &str = "citation_job.create";
pub const UPDATE_STATUS_OPERATION: &str = "citation_job.update_status";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitationJob {
	pub job_id: Uuid,
	pub search_history_id: Uuid,
	pub external_job_id: Option<String>,
	pub status: JobStatus,
	pub filter_reference_number: Option<String>,
	pub search_inputs: Vec<String>,
	pub threshold: Option<f32>,
	pub raw_result_data: Option<Value>,
	pub deep_analysis_json: Option<Value>,
	pub examiner_analysis_json: Option<Value>,
	pub error_message: Option<String>,
	#[serde(with = "time::serde::rfc3339")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339")]
	pub updated_at: OffsetDateTime,
	#[serde(with = "time::serde::rfc3339::option")]
	pub completed_at: Option<OffsetDateTime>,
}
impl CitationJob {
	pub fn deep_analysis_state(&self) -> DeepAnalysisState {
		match &self.deep_analysis_json {
			None => DeepAnalysisState::Absent,
			Some(value) if deep_analysis::is_queued_marker(value) => DeepAnalysisState::Queued,
			Some(_) => DeepAnalysisState::Ready,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeepAnalysisState {
	Absent,
	Queued,
	Ready,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateJobRequest {
	pub search_history_id: Uuid,
	#[serde(default)]
	pub filter_reference_number: Option<String>,
	pub search_inputs: Vec<String>,
	#[serde(default)]
	pub threshold: Option<f32>,
}

/// Tenant-checked lifecycle operations on citation jobs.
pub struct JobService {
	pub(crate) store: Arc<dyn JobStore>,
	pub(crate) tenants: Arc<dyn TenantResolver>,
	pub(crate) metrics: Arc<MetricsAggregator>,
}
impl JobService {
	pub fn new(
		store: Arc<dyn JobStore>,
		tenants: Arc<dyn TenantResolver>,
		metrics: Arc<MetricsAggregator>,
	) -> Self {
		Self { store, tenants, metrics }
	}

	/// Creates a job in `CREATED`. Every call yields a new job id.
	pub async fn create(&self, ctx: &TenantContext, req: CreateJobRequest) -> Result<CitationJob> {
		let started = Instant::now();
		let outcome = self.create_inner(ctx, req).await;

		self.metrics.observe(CREATE_OPERATION, started, &outcome);

		outcome
	}

	/// Moves a job to `status`. `raw_result_data` is accepted only together with `COMPLETED`.
	pub async fn update_status(
		&self,
		ctx: &TenantContext,
		job_id: Uuid,
		status: &str,
		raw_result_data: Option<Value>,
	) -> Result<CitationJob> {
		let next = JobStatus::parse(status).ok_or_else(|| Error::InvalidRequest {
			message: format!(
				"Unknown job status {status:?}. Expected one of CREATED, RUNNING, COMPLETED, FAILED."
			),
		})?;

		if raw_result_data.is_some() && next != JobStatus::Completed {
			return Err(Error::InvalidRequest {
				message: "raw_result_data is only accepted with status COMPLETED.".to_string(),
			});
		}

		self.transition(ctx, job_id, next, raw_result_data, None).await
	}

	pub async fn complete(
		&self,
		ctx: &TenantContext,
		job_id: Uuid,
		raw_result_data: Value,
	) -> Result<CitationJob> {
		self.transition(ctx, job_id, JobStatus::Completed, Some(raw_result_data), None).await
	}

	pub async fn fail(
		&self,
		ctx: &TenantContext,
		job_id: Uuid,
		error_message: &str,
	) -> Result<CitationJob> {
		let error_message = error_message.trim();
		let error_message = (!error_message.is_empty()).then(|| error_message.to_string());

		self.transition(ctx, job_id, JobStatus::Failed, None, error_message).await
	}

	/// Records the identifier assigned by the external citation provider.
	pub async fn assign_external_job_id(
		&self,
		ctx: &TenantContext,
		job_id: Uuid,
		external_job_id: &str,
	) -> Result<CitationJob> {
		let external_job_id = external_job_id.trim();

		if external_job_id.is_empty() {
			return Err(Error::InvalidRequest {
				message: "external_job_id must be non-empty.".to_string(),
			});
		}

		let current = self.load_job(ctx, job_id).await?;

		if current.status.is_terminal() {
			return Err(Error::InvalidState {
				message: format!("Citation job {job_id} is already {}.", current.status),
			});
		}

		if !self.store.set_external_job_id(job_id, external_job_id).await? {
			return Err(Error::InvalidState {
				message: format!("Citation job {job_id} finished before its external id was recorded."),
			});
		}

		tracing::info!(job_id = %job_id, "Citation job external id recorded.");

		self.reload(job_id).await
	}

	/// Returns the job with its raw results, or `None` when it does not exist for this tenant.
	pub async fn get_with_result(
		&self,
		ctx: &TenantContext,
		job_id: Uuid,
	) -> Result<Option<CitationJob>> {
		if !access::job_visible(self.tenants.as_ref(), ctx, job_id).await? {
			return Ok(None);
		}

		self.store.find_job(job_id).await
	}

	/// Jobs of a search history, newest first.
	pub async fn list_for_search_history(
		&self,
		ctx: &TenantContext,
		search_history_id: Uuid,
	) -> Result<Vec<CitationJob>> {
		access::ensure_search_history_access(self.tenants.as_ref(), ctx, search_history_id).await?;

		self.store.list_jobs(search_history_id).await
	}

	pub(crate) async fn load_job(&self, ctx: &TenantContext, job_id: Uuid) -> Result<CitationJob> {
		access::ensure_job_access(self.tenants.as_ref(), ctx, job_id).await?;

		self.store.find_job(job_id).await?.ok_or_else(|| Error::NotFound {
			message: format!("Citation job {job_id} not found."),
		})
	}

	async fn create_inner(&self, ctx: &TenantContext, req: CreateJobRequest) -> Result<CitationJob> {
		access::ensure_search_history_access(self.tenants.as_ref(), ctx, req.search_history_id)
			.await?;

		let search_inputs: Vec<String> = req
			.search_inputs
			.iter()
			.map(|input| input.trim())
			.filter(|input| !input.is_empty())
			.map(str::to_string)
			.collect();

		if search_inputs.is_empty() {
			return Err(Error::InvalidRequest {
				message: "search_inputs must contain at least one non-empty entry.".to_string(),
			});
		}
		if let Some(threshold) = req.threshold
			&& !(0.0..=1.0).contains(&threshold)
		{
			return Err(Error::InvalidRequest {
				message: "threshold must be between 0.0 and 1.0.".to_string(),
			});
		}

		let now = OffsetDateTime::now_utc();
		let filter_reference_number = req
			.filter_reference_number
			.as_deref()
			.map(str::trim)
			.filter(|reference| !reference.is_empty())
			.map(str::to_string);
		let job = CitationJob {
			job_id: Uuid::new_v4(),
			search_history_id: req.search_history_id,
			external_job_id: None,
			status: JobStatus::Created,
			filter_reference_number,
			search_inputs,
			threshold: req.threshold,
			raw_result_data: None,
			deep_analysis_json: None,
			examiner_analysis_json: None,
			error_message: None,
			created_at: now,
			updated_at: now,
			completed_at: None,
		};

		self.store.insert_job(&job).await?;

		tracing::info!(
			job_id = %job.job_id,
			search_history_id = %job.search_history_id,
			search_inputs = job.search_inputs.len(),
			"Citation job created."
		);

		Ok(job)
	}

	async fn transition(
		&self,
		ctx: &TenantContext,
		job_id: Uuid,
		next: JobStatus,
		raw_result_data: Option<Value>,
		error_message: Option<String>,
	) -> Result<CitationJob> {
		let started = Instant::now();
		let outcome = self.transition_inner(ctx, job_id, next, raw_result_data, error_message).await;

		self.metrics.observe(UPDATE_STATUS_OPERATION, started, &outcome);

		outcome
	}

	async fn transition_inner(
		&self,
		ctx: &TenantContext,
		job_id: Uuid,
		next: JobStatus,
		raw_result_data: Option<Value>,
		error_message: Option<String>,
	) -> Result<CitationJob> {
		let current = self.load_job(ctx, job_id).await?;

		if !current.status.can_transition_to(next) {
			return Err(Error::InvalidState {
				message: format!("Citation job {job_id} cannot move from {} to {next}.", current.status),
			});
		}
		if current.status == next {
			return Ok(current);
		}

		let now = OffsetDateTime::now_utc();
		let mut updated = current.clone();

		updated.status = next;
		updated.updated_at = now;

		match next {
			JobStatus::Completed => {
				updated.raw_result_data = raw_result_data;
				updated.completed_at = Some(now);
			},
			JobStatus::Failed => {
				updated.error_message = error_message;
				updated.completed_at = Some(now);
			},
			JobStatus::Created | JobStatus::Running => {},
		}

		if !self.store.update_job(&updated, current.status).await? {
			return Err(concurrent_change(job_id));
		}

		tracing::info!(
			job_id = %job_id,
			from = current.status.as_str(),
			to = next.as_str(),
			"Citation job status updated."
		);

		// Columns outside the lifecycle may have moved since `current` was read.
		self.reload(job_id).await
	}

	async fn reload(&self, job_id: Uuid) -> Result<CitationJob> {
		self.store.find_job(job_id).await?.ok_or_else(|| Error::NotFound {
			message: format!("Citation job {job_id} not found."),
		})
	}
}

fn concurrent_change(job_id: Uuid) -> Error {
	Error::InvalidState {
		message: format!("Citation job {job_id} changed concurrently. Reload and retry."),
	}
}
