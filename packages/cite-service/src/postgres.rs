use std::sync::Arc;

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use cite_domain::status::JobStatus;
use cite_storage::{db::Db, jobs, models::CitationJobRow, outbox, tenancy};

use crate::{
	BoxFuture, CitationJob, DeepAnalysisDispatcher, Error, JobStore, Result, TenantResolver,
};

/// Job store and tenant resolver backed by Postgres.
#[derive(Clone)]
pub struct PgJobStore {
	db: Arc<Db>,
}
impl PgJobStore {
	pub fn new(db: Arc<Db>) -> Self {
		Self { db }
	}
}

impl JobStore for PgJobStore {
	fn insert_job<'a>(&'a self, job: &'a CitationJob) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			jobs::insert_job(&self.db.pool, &to_row(job)).await?;

			Ok(())
		})
	}

	fn find_job<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<Option<CitationJob>>> {
		Box::pin(async move {
			let row = jobs::fetch_job(&self.db.pool, job_id).await?;

			row.map(from_row).transpose()
		})
	}

	fn update_job<'a>(
		&'a self,
		job: &'a CitationJob,
		expected: JobStatus,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let row = to_row(job);

			Ok(jobs::update_job_state(&self.db.pool, &row, expected.as_str()).await?)
		})
	}

	fn set_external_job_id<'a>(
		&'a self,
		job_id: Uuid,
		external_job_id: &'a str,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			Ok(jobs::set_external_job_id(&self.db.pool, job_id, external_job_id, now).await?)
		})
	}

	fn list_jobs<'a>(
		&'a self,
		search_history_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<CitationJob>>> {
		Box::pin(async move {
			jobs::list_jobs_for_search_history(&self.db.pool, search_history_id)
				.await?
				.into_iter()
				.map(from_row)
				.collect()
		})
	}

	fn find_job_by_reference<'a>(
		&'a self,
		search_history_id: Uuid,
		reference_number: &'a str,
	) -> BoxFuture<'a, Result<Option<CitationJob>>> {
		Box::pin(async move {
			jobs::find_job_by_reference(&self.db.pool, search_history_id, reference_number)
				.await?
				.map(from_row)
				.transpose()
		})
	}

	fn claim_deep_analysis<'a>(
		&'a self,
		job_id: Uuid,
		placeholder: &'a Value,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			Ok(jobs::claim_deep_analysis(&self.db.pool, job_id, placeholder, now).await?)
		})
	}

	fn release_deep_analysis<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			Ok(jobs::release_deep_analysis(&self.db.pool, job_id, now).await?)
		})
	}

	fn save_examiner_analysis<'a>(
		&'a self,
		job_id: Uuid,
		analysis: &'a Value,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();

			Ok(jobs::save_examiner_analysis(&self.db.pool, job_id, analysis, now).await?)
		})
	}
}

impl TenantResolver for PgJobStore {
	fn search_history_tenant<'a>(
		&'a self,
		search_history_id: Uuid,
	) -> BoxFuture<'a, Result<Option<String>>> {
		Box::pin(async move {
			Ok(tenancy::search_history_tenant(&self.db.pool, search_history_id).await?)
		})
	}

	fn job_tenant<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<Option<String>>> {
		Box::pin(async move { Ok(tenancy::job_tenant(&self.db.pool, job_id).await?) })
	}
}

/// Dispatches deep analysis by writing an outbox row for the worker to pick up.
#[derive(Clone)]
pub struct PgOutboxDispatcher {
	db: Arc<Db>,
}
impl PgOutboxDispatcher {
	pub fn new(db: Arc<Db>) -> Self {
		Self { db }
	}
}

impl DeepAnalysisDispatcher for PgOutboxDispatcher {
	fn dispatch<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move {
			let now = OffsetDateTime::now_utc();
			let outbox_id = outbox::enqueue_deep_analysis(&self.db.pool, job_id, now).await?;

			tracing::debug!(
				job_id = %job_id,
				outbox_id = %outbox_id,
				"Deep analysis outbox entry enqueued."
			);

			Ok(())
		})
	}
}

pub fn to_row(job: &CitationJob) -> CitationJobRow {
	CitationJobRow {
		job_id: job.job_id,
		search_history_id: job.search_history_id,
		external_job_id: job.external_job_id.clone(),
		status: job.status.as_str().to_string(),
		filter_reference_number: job.filter_reference_number.clone(),
		search_inputs: Value::from(job.search_inputs.clone()),
		threshold: job.threshold,
		raw_result_data: job.raw_result_data.clone(),
		deep_analysis_json: job.deep_analysis_json.clone(),
		examiner_analysis_json: job.examiner_analysis_json.clone(),
		error_message: job.error_message.clone(),
		created_at: job.created_at,
		updated_at: job.updated_at,
		completed_at: job.completed_at,
	}
}

/// Converts a stored row, accepting status values in any letter case.
pub fn from_row(row: CitationJobRow) -> Result<CitationJob> {
	let status = JobStatus::parse(&row.status).ok_or_else(|| Error::Storage {
		message: format!("Unknown citation job status {:?} for job {}.", row.status, row.job_id),
	})?;

	if row.status != status.as_str() {
		tracing::warn!(
			job_id = %row.job_id,
			stored_status = row.status.as_str(),
			"Citation job status is stored in non-canonical form."
		);
	}

	let search_inputs: Vec<String> = serde_json::from_value(row.search_inputs).map_err(|err| {
		Error::Storage {
			message: format!("Invalid search_inputs for job {}: {err}.", row.job_id),
		}
	})?;

	Ok(CitationJob {
		job_id: row.job_id,
		search_history_id: row.search_history_id,
		external_job_id: row.external_job_id,
		status,
		filter_reference_number: row.filter_reference_number,
		search_inputs,
		threshold: row.threshold,
		raw_result_data: row.raw_result_data,
		deep_analysis_json: row.deep_analysis_json,
		examiner_analysis_json: row.examiner_analysis_json,
		error_message: row.error_message,
		created_at: row.created_at,
		updated_at: row.updated_at,
		completed_at: row.completed_at,
	})
}
