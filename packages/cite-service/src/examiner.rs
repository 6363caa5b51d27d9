use std::time::Instant;

use serde_json::Value;
use uuid::Uuid;

use cite_domain::status::JobStatus;

use crate::{CitationJob, Error, JobService, Result, TenantContext, access};

pub const EXAMINER_ANALYSIS_OPERATION: &str = "citation_job.examiner_analysis";

impl JobService {
	/// Attaches an examiner analysis to the completed job of `search_history_id` that filtered on
	/// `reference_number`.
	pub async fn record_examiner_analysis(
		&self,
		ctx: &TenantContext,
		search_history_id: Uuid,
		reference_number: &str,
		analysis: Value,
	) -> Result<CitationJob> {
		let started = Instant::now();
		let outcome = self
			.record_examiner_analysis_inner(ctx, search_history_id, reference_number, analysis)
			.await;

		self.metrics.observe(EXAMINER_ANALYSIS_OPERATION, started, &outcome);

		outcome
	}

	pub async fn get_examiner_analysis(
		&self,
		ctx: &TenantContext,
		search_history_id: Uuid,
		reference_number: &str,
	) -> Result<Option<Value>> {
		let job = self.reference_job(ctx, search_history_id, reference_number).await?;

		Ok(job.and_then(|job| job.examiner_analysis_json))
	}

	async fn record_examiner_analysis_inner(
		&self,
		ctx: &TenantContext,
		search_history_id: Uuid,
		reference_number: &str,
		analysis: Value,
	) -> Result<CitationJob> {
		if !analysis.is_object() {
			return Err(Error::InvalidRequest {
				message: "Examiner analysis must be a JSON object.".to_string(),
			});
		}

		let Some(mut job) = self.reference_job(ctx, search_history_id, reference_number).await?
		else {
			return Err(Error::NotFound {
				message: format!(
					"No citation job for reference {:?} in search history {search_history_id}.",
					reference_number.trim()
				),
			});
		};

		if job.status != JobStatus::Completed {
			return Err(Error::InvalidState {
				message: format!(
					"Citation job {} is {} and cannot take an examiner analysis.",
					job.job_id, job.status
				),
			});
		}
		if !self.store.save_examiner_analysis(job.job_id, &analysis).await? {
			return Err(Error::NotFound { message: format!("Citation job {} not found.", job.job_id) });
		}

		tracing::info!(
			job_id = %job.job_id,
			search_history_id = %search_history_id,
			"Examiner analysis recorded."
		);

		job.examiner_analysis_json = Some(analysis);

		Ok(job)
	}

	async fn reference_job(
		&self,
		ctx: &TenantContext,
		search_history_id: Uuid,
		reference_number: &str,
	) -> Result<Option<CitationJob>> {
		let reference_number = reference_number.trim();

		if reference_number.is_empty() {
			return Err(Error::InvalidRequest {
				message: "reference_number must be non-empty.".to_string(),
			});
		}

		access::ensure_search_history_access(self.tenants.as_ref(), ctx, search_history_id).await?;

		self.store.find_job_by_reference(search_history_id, reference_number).await
	}
}
