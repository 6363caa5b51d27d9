use std::{
	collections::HashMap,
	sync::{Mutex, MutexGuard},
};

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use cite_domain::status::JobStatus;

use crate::{BoxFuture, CitationJob, Error, JobStore, Result, TenantResolver, deep_analysis};

#[derive(Default)]
struct MemoryState {
	projects: HashMap<Uuid, String>,
	search_histories: HashMap<Uuid, Uuid>,
	jobs: HashMap<Uuid, CitationJob>,
}

/// Job store and tenant resolver held entirely in process memory.
#[derive(Default)]
pub struct MemoryJobStore {
	state: Mutex<MemoryState>,
}
impl MemoryJobStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn register_project(&self, project_id: Uuid, tenant_id: &str) {
		self.lock().projects.insert(project_id, tenant_id.to_string());
	}

	pub fn register_search_history(&self, search_history_id: Uuid, project_id: Uuid) -> Result<()> {
		let mut state = self.lock();

		if !state.projects.contains_key(&project_id) {
			return Err(Error::NotFound { message: format!("Project {project_id} not found.") });
		}

		state.search_histories.insert(search_history_id, project_id);

		Ok(())
	}

	fn lock(&self) -> MutexGuard<'_, MemoryState> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}

	fn history_tenant(state: &MemoryState, search_history_id: Uuid) -> Option<String> {
		let project_id = state.search_histories.get(&search_history_id)?;

		state.projects.get(project_id).cloned()
	}
}

impl JobStore for MemoryJobStore {
	fn insert_job<'a>(&'a self, job: &'a CitationJob) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			let mut state = self.lock();

			if !state.search_histories.contains_key(&job.search_history_id) {
				return Err(Error::NotFound {
					message: format!("Search history {} not found.", job.search_history_id),
				});
			}
			if state.jobs.contains_key(&job.job_id) {
				return Err(Error::InvalidState {
					message: format!("Citation job {} already exists.", job.job_id),
				});
			}

			state.jobs.insert(job.job_id, job.clone());

			Ok(())
		})
	}

	fn find_job<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<Option<CitationJob>>> {
		Box::pin(async move { Ok(self.lock().jobs.get(&job_id).cloned()) })
	}

	fn update_job<'a>(
		&'a self,
		job: &'a CitationJob,
		expected: JobStatus,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut state = self.lock();
			let Some(stored) = state.jobs.get_mut(&job.job_id) else {
				return Ok(false);
			};

			if stored.status != expected {
				return Ok(false);
			}

			stored.status = job.status;
			stored.raw_result_data = job.raw_result_data.clone();
			stored.error_message = job.error_message.clone();
			stored.completed_at = job.completed_at;
			stored.updated_at = job.updated_at;

			Ok(true)
		})
	}

	fn set_external_job_id<'a>(
		&'a self,
		job_id: Uuid,
		external_job_id: &'a str,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut state = self.lock();
			let Some(stored) = state.jobs.get_mut(&job_id) else {
				return Ok(false);
			};

			if stored.status.is_terminal() {
				return Ok(false);
			}

			stored.external_job_id = Some(external_job_id.to_string());
			stored.updated_at = OffsetDateTime::now_utc();

			Ok(true)
		})
	}

	fn list_jobs<'a>(
		&'a self,
		search_history_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<CitationJob>>> {
		Box::pin(async move {
			let mut jobs: Vec<CitationJob> = self
				.lock()
				.jobs
				.values()
				.filter(|job| job.search_history_id == search_history_id)
				.cloned()
				.collect();

			jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.job_id.cmp(&b.job_id)));

			Ok(jobs)
		})
	}

	fn find_job_by_reference<'a>(
		&'a self,
		search_history_id: Uuid,
		reference_number: &'a str,
	) -> BoxFuture<'a, Result<Option<CitationJob>>> {
		Box::pin(async move {
			let wanted = reference_number.trim().to_lowercase();
			let state = self.lock();
			let job = state
				.jobs
				.values()
				.filter(|job| job.search_history_id == search_history_id)
				.filter(|job| {
					job.filter_reference_number
						.as_deref()
						.is_some_and(|reference| reference.trim().to_lowercase() == wanted)
				})
				.max_by_key(|job| (job.status == JobStatus::Completed, job.created_at))
				.cloned();

			Ok(job)
		})
	}

	fn claim_deep_analysis<'a>(
		&'a self,
		job_id: Uuid,
		placeholder: &'a Value,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut state = self.lock();
			let Some(job) = state.jobs.get_mut(&job_id) else {
				return Ok(false);
			};

			if job.status != JobStatus::Completed
				|| job.raw_result_data.is_none()
				|| job.deep_analysis_json.is_some()
			{
				return Ok(false);
			}

			job.deep_analysis_json = Some(placeholder.clone());
			job.updated_at = OffsetDateTime::now_utc();

			Ok(true)
		})
	}

	fn release_deep_analysis<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut state = self.lock();
			let Some(job) = state.jobs.get_mut(&job_id) else {
				return Ok(false);
			};

			if !job.deep_analysis_json.as_ref().is_some_and(deep_analysis::is_queued_marker) {
				return Ok(false);
			}

			job.deep_analysis_json = None;
			job.updated_at = OffsetDateTime::now_utc();

			Ok(true)
		})
	}

	fn save_examiner_analysis<'a>(
		&'a self,
		job_id: Uuid,
		analysis: &'a Value,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			let mut state = self.lock();
			let Some(job) = state.jobs.get_mut(&job_id) else {
				return Ok(false);
			};

			job.examiner_analysis_json = Some(analysis.clone());
			job.updated_at = OffsetDateTime::now_utc();

			Ok(true)
		})
	}
}

impl TenantResolver for MemoryJobStore {
	fn search_history_tenant<'a>(
		&'a self,
		search_history_id: Uuid,
	) -> BoxFuture<'a, Result<Option<String>>> {
		Box::pin(async move { Ok(Self::history_tenant(&self.lock(), search_history_id)) })
	}

	fn job_tenant<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<Option<String>>> {
		Box::pin(async move {
			let state = self.lock();
			let Some(job) = state.jobs.get(&job_id) else {
				return Ok(None);
			};

			Ok(Self::history_tenant(&state, job.search_history_id))
		})
	}
}
