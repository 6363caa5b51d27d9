use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};

use serde_json::Value;
use tokio::sync::Notify;
use uuid::Uuid;

use cite_domain::status::JobStatus;
use cite_service::{
	BoxFuture, CitationJob, CiteService, DeepAnalysisState, Error, JobStore, MemoryJobStore,
	Result, TenantContext,
};

use super::{Harness, RecordingDispatcher, RecordingSink};

/// Holds the next `find_job` caller after its read until `resume` is notified.
struct PausingStore {
	inner: Arc<MemoryJobStore>,
	armed: AtomicBool,
	snapshot_taken: Notify,
	resume: Notify,
}
impl PausingStore {
	fn new(inner: Arc<MemoryJobStore>) -> Self {
		Self {
			inner,
			armed: AtomicBool::new(false),
			snapshot_taken: Notify::new(),
			resume: Notify::new(),
		}
	}
}

impl JobStore for PausingStore {
	fn insert_job<'a>(&'a self, job: &'a CitationJob) -> BoxFuture<'a, Result<()>> {
		self.inner.insert_job(job)
	}

	fn find_job<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<Option<CitationJob>>> {
		Box::pin(async move {
			let found = self.inner.find_job(job_id).await?;

			if self.armed.swap(false, Ordering::SeqCst) {
				self.snapshot_taken.notify_one();
				self.resume.notified().await;
			}

			Ok(found)
		})
	}

	fn update_job<'a>(
		&'a self,
		job: &'a CitationJob,
		expected: JobStatus,
	) -> BoxFuture<'a, Result<bool>> {
		self.inner.update_job(job, expected)
	}

	fn set_external_job_id<'a>(
		&'a self,
		job_id: Uuid,
		external_job_id: &'a str,
	) -> BoxFuture<'a, Result<bool>> {
		self.inner.set_external_job_id(job_id, external_job_id)
	}

	fn list_jobs<'a>(&'a self, search_history_id: Uuid) -> BoxFuture<'a, Result<Vec<CitationJob>>> {
		self.inner.list_jobs(search_history_id)
	}

	fn find_job_by_reference<'a>(
		&'a self,
		search_history_id: Uuid,
		reference_number: &'a str,
	) -> BoxFuture<'a, Result<Option<CitationJob>>> {
		self.inner.find_job_by_reference(search_history_id, reference_number)
	}

	fn claim_deep_analysis<'a>(
		&'a self,
		job_id: Uuid,
		placeholder: &'a Value,
	) -> BoxFuture<'a, Result<bool>> {
		self.inner.claim_deep_analysis(job_id, placeholder)
	}

	fn release_deep_analysis<'a>(&'a self, job_id: Uuid) -> BoxFuture<'a, Result<bool>> {
		self.inner.release_deep_analysis(job_id)
	}

	fn save_examiner_analysis<'a>(
		&'a self,
		job_id: Uuid,
		analysis: &'a Value,
	) -> BoxFuture<'a, Result<bool>> {
		self.inner.save_examiner_analysis(job_id, analysis)
	}
}

#[tokio::test]
async fn create_starts_in_created_and_is_never_deduplicated() {
	let harness = Harness::new();
	let first = harness
		.service
		.jobs
		.create(&harness.ctx, harness.create_request(Some(" US1234567B2 ")))
		.await
		.expect("Failed to create job.");
	let second = harness
		.service
		.jobs
		.create(&harness.ctx, harness.create_request(Some("US1234567B2")))
		.await
		.expect("Failed to create job.");

	assert_eq!(first.status, JobStatus::Created);
	assert_eq!(first.filter_reference_number.as_deref(), Some("US1234567B2"));
	assert!(first.raw_result_data.is_none());
	assert!(first.completed_at.is_none());
	assert_eq!(first.deep_analysis_state(), DeepAnalysisState::Absent);
	assert_ne!(first.job_id, second.job_id);
}

#[tokio::test]
async fn create_rejects_empty_inputs_and_bad_threshold() {
	let harness = Harness::new();
	let mut blank = harness.create_request(None);

	blank.search_inputs = vec!["  ".to_string()];

	let err = harness.service.jobs.create(&harness.ctx, blank).await.expect_err("Expected error.");

	assert!(matches!(err, Error::InvalidRequest { .. }));

	let mut out_of_range = harness.create_request(None);

	out_of_range.threshold = Some(1.5);

	let err =
		harness.service.jobs.create(&harness.ctx, out_of_range).await.expect_err("Expected error.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
}

#[tokio::test]
async fn happy_path_reaches_completed_with_results() {
	let harness = Harness::new();
	let job_id = harness.completed_job(None).await;
	let job = harness
		.service
		.jobs
		.get_with_result(&harness.ctx, job_id)
		.await
		.expect("Lookup failed.")
		.expect("Expected job.");

	assert_eq!(job.status, JobStatus::Completed);
	assert!(job.completed_at.is_some());

	let raw = job.raw_result_data.expect("Expected raw results.");

	assert_eq!(raw["matches"][0]["reference_number"], "US1234567B2");
}

#[tokio::test]
async fn terminal_states_are_immutable() {
	let harness = Harness::new();
	let job_id = harness.completed_job(None).await;

	for status in ["RUNNING", "FAILED", "CREATED", "COMPLETED"] {
		let err = harness
			.service
			.jobs
			.update_status(&harness.ctx, job_id, status, None)
			.await
			.expect_err("Expected terminal state to reject updates.");

		assert!(matches!(err, Error::InvalidState { .. }), "Unexpected error for {status}: {err}");
	}

	let failed = harness
		.service
		.jobs
		.create(&harness.ctx, harness.create_request(None))
		.await
		.expect("Failed to create job.");

	harness
		.service
		.jobs
		.fail(&harness.ctx, failed.job_id, "Provider rejected the request.")
		.await
		.expect("Failed to fail job.");

	let err = harness
		.service
		.jobs
		.complete(&harness.ctx, failed.job_id, serde_json::json!({ "matches": [] }))
		.await
		.expect_err("Expected FAILED to be terminal.");

	assert!(matches!(err, Error::InvalidState { .. }));
}

#[tokio::test]
async fn created_cannot_skip_to_completed() {
	let harness = Harness::new();
	let job = harness
		.service
		.jobs
		.create(&harness.ctx, harness.create_request(None))
		.await
		.expect("Failed to create job.");
	let err = harness
		.service
		.jobs
		.update_status(&harness.ctx, job.job_id, "COMPLETED", Some(serde_json::json!({})))
		.await
		.expect_err("Expected CREATED -> COMPLETED to be rejected.");

	assert!(matches!(err, Error::InvalidState { .. }));
}

#[tokio::test]
async fn status_strings_are_case_insensitive_and_validated() {
	let harness = Harness::new();
	let job = harness
		.service
		.jobs
		.create(&harness.ctx, harness.create_request(None))
		.await
		.expect("Failed to create job.");
	let running = harness
		.service
		.jobs
		.update_status(&harness.ctx, job.job_id, "running", None)
		.await
		.expect("Failed to start job.");

	assert_eq!(running.status, JobStatus::Running);

	let err = harness
		.service
		.jobs
		.update_status(&harness.ctx, job.job_id, "paused", None)
		.await
		.expect_err("Expected unknown status to be rejected.");

	assert!(matches!(err, Error::InvalidRequest { .. }));

	let err = harness
		.service
		.jobs
		.update_status(&harness.ctx, job.job_id, "FAILED", Some(serde_json::json!({})))
		.await
		.expect_err("Expected raw results with FAILED to be rejected.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
}

#[tokio::test]
async fn repeated_running_update_is_a_no_op() {
	let harness = Harness::new();
	let job = harness
		.service
		.jobs
		.create(&harness.ctx, harness.create_request(None))
		.await
		.expect("Failed to create job.");
	let first = harness
		.service
		.jobs
		.update_status(&harness.ctx, job.job_id, "RUNNING", None)
		.await
		.expect("Failed to start job.");
	let second = harness
		.service
		.jobs
		.update_status(&harness.ctx, job.job_id, "RUNNING", None)
		.await
		.expect("Repeated RUNNING should succeed.");

	assert_eq!(first, second);
}

#[tokio::test]
async fn created_job_can_fail_directly() {
	let harness = Harness::new();
	let job = harness
		.service
		.jobs
		.create(&harness.ctx, harness.create_request(None))
		.await
		.expect("Failed to create job.");
	let failed = harness
		.service
		.jobs
		.fail(&harness.ctx, job.job_id, "  Upstream quota exceeded.  ")
		.await
		.expect("Failed to fail job.");

	assert_eq!(failed.status, JobStatus::Failed);
	assert_eq!(failed.error_message.as_deref(), Some("Upstream quota exceeded."));
	assert!(failed.completed_at.is_some());
	assert!(failed.raw_result_data.is_none());
}

#[tokio::test]
async fn external_job_id_is_recorded_until_terminal() {
	let harness = Harness::new();
	let job = harness
		.service
		.jobs
		.create(&harness.ctx, harness.create_request(None))
		.await
		.expect("Failed to create job.");
	let assigned = harness
		.service
		.jobs
		.assign_external_job_id(&harness.ctx, job.job_id, "ext-42")
		.await
		.expect("Failed to assign external id.");

	assert_eq!(assigned.external_job_id.as_deref(), Some("ext-42"));
	assert_eq!(assigned.status, JobStatus::Created);

	let err = harness
		.service
		.jobs
		.assign_external_job_id(&harness.ctx, job.job_id, "  ")
		.await
		.expect_err("Expected blank id to be rejected.");

	assert!(matches!(err, Error::InvalidRequest { .. }));

	let completed = harness.completed_job(None).await;
	let err = harness
		.service
		.jobs
		.assign_external_job_id(&harness.ctx, completed, "ext-43")
		.await
		.expect_err("Expected terminal job to reject assignment.");

	assert!(matches!(err, Error::InvalidState { .. }));
}

#[tokio::test]
async fn jobs_are_listed_newest_first() {
	let harness = Harness::new();
	let older = harness
		.service
		.jobs
		.create(&harness.ctx, harness.create_request(None))
		.await
		.expect("Failed to create job.");

	tokio::time::sleep(std::time::Duration::from_millis(5)).await;

	let newer = harness
		.service
		.jobs
		.create(&harness.ctx, harness.create_request(None))
		.await
		.expect("Failed to create job.");
	let listed = harness
		.service
		.jobs
		.list_for_search_history(&harness.ctx, harness.search_history_id)
		.await
		.expect("Failed to list jobs.");
	let ids: Vec<_> = listed.iter().map(|job| job.job_id).collect();

	assert_eq!(ids, vec![newer.job_id, older.job_id]);
}

#[tokio::test]
async fn unknown_job_is_absent() {
	let harness = Harness::new();
	let missing = uuid::Uuid::new_v4();
	let found =
		harness.service.jobs.get_with_result(&harness.ctx, missing).await.expect("Lookup failed.");

	assert!(found.is_none());

	let err = harness
		.service
		.jobs
		.update_status(&harness.ctx, missing, "RUNNING", None)
		.await
		.expect_err("Expected unknown job to be rejected.");

	assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn completion_keeps_external_id_assigned_while_it_was_in_flight() {
	let memory = Arc::new(MemoryJobStore::new());
	let project_id = Uuid::new_v4();
	let search_history_id = Uuid::new_v4();

	memory.register_project(project_id, super::TENANT);
	memory
		.register_search_history(search_history_id, project_id)
		.expect("Failed to register search history.");

	let store = Arc::new(PausingStore::new(memory.clone()));
	let service = Arc::new(CiteService::new(
		&super::test_config(),
		store.clone(),
		memory,
		Arc::new(RecordingDispatcher::default()),
		Arc::new(RecordingSink::default()),
	));
	let ctx = TenantContext::new(super::TENANT);
	let job = service
		.jobs
		.create(
			&ctx,
			cite_service::CreateJobRequest {
				search_history_id,
				filter_reference_number: None,
				search_inputs: vec!["turbine blade cooling channel".to_string()],
				threshold: None,
			},
		)
		.await
		.expect("Failed to create job.");

	service
		.jobs
		.update_status(&ctx, job.job_id, "RUNNING", None)
		.await
		.expect("Failed to start job.");

	store.armed.store(true, Ordering::SeqCst);

	let completing = {
		let service = service.clone();
		let ctx = ctx.clone();
		let job_id = job.job_id;

		tokio::spawn(async move {
			service.jobs.complete(&ctx, job_id, serde_json::json!({ "matches": [] })).await
		})
	};

	store.snapshot_taken.notified().await;

	let assigned = service
		.jobs
		.assign_external_job_id(&ctx, job.job_id, "ext-42")
		.await
		.expect("Failed to assign external id.");

	assert_eq!(assigned.external_job_id.as_deref(), Some("ext-42"));

	store.resume.notify_one();

	let completed = completing
		.await
		.expect("Completion task panicked.")
		.expect("Failed to complete job.");

	assert_eq!(completed.status, JobStatus::Completed);
	assert_eq!(completed.external_job_id.as_deref(), Some("ext-42"));

	let stored = service
		.jobs
		.get_with_result(&ctx, job.job_id)
		.await
		.expect("Failed to load job.")
		.expect("Expected job.");

	assert_eq!(stored.status, JobStatus::Completed);
	assert_eq!(stored.external_job_id.as_deref(), Some("ext-42"));
	assert!(stored.raw_result_data.is_some());
}
