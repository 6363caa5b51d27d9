use serde_json::Value;
use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::CitationJobRow};

/// Key that marks a `deep_analysis_json` value as an in-flight claim rather than a result.
pub const QUEUED_MARKER_KEY: &str = "__cite_queued_at";

pub async fn insert_job<'e, E>(executor: E, row: &CitationJobRow) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO citation_jobs (
	job_id,
	search_history_id,
	external_job_id,
	status,
	filter_reference_number,
	search_inputs,
	threshold,
	raw_result_data,
	deep_analysis_json,
	examiner_analysis_json,
	error_message,
	created_at,
	updated_at,
	completed_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
	)
	.bind(row.job_id)
	.bind(row.search_history_id)
	.bind(row.external_job_id.as_deref())
	.bind(row.status.as_str())
	.bind(row.filter_reference_number.as_deref())
	.bind(&row.search_inputs)
	.bind(row.threshold)
	.bind(row.raw_result_data.as_ref())
	.bind(row.deep_analysis_json.as_ref())
	.bind(row.examiner_analysis_json.as_ref())
	.bind(row.error_message.as_deref())
	.bind(row.created_at)
	.bind(row.updated_at)
	.bind(row.completed_at)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn fetch_job<'e, E>(executor: E, job_id: Uuid) -> Result<Option<CitationJobRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, CitationJobRow>("SELECT * FROM citation_jobs WHERE job_id = $1")
		.bind(job_id)
		.fetch_optional(executor)
		.await?;

	Ok(row)
}

pub async fn list_jobs_for_search_history<'e, E>(
	executor: E,
	search_history_id: Uuid,
) -> Result<Vec<CitationJobRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, CitationJobRow>(
		"\
SELECT *
FROM citation_jobs
WHERE search_history_id = $1
ORDER BY created_at DESC, job_id ASC",
	)
	.bind(search_history_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

/// Finds the job of a search history that filtered on `reference_number`, preferring completed
/// jobs and then the most recent one.
pub async fn find_job_by_reference<'e, E>(
	executor: E,
	search_history_id: Uuid,
	reference_number: &str,
) -> Result<Option<CitationJobRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, CitationJobRow>(
		"\
SELECT *
FROM citation_jobs
WHERE search_history_id = $1
	AND lower(btrim(filter_reference_number)) = lower(btrim($2))
ORDER BY (upper(status) = 'COMPLETED') DESC, created_at DESC
LIMIT 1",
	)
	.bind(search_history_id)
	.bind(reference_number)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

/// Writes the lifecycle fields of `row` only if the stored status still matches
/// `expected_status`. Returns `false` when another writer moved the job first.
///
/// `external_job_id` is not part of the lifecycle and is left untouched; see
/// [`set_external_job_id`].
pub async fn update_job_state<'e, E>(
	executor: E,
	row: &CitationJobRow,
	expected_status: &str,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE citation_jobs
SET status = $1,
	raw_result_data = $2,
	error_message = $3,
	completed_at = $4,
	updated_at = $5
WHERE job_id = $6 AND upper(status) = upper($7)",
	)
	.bind(row.status.as_str())
	.bind(row.raw_result_data.as_ref())
	.bind(row.error_message.as_deref())
	.bind(row.completed_at)
	.bind(row.updated_at)
	.bind(row.job_id)
	.bind(expected_status)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Records the provider's job id while the job is still CREATED or RUNNING.
pub async fn set_external_job_id<'e, E>(
	executor: E,
	job_id: Uuid,
	external_job_id: &str,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE citation_jobs
SET external_job_id = $1, updated_at = $2
WHERE job_id = $3 AND upper(status) IN ('CREATED', 'RUNNING')",
	)
	.bind(external_job_id)
	.bind(now)
	.bind(job_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Conditionally marks deep analysis as queued. Only one caller can win for a given job.
pub async fn claim_deep_analysis<'e, E>(
	executor: E,
	job_id: Uuid,
	placeholder: &Value,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE citation_jobs
SET deep_analysis_json = $1, updated_at = $2
WHERE job_id = $3
	AND deep_analysis_json IS NULL
	AND upper(status) = 'COMPLETED'
	AND raw_result_data IS NOT NULL",
	)
	.bind(placeholder)
	.bind(now)
	.bind(job_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Clears a queued placeholder so deep analysis can be requested again. A finished analysis is
/// never cleared.
pub async fn release_deep_analysis<'e, E>(
	executor: E,
	job_id: Uuid,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE citation_jobs
SET deep_analysis_json = NULL, updated_at = $1
WHERE job_id = $2 AND deep_analysis_json ? $3",
	)
	.bind(now)
	.bind(job_id)
	.bind(QUEUED_MARKER_KEY)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn save_deep_analysis<'e, E>(
	executor: E,
	job_id: Uuid,
	analysis: &Value,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"UPDATE citation_jobs SET deep_analysis_json = $1, updated_at = $2 WHERE job_id = $3",
	)
	.bind(analysis)
	.bind(now)
	.bind(job_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn save_examiner_analysis<'e, E>(
	executor: E,
	job_id: Uuid,
	analysis: &Value,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"UPDATE citation_jobs SET examiner_analysis_json = $1, updated_at = $2 WHERE job_id = $3",
	)
	.bind(analysis)
	.bind(now)
	.bind(job_id)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}
