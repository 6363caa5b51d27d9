use sqlx::PgExecutor;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Result, db::Db, models::DeepAnalysisOutboxEntry};

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_FAILED: &str = "FAILED";
pub const STATUS_DONE: &str = "DONE";
pub const STATUS_DEAD: &str = "DEAD";

pub async fn enqueue_deep_analysis<'e, E>(
	executor: E,
	job_id: Uuid,
	now: OffsetDateTime,
) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	let outbox_id = Uuid::new_v4();

	sqlx::query(
		"\
INSERT INTO deep_analysis_outbox (
	outbox_id,
	job_id,
	status,
	attempts,
	available_at,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, 0, $4, $4, $4)",
	)
	.bind(outbox_id)
	.bind(job_id)
	.bind(STATUS_PENDING)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(outbox_id)
}

/// Claims the next available entry and pushes its `available_at` forward by `lease` so other
/// workers skip it while it is processed.
pub async fn claim_next(
	db: &Db,
	now: OffsetDateTime,
	lease: Duration,
) -> Result<Option<DeepAnalysisOutboxEntry>> {
	let mut tx = db.pool.begin().await?;
	let row = sqlx::query_as::<_, DeepAnalysisOutboxEntry>(
		"\
SELECT *
FROM deep_analysis_outbox
WHERE status IN ('PENDING', 'FAILED') AND available_at <= $1
ORDER BY available_at ASC
LIMIT 1
FOR UPDATE SKIP LOCKED",
	)
	.bind(now)
	.fetch_optional(&mut *tx)
	.await?;
	let entry = if let Some(mut entry) = row {
		let lease_until = now + lease;

		sqlx::query(
			"UPDATE deep_analysis_outbox SET available_at = $1, updated_at = $2 WHERE outbox_id = $3",
		)
		.bind(lease_until)
		.bind(now)
		.bind(entry.outbox_id)
		.execute(&mut *tx)
		.await?;

		entry.available_at = lease_until;
		entry.updated_at = now;

		Some(entry)
	} else {
		None
	};

	tx.commit().await?;

	Ok(entry)
}

pub async fn mark_done<'e, E>(executor: E, outbox_id: Uuid, now: OffsetDateTime) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("UPDATE deep_analysis_outbox SET status = $1, updated_at = $2 WHERE outbox_id = $3")
		.bind(STATUS_DONE)
		.bind(now)
		.bind(outbox_id)
		.execute(executor)
		.await?;

	Ok(())
}

pub async fn mark_failed<'e, E>(
	executor: E,
	outbox_id: Uuid,
	attempts: i32,
	last_error: &str,
	available_at: OffsetDateTime,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE deep_analysis_outbox
SET status = $1,
	attempts = $2,
	last_error = $3,
	available_at = $4,
	updated_at = $5
WHERE outbox_id = $6",
	)
	.bind(STATUS_FAILED)
	.bind(attempts)
	.bind(last_error)
	.bind(available_at)
	.bind(now)
	.bind(outbox_id)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn mark_dead<'e, E>(
	executor: E,
	outbox_id: Uuid,
	attempts: i32,
	last_error: &str,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE deep_analysis_outbox
SET status = $1, attempts = $2, last_error = $3, updated_at = $4
WHERE outbox_id = $5",
	)
	.bind(STATUS_DEAD)
	.bind(attempts)
	.bind(last_error)
	.bind(now)
	.bind(outbox_id)
	.execute(executor)
	.await?;

	Ok(())
}
