//! Ownership chain lookups: citation job -> search history -> project -> tenant.

use sqlx::PgExecutor;
use uuid::Uuid;

use crate::Result;

pub async fn insert_project<'e, E>(
	executor: E,
	project_id: Uuid,
	tenant_id: &str,
	name: &str,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("INSERT INTO projects (project_id, tenant_id, name) VALUES ($1, $2, $3)")
		.bind(project_id)
		.bind(tenant_id)
		.bind(name)
		.execute(executor)
		.await?;

	Ok(())
}

pub async fn insert_search_history<'e, E>(
	executor: E,
	search_history_id: Uuid,
	project_id: Uuid,
	query: &str,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"INSERT INTO search_histories (search_history_id, project_id, query) VALUES ($1, $2, $3)",
	)
	.bind(search_history_id)
	.bind(project_id)
	.bind(query)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn search_history_tenant<'e, E>(
	executor: E,
	search_history_id: Uuid,
) -> Result<Option<String>>
where
	E: PgExecutor<'e>,
{
	let tenant_id: Option<String> = sqlx::query_scalar(
		"\
SELECT p.tenant_id
FROM search_histories sh
JOIN projects p ON p.project_id = sh.project_id
WHERE sh.search_history_id = $1",
	)
	.bind(search_history_id)
	.fetch_optional(executor)
	.await?;

	Ok(tenant_id)
}

pub async fn job_tenant<'e, E>(executor: E, job_id: Uuid) -> Result<Option<String>>
where
	E: PgExecutor<'e>,
{
	let tenant_id: Option<String> = sqlx::query_scalar(
		"\
SELECT p.tenant_id
FROM citation_jobs j
JOIN search_histories sh ON sh.search_history_id = j.search_history_id
JOIN projects p ON p.project_id = sh.project_id
WHERE j.job_id = $1",
	)
	.bind(job_id)
	.fetch_optional(executor)
	.await?;

	Ok(tenant_id)
}
