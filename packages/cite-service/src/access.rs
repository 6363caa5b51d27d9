use uuid::Uuid;

use crate::{Error, Result, TenantContext, TenantResolver};

pub(crate) fn validate_context(ctx: &TenantContext) -> Result<()> {
	if ctx.tenant_id.trim().is_empty() {
		return Err(Error::InvalidRequest { message: "tenant_id must be non-empty.".to_string() });
	}

	Ok(())
}

pub(crate) async fn job_visible(
	tenants: &dyn TenantResolver,
	ctx: &TenantContext,
	job_id: Uuid,
) -> Result<bool> {
	validate_context(ctx)?;

	let owner = tenants.job_tenant(job_id).await?;

	Ok(owner.is_some_and(|tenant_id| tenant_id == ctx.tenant_id))
}

/// Unknown jobs and jobs owned by another tenant are reported identically.
pub(crate) async fn ensure_job_access(
	tenants: &dyn TenantResolver,
	ctx: &TenantContext,
	job_id: Uuid,
) -> Result<()> {
	if !job_visible(tenants, ctx, job_id).await? {
		return Err(Error::NotFound { message: format!("Citation job {job_id} not found.") });
	}

	Ok(())
}

pub(crate) async fn ensure_search_history_access(
	tenants: &dyn TenantResolver,
	ctx: &TenantContext,
	search_history_id: Uuid,
) -> Result<()> {
	validate_context(ctx)?;

	let owner = tenants.search_history_tenant(search_history_id).await?;

	if !owner.is_some_and(|tenant_id| tenant_id == ctx.tenant_id) {
		return Err(Error::NotFound {
			message: format!("Search history {search_history_id} not found."),
		});
	}

	Ok(())
}
