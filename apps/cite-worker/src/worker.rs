use std::{sync::Arc, time::Instant};

use color_eyre::{Result, eyre};
use time::{Duration, OffsetDateTime};
use tokio::time as tokio_time;

use cite_domain::status::JobStatus;
use cite_providers::deep_analysis::{self, DeepAnalysisRequest};
use cite_service::{DeepAnalysisState, MetricsAggregator, postgres};
use cite_storage::{db::Db, jobs, models::DeepAnalysisOutboxEntry, outbox};

pub const DEEP_ANALYSIS_OPERATION: &str = "deep_analysis.run";

const MAX_OUTBOX_ERROR_CHARS: usize = 1_024;
const REDACTED_KEYS: [&str; 5] = ["api_key", "apikey", "password", "secret", "token"];

pub struct WorkerState {
	pub db: Db,
	pub provider: cite_config::ProviderConfig,
	pub settings: cite_config::Worker,
	pub metrics: Arc<MetricsAggregator>,
}

pub async fn run_worker(state: WorkerState) -> Result<()> {
	let poll_interval = std::time::Duration::from_millis(state.settings.poll_interval_ms);

	loop {
		if let Err(err) = process_outbox_once(&state).await {
			tracing::error!(error = %err, "Deep analysis outbox processing failed.");
		}

		tokio_time::sleep(poll_interval).await;
	}
}

async fn process_outbox_once(state: &WorkerState) -> Result<()> {
	let now = OffsetDateTime::now_utc();
	let lease = Duration::seconds(state.settings.claim_lease_seconds);
	let Some(entry) = outbox::claim_next(&state.db, now, lease).await? else {
		return Ok(());
	};
	let started = Instant::now();
	let result = handle_entry(state, &entry).await;
	let elapsed_ms = started.elapsed().as_millis() as u64;

	match result {
		Ok(()) => {
			state.metrics.record(DEEP_ANALYSIS_OPERATION, elapsed_ms, true, None);

			outbox::mark_done(&state.db.pool, entry.outbox_id, OffsetDateTime::now_utc()).await?;
		},
		Err(err) => {
			state.metrics.record(DEEP_ANALYSIS_OPERATION, elapsed_ms, false, Some("provider"));

			mark_failed(state, &entry, &err).await?;
		},
	}

	Ok(())
}

async fn handle_entry(state: &WorkerState, entry: &DeepAnalysisOutboxEntry) -> Result<()> {
	let Some(row) = jobs::fetch_job(&state.db.pool, entry.job_id).await? else {
		return Err(eyre::eyre!("Citation job {} no longer exists.", entry.job_id));
	};
	let job = postgres::from_row(row)?;

	if job.status != JobStatus::Completed {
		return Err(eyre::eyre!(
			"Citation job {} is {}, expected COMPLETED.",
			job.job_id,
			job.status
		));
	}
	if job.deep_analysis_state() == DeepAnalysisState::Ready {
		tracing::info!(job_id = %job.job_id, "Deep analysis already stored. Skipping.");

		return Ok(());
	}

	let Some(raw_result_data) = job.raw_result_data.as_ref() else {
		return Err(eyre::eyre!("Citation job {} has no results to analyze.", job.job_id));
	};
	let request = DeepAnalysisRequest {
		job_id: job.job_id,
		search_inputs: &job.search_inputs,
		filter_reference_number: job.filter_reference_number.as_deref(),
		raw_result_data,
	};
	let analysis = deep_analysis::analyze(&state.provider, &request).await?;

	if !jobs::save_deep_analysis(&state.db.pool, job.job_id, &analysis, OffsetDateTime::now_utc())
		.await?
	{
		return Err(eyre::eyre!(
			"Citation job {} vanished before analysis was stored.",
			job.job_id
		));
	}

	tracing::info!(job_id = %job.job_id, outbox_id = %entry.outbox_id, "Deep analysis stored.");

	Ok(())
}

async fn mark_failed(
	state: &WorkerState,
	entry: &DeepAnalysisOutboxEntry,
	err: &color_eyre::Report,
) -> Result<()> {
	let next_attempts = entry.attempts.saturating_add(1);
	let now = OffsetDateTime::now_utc();
	let error_text = sanitize_outbox_error(&err.to_string());

	if next_attempts >= state.settings.max_attempts {
		outbox::mark_dead(&state.db.pool, entry.outbox_id, next_attempts, &error_text, now).await?;
		// Clearing the queued marker lets a caller request deep analysis again.
		jobs::release_deep_analysis(&state.db.pool, entry.job_id, now).await?;

		tracing::error!(
			error = %error_text,
			outbox_id = %entry.outbox_id,
			job_id = %entry.job_id,
			attempts = next_attempts,
			"Deep analysis outbox entry exhausted its attempts."
		);

		return Ok(());
	}

	let backoff = backoff_for_attempt(
		next_attempts,
		state.settings.base_backoff_ms,
		state.settings.max_backoff_ms,
	);

	outbox::mark_failed(
		&state.db.pool,
		entry.outbox_id,
		next_attempts,
		&error_text,
		now + backoff,
		now,
	)
	.await?;

	tracing::error!(
		error = %error_text,
		outbox_id = %entry.outbox_id,
		job_id = %entry.job_id,
		attempts = next_attempts,
		"Deep analysis outbox job failed."
	);

	Ok(())
}

fn backoff_for_attempt(attempt: i32, base_ms: i64, max_ms: i64) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(16);
	let delay = base_ms.saturating_mul(1_i64 << exp);

	Duration::milliseconds(delay.min(max_ms))
}

/// Redacts credentials and bounds the length of an error before it is persisted.
fn sanitize_outbox_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		if REDACTED_KEYS.iter().any(|key| lowered.contains(key))
			&& let Some(sep) = raw.chars().find(|ch| matches!(ch, '=' | ':'))
		{
			let prefix = raw.split(sep).next().unwrap_or(raw);

			word = format!("{prefix}{sep}[REDACTED]");
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_OUTBOX_ERROR_CHARS {
		out = out.chars().take(MAX_OUTBOX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}
