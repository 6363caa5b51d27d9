use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CitationJobRow {
	pub job_id: Uuid,
	pub search_history_id: Uuid,
	pub external_job_id: Option<String>,
	/// Stored verbatim. Older rows may carry lowercase values.
	pub status: String,
	pub filter_reference_number: Option<String>,
	pub search_inputs: Value,
	pub threshold: Option<f32>,
	pub raw_result_data: Option<Value>,
	pub deep_analysis_json: Option<Value>,
	pub examiner_analysis_json: Option<Value>,
	pub error_message: Option<String>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
	pub completed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeepAnalysisOutboxEntry {
	pub outbox_id: Uuid,
	pub job_id: Uuid,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
