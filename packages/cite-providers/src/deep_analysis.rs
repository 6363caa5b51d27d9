use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct DeepAnalysisRequest<'a> {
	pub job_id: Uuid,
	pub search_inputs: &'a [String],
	pub filter_reference_number: Option<&'a str>,
	pub raw_result_data: &'a Value,
}

/// Requests a deep analysis of a completed citation job and returns the provider's analysis
/// document.
pub async fn analyze(
	cfg: &cite_config::ProviderConfig,
	request: &DeepAnalysisRequest<'_>,
) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let res = client
		.post(crate::endpoint(cfg))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(request)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_analysis_response(json)
}

fn parse_analysis_response(json: Value) -> Result<Value> {
	let analysis = match json {
		Value::Object(mut map) => match map.remove("analysis") {
			Some(inner) => inner,
			None => Value::Object(map),
		},
		_ => return Err(eyre::eyre!("Deep analysis response must be a JSON object.")),
	};

	if !analysis.is_object() {
		return Err(eyre::eyre!("Deep analysis payload must be a JSON object."));
	}

	Ok(analysis)
}
