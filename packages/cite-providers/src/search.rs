use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

use cite_domain::search::{SearchParams, SearchResultSet};

/// Runs a fresh semantic search against the configured provider.
///
/// Request timeouts surface as errors; the caller must not cache anything on failure.
pub async fn execute(
	cfg: &cite_config::ProviderConfig,
	params: &SearchParams,
) -> Result<SearchResultSet> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let body = serde_json::json!({
		"queries": params.queries,
		"project_id": params.project_id,
		"filter_cpcs": params.filter_cpcs,
		"filter_ipcrs": params.filter_ipcrs,
		"jurisdiction": params.jurisdiction,
		"options": params.extra,
	});
	let res = client
		.post(crate::endpoint(cfg))
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_search_response(json)
}

fn parse_search_response(json: Value) -> Result<SearchResultSet> {
	let results = json
		.get("results")
		.or_else(|| json.get("data"))
		.and_then(|v| v.as_array())
		.ok_or_else(|| eyre::eyre!("Search response is missing results array."))?
		.clone();
	let total_count = count_field(&json, "total_count", "totalCount").unwrap_or(results.len() as u64);
	let original_count = count_field(&json, "original_count", "originalCount").unwrap_or(total_count);
	let excluded_count = count_field(&json, "excluded_count", "excludedCount").unwrap_or(0);

	Ok(SearchResultSet { results, total_count, original_count, excluded_count })
}

fn count_field(json: &Value, snake: &str, camel: &str) -> Option<u64> {
	json.get(snake).or_else(|| json.get(camel)).and_then(|v| v.as_u64())
}
