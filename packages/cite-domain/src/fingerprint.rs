use serde::{Deserialize, Serialize};
use serde_json::Value;

const FINGERPRINT_SCHEMA_VERSION: i32 = 1;
const FINGERPRINT_PREFIX_LEN: usize = 12;

/// Cache-relevant subset of a semantic search request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKeyInput {
	/// Order is significant: downstream ranking depends on it.
	pub queries: Vec<String>,
	pub project_id: Option<String>,
	pub filter_cpcs: Option<Vec<String>>,
	pub filter_ipcrs: Option<Vec<String>>,
	pub jurisdiction: Option<String>,
}

/// Derives the cache fingerprint for a search request.
///
/// The fingerprint is a blake3 digest over a canonical JSON payload. Missing and empty
/// filters hash identically, as do missing and blank scoping fields. Query order is kept.
pub fn build(input: &CacheKeyInput) -> String {
	let queries: Vec<&str> = input.queries.iter().map(|query| query.trim()).collect();
	let payload = serde_json::json!({
		"kind": "semantic_search",
		"schema_version": FINGERPRINT_SCHEMA_VERSION,
		"queries": queries,
		"project_id": normalize_scope(input.project_id.as_deref(), false),
		"filter_cpcs": normalize_codes(input.filter_cpcs.as_deref()),
		"filter_ipcrs": normalize_codes(input.filter_ipcrs.as_deref()),
		"jurisdiction": normalize_scope(input.jurisdiction.as_deref(), true),
	});

	// serde_json maps are key-sorted, so the rendered payload is canonical.
	blake3::hash(payload.to_string().as_bytes()).to_hex().to_string()
}

pub fn fingerprint_prefix(fingerprint: &str) -> &str {
	let len = fingerprint.len().min(FINGERPRINT_PREFIX_LEN);

	&fingerprint[..len]
}

fn normalize_scope(value: Option<&str>, uppercase: bool) -> Value {
	match value.map(str::trim).filter(|value| !value.is_empty()) {
		Some(value) if uppercase => Value::String(value.to_ascii_uppercase()),
		Some(value) => Value::String(value.to_string()),
		None => Value::Null,
	}
}

fn normalize_codes(codes: Option<&[String]>) -> Value {
	let codes: Vec<String> = codes
		.unwrap_or_default()
		.iter()
		.map(|code| code.trim())
		.filter(|code| !code.is_empty())
		.map(|code| code.to_ascii_uppercase())
		.collect();

	if codes.is_empty() { Value::Null } else { Value::from(codes) }
}
