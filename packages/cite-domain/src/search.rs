use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::fingerprint::CacheKeyInput;

/// A semantic search request as received from the API layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchParams {
	pub queries: Vec<String>,
	#[serde(default)]
	pub project_id: Option<String>,
	#[serde(default)]
	pub filter_cpcs: Option<Vec<String>>,
	#[serde(default)]
	pub filter_ipcrs: Option<Vec<String>>,
	#[serde(default)]
	pub jurisdiction: Option<String>,
	/// `Some(false)` bypasses the result cache for this request.
	#[serde(default)]
	pub use_cache: Option<bool>,
	/// Fields forwarded to the provider as-is. They never contribute to the fingerprint.
	#[serde(default, flatten)]
	pub extra: Map<String, Value>,
}
impl SearchParams {
	pub fn cache_enabled(&self) -> bool {
		self.use_cache != Some(false)
	}

	pub fn cache_key_input(&self) -> CacheKeyInput {
		CacheKeyInput {
			queries: self.queries.clone(),
			project_id: self.project_id.clone(),
			filter_cpcs: self.filter_cpcs.clone(),
			filter_ipcrs: self.filter_ipcrs.clone(),
			jurisdiction: self.jurisdiction.clone(),
		}
	}
}

/// Match records and counts returned by a fresh search. Records are provider-defined JSON
/// objects kept in ranking order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResultSet {
	pub results: Vec<Value>,
	pub total_count: u64,
	#[serde(default)]
	pub original_count: u64,
	#[serde(default)]
	pub excluded_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
	pub results: Vec<Value>,
	pub total_count: u64,
	pub original_count: u64,
	pub excluded_count: u64,
	pub from_cache: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub cache_age_minutes: Option<i64>,
}
impl SearchResponse {
	pub fn fresh(result: SearchResultSet) -> Self {
		Self::from_parts(result, false, None)
	}

	pub fn cached(result: SearchResultSet, cache_age_minutes: i64) -> Self {
		Self::from_parts(result, true, Some(cache_age_minutes))
	}

	fn from_parts(result: SearchResultSet, from_cache: bool, cache_age_minutes: Option<i64>) -> Self {
		let SearchResultSet { results, total_count, original_count, excluded_count } = result;

		Self { results, total_count, original_count, excluded_count, from_cache, cache_age_minutes }
	}
}
