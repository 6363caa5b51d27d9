use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};

use cite_service::{Error, MetricsAggregator, ResultCache, SearchOrchestrator, TracingMetricsSink};

use super::{CountingExecutor, FailingExecutor, FaultyCache, Harness, ReadOnlyCache};

#[tokio::test]
async fn second_identical_search_is_served_from_cache() {
	let harness = Harness::new();
	let executor = CountingExecutor::new(super::result_set(&["US1", "EP2"]));
	let params = super::search_params(&["lithium anode coating"]);
	let first = harness.service.search.execute(&params, &executor).await.expect("Search failed.");
	let second = harness.service.search.execute(&params, &executor).await.expect("Search failed.");

	assert!(!first.from_cache);
	assert_eq!(first.cache_age_minutes, None);
	assert!(second.from_cache);
	assert_eq!(second.cache_age_minutes, Some(0));
	assert_eq!(second.results, first.results);
	assert_eq!(second.total_count, 2);
	assert_eq!(executor.calls(), 1);

	let stats = harness.service.cache.stats();

	assert_eq!(stats.total_entries, 1);
	assert_eq!(stats.hits, 1);
	assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn normalized_filters_and_passthrough_fields_share_a_cache_entry() {
	let harness = Harness::new();
	let executor = CountingExecutor::new(super::result_set(&["US1"]));
	let mut first = super::search_params(&["anode", "cathode"]);
	let mut second = super::search_params(&[" anode", "cathode "]);

	first.filter_cpcs = Some(vec!["h01m".to_string(), "H01M 10/05".to_string()]);
	first.jurisdiction = Some("us".to_string());
	second.filter_cpcs = Some(vec![" H01M".to_string(), "h01m 10/05".to_string(), "".to_string()]);
	second.filter_ipcrs = Some(Vec::new());
	second.jurisdiction = Some("US".to_string());
	second.extra.insert("page_size".to_string(), serde_json::json!(50));

	harness.service.search.execute(&first, &executor).await.expect("Search failed.");

	let cached = harness.service.search.execute(&second, &executor).await.expect("Search failed.");

	assert!(cached.from_cache);
	assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn query_order_is_part_of_the_key() {
	let harness = Harness::new();
	let executor = CountingExecutor::new(super::result_set(&["US1"]));

	harness
		.service
		.search
		.execute(&super::search_params(&["anode", "cathode"]), &executor)
		.await
		.expect("Search failed.");

	let response = harness
		.service
		.search
		.execute(&super::search_params(&["cathode", "anode"]), &executor)
		.await
		.expect("Search failed.");

	assert!(!response.from_cache);
	assert_eq!(executor.calls(), 2);
}

#[tokio::test]
async fn different_scope_is_a_different_entry() {
	let harness = Harness::new();
	let executor = CountingExecutor::new(super::result_set(&["US1"]));
	let first = super::search_params(&["anode"]);
	let mut second = super::search_params(&["anode"]);

	second.jurisdiction = Some("EP".to_string());

	harness.service.search.execute(&first, &executor).await.expect("Search failed.");

	let response = harness.service.search.execute(&second, &executor).await.expect("Search failed.");

	assert!(!response.from_cache);
	assert_eq!(executor.calls(), 2);
	assert_eq!(harness.service.cache.stats().total_entries, 2);
}

#[tokio::test]
async fn use_cache_false_bypasses_read_and_write() {
	let harness = Harness::new();
	let executor = CountingExecutor::new(super::result_set(&["US1"]));
	let mut params = super::search_params(&["anode"]);

	params.use_cache = Some(false);

	for _ in 0..2 {
		let response =
			harness.service.search.execute(&params, &executor).await.expect("Search failed.");

		assert!(!response.from_cache);
	}

	assert_eq!(executor.calls(), 2);
	assert_eq!(harness.service.cache.stats().total_entries, 0);
}

#[tokio::test]
async fn failed_search_is_not_cached() {
	let harness = Harness::new();
	let failing = FailingExecutor { calls: AtomicUsize::new(0) };
	let params = super::search_params(&["anode"]);
	let err = harness
		.service
		.search
		.execute(&params, &failing)
		.await
		.expect_err("Expected provider failure.");

	assert!(matches!(err, Error::Provider { .. }));
	assert_eq!(harness.service.cache.stats().total_entries, 0);

	let executor = CountingExecutor::new(super::result_set(&["US1"]));
	let response = harness.service.search.execute(&params, &executor).await.expect("Search failed.");

	assert!(!response.from_cache);
	assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn cache_faults_fall_through_to_fresh_search() {
	let cache = Arc::new(FaultyCache { writes: AtomicUsize::new(0) });
	let metrics = Arc::new(MetricsAggregator::new(
		100,
		std::time::Duration::from_secs(5),
		Arc::new(TracingMetricsSink),
	));
	let orchestrator = SearchOrchestrator::new(cache.clone(), metrics.clone());
	let executor = CountingExecutor::new(super::result_set(&["US1"]));
	let params = super::search_params(&["anode"]);

	for _ in 0..2 {
		let response = orchestrator.execute(&params, &executor).await.expect("Search failed.");

		assert!(!response.from_cache);
	}

	assert_eq!(executor.calls(), 2);
	assert_eq!(cache.writes.load(Ordering::SeqCst), 0, "Write-back is skipped after a read fault.");

	let stats = metrics.snapshot();

	assert_eq!(stats["semantic_search"].total_calls, 2);
	assert!((stats["semantic_search"].success_rate - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn failed_cache_write_still_returns_fresh_result() {
	let cache = Arc::new(ReadOnlyCache::default());
	let metrics = Arc::new(MetricsAggregator::new(
		100,
		std::time::Duration::from_secs(5),
		Arc::new(TracingMetricsSink),
	));
	let orchestrator = SearchOrchestrator::new(cache.clone(), metrics.clone());
	let executor = CountingExecutor::new(super::result_set(&["US1", "US2", "EP3", "JP4", "CN5"]));
	let params = super::search_params(&["anode"]);
	let response = orchestrator.execute(&params, &executor).await.expect("Search failed.");

	assert!(!response.from_cache);
	assert_eq!(response.cache_age_minutes, None);
	assert_eq!(response.total_count, 5);
	assert_eq!(response.results.len(), 5);
	assert_eq!(executor.calls(), 1);
	assert_eq!(cache.lookups.load(Ordering::SeqCst), 1);
	assert_eq!(cache.writes.load(Ordering::SeqCst), 1);

	let stats = metrics.snapshot();

	assert_eq!(stats["semantic_search"].total_calls, 1);
	assert!((stats["semantic_search"].success_rate - 1.0).abs() < f64::EPSILON);
	assert!(stats["semantic_search"].error_kind_counts.is_empty());
}

#[tokio::test]
async fn disabled_caching_ignores_the_cache() {
	let mut cfg = super::test_config();

	cfg.cache.enabled = false;

	let harness = Harness::with_config(cfg);
	let executor = CountingExecutor::new(super::result_set(&["US1"]));
	let params = super::search_params(&["anode"]);

	harness.service.search.execute(&params, &executor).await.expect("Search failed.");
	harness.service.search.execute(&params, &executor).await.expect("Search failed.");

	assert_eq!(executor.calls(), 2);
	assert_eq!(harness.service.cache.stats().total_entries, 0);
}

#[tokio::test]
async fn searches_are_recorded_in_metrics() {
	let harness = Harness::new();
	let executor = CountingExecutor::new(super::result_set(&["US1"]));
	let failing = FailingExecutor { calls: AtomicUsize::new(0) };
	let params = super::search_params(&["anode"]);
	let other = super::search_params(&["cathode"]);

	harness.service.search.execute(&params, &executor).await.expect("Search failed.");
	let _ = harness.service.search.execute(&other, &failing).await;

	let stats = harness.service.metrics.snapshot();
	let search = &stats["semantic_search"];

	assert_eq!(search.total_calls, 2);
	assert!((search.success_rate - 0.5).abs() < f64::EPSILON);
	assert_eq!(search.error_kind_counts.get("provider"), Some(&1));
}

#[test]
fn standalone_cache_honors_configured_ttl() {
	let cache = ResultCache::from_config(&cite_config::Cache {
		enabled: true,
		ttl_seconds: 120,
		purge_interval_seconds: None,
	});

	assert_eq!(cache.default_ttl(), std::time::Duration::from_secs(120));
}
