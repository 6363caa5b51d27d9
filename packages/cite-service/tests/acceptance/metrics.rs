use std::{
	sync::{Arc, atomic::Ordering},
	time::Duration,
};

use cite_service::MetricsAggregator;

use super::RecordingSink;

async fn wait_for_flushes(sink: &RecordingSink, expected: usize) {
	for _ in 0..200 {
		if sink.flush_count() >= expected {
			return;
		}

		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	panic!("Timed out waiting for {expected} metrics flush(es).");
}

#[tokio::test]
async fn full_buffer_triggers_a_flush() {
	let sink = Arc::new(RecordingSink::default());
	let metrics = Arc::new(MetricsAggregator::new(3, Duration::from_secs(5), sink.clone()));
	let handle = metrics.clone().spawn_flush_loop(Duration::from_secs(3_600));

	for ms in [10, 20, 30] {
		metrics.record("semantic_search", ms, true, None);
	}

	wait_for_flushes(&sink, 1).await;
	handle.abort();

	let flushes = sink.flushes.lock().expect("Sink lock poisoned.");
	let stats = &flushes[0]["semantic_search"];

	assert_eq!(stats.total_calls, 3);
	assert_eq!(stats.p95_execution_time_ms, 30);
	assert!((stats.avg_execution_time_ms - 20.0).abs() < f64::EPSILON);
	assert_eq!(sink.delivered.load(Ordering::SeqCst), 3);
	assert_eq!(metrics.buffered(), 0);
}

#[tokio::test]
async fn interval_flushes_a_partial_buffer() {
	let sink = Arc::new(RecordingSink::default());
	let metrics = Arc::new(MetricsAggregator::new(100, Duration::from_secs(5), sink.clone()));
	let handle = metrics.clone().spawn_flush_loop(Duration::from_millis(20));

	metrics.record("citation_job.create", 4, false, Some("invalid_request"));

	wait_for_flushes(&sink, 1).await;
	handle.abort();

	let flushes = sink.flushes.lock().expect("Sink lock poisoned.");
	let stats = &flushes[0]["citation_job.create"];

	assert_eq!(stats.total_calls, 1);
	assert_eq!(stats.success_rate, 0.0);
	assert_eq!(stats.error_kind_counts.get("invalid_request"), Some(&1));
}

#[tokio::test]
async fn failed_flush_keeps_samples_for_the_next_attempt() {
	let sink = Arc::new(RecordingSink::default());
	let metrics = MetricsAggregator::new(10, Duration::from_secs(5), sink.clone());

	sink.fail.store(true, Ordering::SeqCst);
	metrics.record("semantic_search", 12, true, None);
	metrics.record("semantic_search", 18, true, None);

	assert_eq!(metrics.flush().await, 0);
	assert_eq!(metrics.buffered(), 2);

	sink.fail.store(false, Ordering::SeqCst);

	assert_eq!(metrics.flush().await, 2);
	assert_eq!(metrics.buffered(), 0);
	assert_eq!(sink.delivered.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn repeated_flush_failures_drop_the_oldest_samples() {
	let sink = Arc::new(RecordingSink::default());
	let metrics = MetricsAggregator::new(3, Duration::from_secs(5), sink.clone());

	sink.fail.store(true, Ordering::SeqCst);

	for i in 0..5 {
		metrics.record(&format!("op-{i}"), 1, true, None);
	}

	assert_eq!(metrics.flush().await, 0);
	assert_eq!(metrics.buffered(), metrics.capacity());

	let kept: Vec<String> = metrics.snapshot().into_keys().collect();

	assert_eq!(kept, vec!["op-2".to_string(), "op-3".to_string(), "op-4".to_string()]);
}

#[tokio::test]
async fn flushing_an_empty_buffer_is_a_no_op() {
	let sink = Arc::new(RecordingSink::default());
	let metrics = MetricsAggregator::new(3, Duration::from_secs(5), sink.clone());

	assert_eq!(metrics.flush().await, 0);
	assert_eq!(sink.flush_count(), 0);
}
