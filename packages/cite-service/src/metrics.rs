use std::{
	collections::{BTreeMap, VecDeque},
	sync::{Arc, Mutex},
	time::{Duration, Instant},
};

use serde::Serialize;
use time::OffsetDateTime;
use tokio::{sync::Notify, task::JoinHandle, time::MissedTickBehavior};

use crate::{BoxFuture, Result};

/// Error kind recorded for failures that carry no classification.
pub const UNKNOWN_ERROR_KIND: &str = "unknown";

// Hard ceiling on buffered samples while no flush is draining the buffer.
const OVERFLOW_FACTOR: usize = 4;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
	pub operation_name: String,
	pub execution_time_ms: u64,
	pub success: bool,
	pub error_kind: Option<String>,
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationStats {
	pub total_calls: u64,
	pub success_rate: f64,
	pub avg_execution_time_ms: f64,
	pub p95_execution_time_ms: u64,
	pub error_kind_counts: BTreeMap<String, u64>,
	#[serde(with = "time::serde::rfc3339")]
	pub last_used: OffsetDateTime,
}

/// Destination of flushed metrics.
pub trait MetricsSink
where
	Self: Send + Sync,
{
	fn flush<'a>(
		&'a self,
		stats: &'a BTreeMap<String, OperationStats>,
		samples: &'a [MetricSample],
	) -> BoxFuture<'a, color_eyre::Result<()>>;
}

/// Emits one structured log event per operation.
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
	fn flush<'a>(
		&'a self,
		stats: &'a BTreeMap<String, OperationStats>,
		samples: &'a [MetricSample],
	) -> BoxFuture<'a, color_eyre::Result<()>> {
		Box::pin(async move {
			for (operation, op) in stats {
				tracing::info!(
					operation = operation.as_str(),
					total_calls = op.total_calls,
					success_rate = op.success_rate,
					avg_execution_time_ms = op.avg_execution_time_ms,
					p95_execution_time_ms = op.p95_execution_time_ms,
					error_kind_counts = ?op.error_kind_counts,
					"Operation metrics."
				);
			}

			tracing::debug!(samples = samples.len(), "Metrics flushed.");

			Ok(())
		})
	}
}

/// Buffers per-call samples and periodically hands aggregated statistics to a sink.
///
/// Flushes are triggered by [`MetricsAggregator::spawn_flush_loop`] on a timer and whenever the
/// buffer reaches capacity. A failed flush puts its samples back at the front of the buffer.
pub struct MetricsAggregator {
	buffer: Mutex<VecDeque<MetricSample>>,
	capacity: usize,
	slow_operation: Duration,
	sink: Arc<dyn MetricsSink>,
	capacity_reached: Notify,
}
impl MetricsAggregator {
	pub fn new(capacity: usize, slow_operation: Duration, sink: Arc<dyn MetricsSink>) -> Self {
		let capacity = capacity.max(1);

		Self {
			buffer: Mutex::new(VecDeque::with_capacity(capacity)),
			capacity,
			slow_operation,
			sink,
			capacity_reached: Notify::new(),
		}
	}

	pub fn from_config(cfg: &cite_config::Metrics, sink: Arc<dyn MetricsSink>) -> Self {
		Self::new(cfg.buffer_capacity, Duration::from_millis(cfg.slow_operation_ms), sink)
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	pub fn buffered(&self) -> usize {
		self.lock_buffer().len()
	}

	pub fn record(
		&self,
		operation_name: &str,
		execution_time_ms: u64,
		success: bool,
		error_kind: Option<&str>,
	) {
		if execution_time_ms > self.slow_operation.as_millis() as u64 {
			tracing::warn!(
				operation = operation_name,
				execution_time_ms,
				threshold_ms = self.slow_operation.as_millis() as u64,
				"Slow operation detected."
			);
		}

		let error_kind = if success {
			None
		} else {
			Some(error_kind.unwrap_or(UNKNOWN_ERROR_KIND).to_string())
		};
		let sample = MetricSample {
			operation_name: operation_name.to_string(),
			execution_time_ms,
			success,
			error_kind,
			timestamp: OffsetDateTime::now_utc(),
		};
		let len = {
			let mut buffer = self.lock_buffer();

			buffer.push_back(sample);

			while buffer.len() > self.capacity.saturating_mul(OVERFLOW_FACTOR) {
				buffer.pop_front();
			}

			buffer.len()
		};

		if len >= self.capacity {
			self.capacity_reached.notify_one();
		}
	}

	/// Records the outcome of an operation that started at `started`.
	pub fn observe<T>(&self, operation_name: &str, started: Instant, outcome: &Result<T>) {
		let elapsed_ms = started.elapsed().as_millis() as u64;

		match outcome {
			Ok(_) => self.record(operation_name, elapsed_ms, true, None),
			Err(err) => self.record(operation_name, elapsed_ms, false, Some(err.kind())),
		}
	}

	/// Aggregates the samples buffered so far without draining them.
	pub fn snapshot(&self) -> BTreeMap<String, OperationStats> {
		let samples: Vec<MetricSample> = self.lock_buffer().iter().cloned().collect();

		aggregate(&samples)
	}

	/// Drains the buffer into the sink. Returns the number of samples delivered; on sink failure
	/// the samples are re-buffered and `0` is returned.
	pub async fn flush(&self) -> usize {
		let samples: Vec<MetricSample> = self.lock_buffer().drain(..).collect();

		if samples.is_empty() {
			return 0;
		}

		let stats = aggregate(&samples);

		match self.sink.flush(&stats, &samples).await {
			Ok(()) => samples.len(),
			Err(err) => {
				tracing::warn!(
					error = %err,
					samples = samples.len(),
					"Metrics flush failed. Samples re-buffered."
				);

				self.requeue(samples);

				0
			},
		}
	}

	/// Flushes every `interval` and whenever the buffer fills up.
	pub fn spawn_flush_loop(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);

			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			// The first tick completes immediately.
			ticker.tick().await;

			loop {
				tokio::select! {
					_ = ticker.tick() => {},
					_ = self.capacity_reached.notified() => {},
				}

				self.flush().await;
			}
		})
	}

	fn requeue(&self, samples: Vec<MetricSample>) {
		let mut buffer = self.lock_buffer();

		for sample in samples.into_iter().rev() {
			buffer.push_front(sample);
		}
		while buffer.len() > self.capacity {
			buffer.pop_front();
		}
	}

	fn lock_buffer(&self) -> std::sync::MutexGuard<'_, VecDeque<MetricSample>> {
		self.buffer.lock().unwrap_or_else(|err| err.into_inner())
	}
}

/// Groups samples by operation name and computes per-operation statistics.
pub fn aggregate(samples: &[MetricSample]) -> BTreeMap<String, OperationStats> {
	let mut grouped: BTreeMap<&str, Vec<&MetricSample>> = BTreeMap::new();

	for sample in samples {
		grouped.entry(sample.operation_name.as_str()).or_default().push(sample);
	}

	grouped
		.into_iter()
		.filter_map(|(operation, group)| {
			let last_used = group.iter().map(|sample| sample.timestamp).max()?;
			let total_calls = group.len() as u64;
			let successes = group.iter().filter(|sample| sample.success).count() as u64;
			let mut times: Vec<u64> = group.iter().map(|sample| sample.execution_time_ms).collect();

			times.sort_unstable();

			let sum: u64 = times.iter().sum();
			let mut error_kind_counts = BTreeMap::new();

			for sample in group.iter().filter(|sample| !sample.success) {
				let kind = sample.error_kind.as_deref().unwrap_or(UNKNOWN_ERROR_KIND);

				*error_kind_counts.entry(kind.to_string()).or_insert(0) += 1;
			}

			Some((
				operation.to_string(),
				OperationStats {
					total_calls,
					success_rate: successes as f64 / total_calls as f64,
					avg_execution_time_ms: sum as f64 / total_calls as f64,
					p95_execution_time_ms: p95(&times),
					error_kind_counts,
					last_used,
				},
			))
		})
		.collect()
}

/// Nearest-rank p95 over ascending `sorted`: the element at `floor(n * 0.95)`, clamped to the
/// last index. Empty input yields `0`.
pub fn p95(sorted: &[u64]) -> u64 {
	if sorted.is_empty() {
		return 0;
	}

	let index = (sorted.len() * 95 / 100).min(sorted.len() - 1);

	sorted[index]
}
