pub mod worker;

use std::{sync::Arc, time::Duration};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cite_service::{MetricsAggregator, TracingMetricsSink};
use cite_storage::db::Db;

#[derive(Debug, Parser)]
#[command(
	version = cite_cli::VERSION,
	rename_all = "kebab",
	styles = cite_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: std::path::PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = cite_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let metrics =
		Arc::new(MetricsAggregator::from_config(&config.metrics, Arc::new(TracingMetricsSink)));
	let flush_loop = metrics
		.clone()
		.spawn_flush_loop(Duration::from_millis(config.metrics.flush_interval_ms));
	let state = worker::WorkerState {
		db,
		provider: config.providers.deep_analysis,
		settings: config.worker,
		metrics,
	};

	tracing::info!(
		provider_id = state.provider.provider_id.as_str(),
		"Deep analysis worker started."
	);

	let result = worker::run_worker(state).await;

	flush_loop.abort();

	result
}
