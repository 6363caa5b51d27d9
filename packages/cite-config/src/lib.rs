mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Cache, Config, Metrics, Postgres, ProviderConfig, Providers, Service, Storage, Worker};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}

	for (label, provider) in
		[("search", &cfg.providers.search), ("deep_analysis", &cfg.providers.deep_analysis)]
	{
		if provider.api_base.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_base must be non-empty."),
			});
		}
		if provider.api_key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
		if provider.timeout_ms == 0 {
			return Err(Error::Validation {
				message: format!("Provider {label} timeout_ms must be greater than zero."),
			});
		}
		if provider.default_headers.values().any(|value| !value.is_string()) {
			return Err(Error::Validation {
				message: format!("Provider {label} default_headers values must be strings."),
			});
		}
	}

	if cfg.cache.ttl_seconds == 0 {
		return Err(Error::Validation {
			message: "cache.ttl_seconds must be greater than zero.".to_string(),
		});
	}

	if let Some(interval) = cfg.cache.purge_interval_seconds
		&& interval == 0
	{
		return Err(Error::Validation {
			message: "cache.purge_interval_seconds must be greater than zero.".to_string(),
		});
	}

	if cfg.metrics.buffer_capacity == 0 {
		return Err(Error::Validation {
			message: "metrics.buffer_capacity must be greater than zero.".to_string(),
		});
	}
	if cfg.metrics.flush_interval_ms == 0 {
		return Err(Error::Validation {
			message: "metrics.flush_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.metrics.slow_operation_ms == 0 {
		return Err(Error::Validation {
			message: "metrics.slow_operation_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "worker.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.claim_lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "worker.claim_lease_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.base_backoff_ms <= 0 {
		return Err(Error::Validation {
			message: "worker.base_backoff_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.worker.max_backoff_ms < cfg.worker.base_backoff_ms {
		return Err(Error::Validation {
			message: "worker.max_backoff_ms must be at least worker.base_backoff_ms.".to_string(),
		});
	}
	if cfg.worker.max_attempts <= 0 {
		return Err(Error::Validation {
			message: "worker.max_attempts must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.service.log_level = cfg.service.log_level.trim().to_string();

	for provider in [&mut cfg.providers.search, &mut cfg.providers.deep_analysis] {
		let trimmed = provider.api_base.trim().trim_end_matches('/');

		provider.api_base = trimmed.to_string();
	}
}
