pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Invalid state: {message}")]
	InvalidState { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<cite_storage::Error> for Error {
	fn from(err: cite_storage::Error) -> Self {
		match err {
			cite_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			cite_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			cite_storage::Error::NotFound(message) => Self::NotFound { message },
			cite_storage::Error::Conflict(message) => Self::InvalidState { message },
		}
	}
}

impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl Error {
	/// Short stable label used as the error kind in operation metrics.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::InvalidRequest { .. } => "invalid_request",
			Self::NotFound { .. } => "not_found",
			Self::InvalidState { .. } => "invalid_state",
			Self::Provider { .. } => "provider",
			Self::Storage { .. } => "storage",
		}
	}
}
