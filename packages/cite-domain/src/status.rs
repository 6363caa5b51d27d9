use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a citation job.
///
/// Deep analysis is not a state: it is an orthogonal result attached to a job once it reaches
/// [`JobStatus::Completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
	Created,
	Running,
	Completed,
	Failed,
}
impl JobStatus {
	pub const ALL: [Self; 4] = [Self::Created, Self::Running, Self::Completed, Self::Failed];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Created => "CREATED",
			Self::Running => "RUNNING",
			Self::Completed => "COMPLETED",
			Self::Failed => "FAILED",
		}
	}

	/// Parses a stored or caller-supplied status. Matching is case-insensitive because rows written
	/// by older clients carry lowercase values.
	pub fn parse(raw: &str) -> Option<Self> {
		let trimmed = raw.trim();

		Self::ALL.into_iter().find(|status| status.as_str().eq_ignore_ascii_case(trimmed))
	}

	pub fn is_terminal(self) -> bool {
		matches!(self, Self::Completed | Self::Failed)
	}

	/// Same-state updates are accepted for non-terminal states so that repeated provider
	/// callbacks stay harmless.
	pub fn can_transition_to(self, next: Self) -> bool {
		match (self, next) {
			(Self::Created, Self::Created | Self::Running | Self::Failed) => true,
			(Self::Running, Self::Running | Self::Completed | Self::Failed) => true,
			_ => false,
		}
	}
}
impl fmt::Display for JobStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
