use serde::{Serialize, Serializer};

/// Job state as reported by the scheduler's accounting tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Other(String),
}

impl JobState {
    /// Parse an accounting state string. `CANCELLED` may carry a
    /// `by <uid>` suffix which is folded into the plain state.
    pub fn parse(s: &str) -> Self {
        let state = s.trim().to_uppercase();
        match state.as_str() {
            "PENDING" => JobState::Pending,
            "RUNNING" => JobState::Running,
            "COMPLETED" => JobState::Completed,
            "FAILED" => JobState::Failed,
            _ if state.starts_with("CANCELLED") => JobState::Cancelled,
            _ => JobState::Other(state),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Completed => "COMPLETED",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
            JobState::Other(s) => s,
        }
    }

    /// Terminal states are never re-annotated with an owner.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for JobState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl Default for JobState {
    fn default() -> Self {
        JobState::Other("UNKNOWN".to_string())
    }
}

/// Internal batch step merged into its parent job, never exposed standalone.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStep {
    pub job_id: String,
    pub job_name: String,
    pub start: String,
    pub end: String,
    pub state: JobState,
    pub exit_code: String,
    pub node: Option<String>,
}

/// A job as observed through the accounting query.
///
/// Created implicitly when the scheduler accepts a submission; after that it
/// is only ever re-derived from `sacct` output, never written directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,
    pub job_name: String,
    pub start: String,
    pub end: String,
    pub partition: String,
    pub cpu_request: u32,
    pub gpu_request: u32,
    pub memory_request: f64,
    pub state: JobState,
    pub exit_code: String,
    /// Recovered from the free-text comment annotation attached at submission.
    pub owner: Option<String>,
    pub node: Option<String>,
    pub node_ip: String,
    pub download_link: String,
    pub batch_step: Option<BatchStep>,
}
