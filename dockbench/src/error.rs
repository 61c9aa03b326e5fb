use thiserror::Error;

/// Invalid run configuration, detected before any worker is launched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("worker count must be positive")]
    NoWorkers,
    #[error("rate must be a finite, non-negative number of operations per second, got {0}")]
    InvalidRate(f64),
    #[error("burst capacity must be positive")]
    NoBurst,
    #[error("finite-input mode needs at least one target")]
    NoTargets,
    #[error("at least one rate threshold is required")]
    NoThresholds,
    #[error("rate threshold {0} is outside (0, 1)")]
    InvalidThreshold(f64),
}

/// Failure reported by the container runtime backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("no such container: {0}")]
    NotFound(String),
    #[error("container {id} is in the wrong state: {reason}")]
    Conflict { id: String, reason: String },
    #[error("runtime unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a single operation invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("operation requires a target")]
    MissingTarget,
    #[error("no containers to pick a target from")]
    NoCandidates,
    #[error("{0}")]
    Failed(String),
}

/// Reasons a whole benchmark run fails.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid benchmark configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("worker {worker} aborted the run: {source}")]
    Operation {
        worker: usize,
        #[source]
        source: OperationError,
    },
    #[error("worker {worker} panicked: {message}")]
    WorkerPanicked { worker: usize, message: String },
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}
