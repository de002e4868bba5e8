use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures that stop the monitor before or outside of a sampling cycle.
#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("only Linux with sysfs is supported: {} not found", path.display())]
    PlatformUnsupported { path: PathBuf },

    #[error("invalid series options: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Failure of a single series within one sampling cycle.
///
/// Cloneable so a cached failure can be reported for every series that
/// refers to the same interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum QueryError {
    #[error("{interface}: no InfiniBand device/port matches its hardware address")]
    Unresolved { interface: String },

    #[error("failed to run `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("`{command}` did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("`{command}` exited with {}: {stderr}", code.map_or_else(|| "signal".to_string(), |c| format!("status {c}")))]
    ExitStatus {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` produced no counter lines")]
    Unparseable { command: String },

    #[error("{interface}: counters missing from output: {}", missing.join(", "))]
    IncompleteSnapshot {
        interface: String,
        missing: Vec<&'static str>,
    },

    #[error("total is incomplete, failed ports: {}", failed.join(", "))]
    TotalIncomplete { failed: Vec<String> },
}
