use std::time::Duration;

use crate::sandbox::SandboxError;

use super::result::ToolStatus;

/// Closed failure taxonomy for one adapter invocation.
///
/// Errors of this type never leave an adapter: they are folded into a
/// [`ToolResult`](super::ToolResult) with the matching [`ToolStatus`].
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool unavailable: {0}")]
    Unavailable(String),
    #[error("analysis exceeded {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("analysis cancelled")]
    Cancelled,
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("could not parse tool output: {0}")]
    Parse(String),
}

impl ToolError {
    pub fn status(&self) -> ToolStatus {
        match self {
            ToolError::Unavailable(_) => ToolStatus::Failed,
            ToolError::Timeout(_) | ToolError::Cancelled => ToolStatus::Timeout,
            ToolError::Execution(_) | ToolError::Parse(_) => ToolStatus::Error,
        }
    }
}

impl From<SandboxError> for ToolError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Unavailable(_) | SandboxError::Image { .. } | SandboxError::Launch { .. } => {
                ToolError::Unavailable(err.to_string())
            }
            SandboxError::Timeout { limit } => ToolError::Timeout(limit),
            SandboxError::Cancelled => ToolError::Cancelled,
            SandboxError::Precondition(msg) => ToolError::Execution(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_errors_map_to_statuses() {
        let cases = [
            (SandboxError::Unavailable("no daemon".into()), ToolStatus::Failed),
            (
                SandboxError::Timeout {
                    limit: Duration::from_secs(1),
                },
                ToolStatus::Timeout,
            ),
            (SandboxError::Cancelled, ToolStatus::Timeout),
            (SandboxError::Precondition("missing".into()), ToolStatus::Error),
        ];
        for (err, status) in cases {
            assert_eq!(ToolError::from(err).status(), status);
        }
    }

    #[test]
    fn test_parse_is_error_status() {
        assert_eq!(ToolError::Parse("garbage".into()).status(), ToolStatus::Error);
    }
}
