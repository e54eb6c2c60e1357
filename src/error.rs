//! Error types for credential resolution.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`AwsenvError`].
pub type Result<T> = std::result::Result<T, AwsenvError>;

/// Errors raised while resolving a profile into credentials.
#[derive(Debug, Error)]
pub enum AwsenvError {
    /// The profile is not defined and could not be generated.
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    /// A cached session name does not carry a creation timestamp.
    #[error("invalid session name: {0}")]
    InvalidSessionName(String),

    /// STS rejected the role assumption or could not be reached.
    #[error("failed to assume role {role_arn}: {source}")]
    RoleAssumption {
        role_arn: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An AWS config or credentials file could not be parsed.
    #[error("failed to load AWS configuration from {}: {source}", .path.display())]
    ConfigLoad {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },
}
