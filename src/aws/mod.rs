use async_trait::async_trait;
use aws_smithy_types::DateTime;

pub mod sts;

pub use sts::StsRoleAssumer;

/// AWS temporary credentials structure
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: Option<DateTime>,
}

/// Non-role credentials used to sign the `AssumeRole` call.
///
/// When no static keys are known the implementation falls back to the SDK
/// credential chain for `profile`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseCredentials {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub region: String,
    pub profile: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub session_name: String,
    pub duration_seconds: i32,
    pub base: BaseCredentials,
}

/// Capability to exchange base credentials for a role session.
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(&self, request: &AssumeRoleRequest) -> anyhow::Result<Credentials>;
}
