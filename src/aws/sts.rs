use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, profile::ProfileFileCredentialsProvider};
use aws_sdk_sts::{Client as StsClient, config::Credentials as StaticCredentials};
use tracing::{debug, info};

use super::{AssumeRoleRequest, BaseCredentials, Credentials, RoleAssumer};

/// Provider name reported for the static base credentials
const PROVIDER_NAME: &str = "awsenv";

/// [`RoleAssumer`] backed by AWS STS.
#[derive(Debug, Clone, Default)]
pub struct StsRoleAssumer;

impl StsRoleAssumer {
    pub fn new() -> Self {
        Self
    }

    /// Credentials of `profile` from the shared files only.
    ///
    /// Environment keys are left out: they may belong to a different profile
    /// or to an expired role session.
    fn profile_credentials(profile: &str) -> ProfileFileCredentialsProvider {
        ProfileFileCredentialsProvider::builder()
            .profile_name(profile)
            .build()
    }

    fn client(&self, base: &BaseCredentials) -> StsClient {
        let region = Region::new(base.region.clone());
        info!("Using region: {}", region);

        let builder = aws_sdk_sts::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(region);

        let config = match (&base.access_key_id, &base.secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => {
                debug!("Signing with static base credentials");
                builder.credentials_provider(StaticCredentials::new(
                    access_key_id,
                    secret_access_key,
                    base.session_token.clone(),
                    None,
                    PROVIDER_NAME,
                ))
            }
            _ => {
                info!(
                    "No static base credentials, using profile file credentials for {}",
                    base.profile
                );
                builder.credentials_provider(Self::profile_credentials(&base.profile))
            }
        };

        StsClient::from_conf(config.build())
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    async fn assume_role(&self, request: &AssumeRoleRequest) -> Result<Credentials> {
        info!("Calling AWS STS AssumeRole");
        debug!("Role ARN: {}", request.role_arn);
        debug!("Session name: {}", request.session_name);
        debug!("Duration: {} seconds", request.duration_seconds);

        let client = self.client(&request.base);

        let response = client
            .assume_role()
            .role_arn(&request.role_arn)
            .role_session_name(&request.session_name)
            .duration_seconds(request.duration_seconds)
            .send()
            .await
            .context("Failed to call STS AssumeRole")?;

        let sts_creds = response
            .credentials()
            .context("AWS STS returned no credentials")?;

        let credentials = Credentials {
            access_key_id: sts_creds.access_key_id().to_string(),
            secret_access_key: sts_creds.secret_access_key().to_string(),
            session_token: sts_creds.session_token().to_string(),
            expiration: Some(*sts_creds.expiration()),
        };

        info!("Successfully obtained AWS credentials");
        Ok(credentials)
    }
}
