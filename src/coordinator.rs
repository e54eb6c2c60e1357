//! Credential resolution.
//!
//! Each invocation ends in one of three outcomes: nothing to assume, reuse of
//! a cached role session, or a fresh `AssumeRole` call. The result is rendered
//! as the environment variables the calling shell should export or unset.

use std::collections::BTreeMap;

use aws_smithy_types::date_time::Format;
use tracing::{debug, info};

use crate::{
    aws::{AssumeRoleRequest, BaseCredentials, RoleAssumer},
    cache::{self, CachedSession},
    config::{ConfigSnapshot, LiveCredentials, ProfileConfig},
    constants::{
        AWS_ACCESS_KEY_ID, AWS_DEFAULT_REGION, AWS_PROFILE, AWS_SECRET_ACCESS_KEY,
        AWS_SESSION_NAME, AWS_SESSION_TOKEN, DEFAULT_AWS_REGION, DEFAULT_PROFILE,
        DEFAULT_SESSION_DURATION,
    },
    error::{AwsenvError, Result},
};

/// Everything the coordinator needs to know about the invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorInput {
    pub profile: String,
    /// Source profile for generated role profiles
    pub default_profile: String,
    /// Passed to STS unchecked; STS rejects values outside its legal range
    pub session_duration: i32,
    pub refresh: bool,
    pub cached_session: Option<CachedSession>,
    pub account_id: Option<String>,
    pub live_credentials: Option<LiveCredentials>,
    pub region_override: Option<String>,
}

impl CoordinatorInput {
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
            default_profile: DEFAULT_PROFILE.to_string(),
            session_duration: DEFAULT_SESSION_DURATION,
            refresh: false,
            cached_session: None,
            account_id: None,
            live_credentials: None,
            region_override: None,
        }
    }
}

/// How the credentials of an invocation are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    NoRoleConfigured,
    CachedSessionReusable,
    AssumeRoleRequired,
}

/// The final credentials of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub session_name: Option<String>,
    pub region: Option<String>,
    pub profile: String,
}

impl CredentialSet {
    /// Environment variables to export, keyed in sorted order.
    ///
    /// `None` means the variable must be unset.
    pub fn render_environment(&self) -> BTreeMap<&'static str, Option<String>> {
        BTreeMap::from([
            (AWS_ACCESS_KEY_ID, self.access_key_id.clone()),
            (AWS_DEFAULT_REGION, self.region.clone()),
            (AWS_PROFILE, Some(self.profile.clone())),
            (AWS_SECRET_ACCESS_KEY, self.secret_access_key.clone()),
            (AWS_SESSION_NAME, self.session_name.clone()),
            (AWS_SESSION_TOKEN, self.session_token.clone()),
        ])
    }
}

pub struct CredentialCoordinator<A> {
    input: CoordinatorInput,
    config: ConfigSnapshot,
    assumer: A,
    cached_session: Option<CachedSession>,
}

impl<A: RoleAssumer> CredentialCoordinator<A> {
    pub fn new(input: CoordinatorInput, config: ConfigSnapshot, assumer: A) -> Self {
        let cached_session = input.cached_session.clone();
        Self {
            input,
            config,
            assumer,
            cached_session,
        }
    }

    /// The session to hand on to the next invocation, if any.
    pub fn cached_session(&self) -> Option<&CachedSession> {
        self.cached_session.as_ref()
    }

    pub fn assumer(&self) -> &A {
        &self.assumer
    }

    /// Merged configuration of the requested profile.
    ///
    /// An unknown profile is generated once from the account id, if one was given.
    pub fn merged_config(&mut self) -> Result<ProfileConfig> {
        let profile = self.input.profile.as_str();
        let live = self.input.live_credentials.as_ref();
        let region = self.input.region_override.as_deref();

        let account_id = self.input.account_id.as_deref().filter(|id| !id.is_empty());

        match (self.config.merged_config(profile, live, region), account_id) {
            (Err(AwsenvError::ProfileNotFound(_)), Some(account_id)) => {
                self.config = self.config.with_generated_profile(
                    profile,
                    account_id,
                    &self.input.default_profile,
                    region,
                );
                self.config.merged_config(profile, live, region)
            }
            (result, _) => result,
        }
    }

    /// Which outcome applies to `merged`.
    pub fn resolution(&self, merged: &ProfileConfig) -> Resolution {
        match (merged.role_arn(), self.reusable_session()) {
            (None, _) => Resolution::NoRoleConfigured,
            (Some(_), Some(_)) => Resolution::CachedSessionReusable,
            (Some(_), None) => Resolution::AssumeRoleRequired,
        }
    }

    /// Resolve the profile into its final credentials, assuming a role if needed.
    pub async fn update_credentials(&mut self) -> Result<CredentialSet> {
        let merged = self.merged_config()?;
        let resolution = self.resolution(&merged);
        info!("Profile {}: {:?}", self.input.profile, resolution);

        let mut credentials = CredentialSet {
            access_key_id: merged.access_key_id().map(str::to_string),
            secret_access_key: merged.secret_access_key().map(str::to_string),
            session_token: None,
            session_name: None,
            region: merged.region().map(str::to_string),
            profile: self.input.profile.clone(),
        };

        match resolution {
            Resolution::NoRoleConfigured => {
                self.cached_session = None;
            }
            Resolution::CachedSessionReusable => {
                if let Some(session) = self.reusable_session() {
                    debug!("Reusing cached session {}", session.name);
                    credentials.session_token = Some(session.token.clone());
                    credentials.session_name = Some(session.name.clone());
                }
            }
            Resolution::AssumeRoleRequired => {
                let session = self.assume_role(&merged, &mut credentials).await?;
                credentials.session_token = Some(session.token.clone());
                credentials.session_name = Some(session.name.clone());
                self.cached_session = Some(session);
            }
        }

        Ok(credentials)
    }

    async fn assume_role(
        &self,
        merged: &ProfileConfig,
        credentials: &mut CredentialSet,
    ) -> Result<CachedSession> {
        let role_arn = merged.role_arn().unwrap_or_default().to_string();
        let session_name = cache::generate_session_name();

        let request = AssumeRoleRequest {
            role_arn: role_arn.clone(),
            session_name: session_name.clone(),
            duration_seconds: self.input.session_duration,
            base: BaseCredentials {
                access_key_id: merged.access_key_id().map(str::to_string),
                secret_access_key: merged.secret_access_key().map(str::to_string),
                session_token: merged.session_token().map(str::to_string),
                region: merged.region().unwrap_or(DEFAULT_AWS_REGION).to_string(),
                profile: merged
                    .source_profile()
                    .unwrap_or(&self.input.profile)
                    .to_string(),
            },
        };

        info!("Assuming role {} as {}", role_arn, session_name);
        let assumed = self
            .assumer
            .assume_role(&request)
            .await
            .map_err(|e| AwsenvError::RoleAssumption {
                role_arn: role_arn.clone(),
                source: e.into(),
            })?;

        if let Some(expiration) = assumed.expiration {
            info!(
                "Session {} expires at {}",
                session_name,
                expiration
                    .fmt(Format::DateTime)
                    .unwrap_or_else(|_| "unknown".to_string())
            );
        }

        credentials.access_key_id = Some(assumed.access_key_id);
        credentials.secret_access_key = Some(assumed.secret_access_key);

        Ok(CachedSession::new(
            session_name,
            assumed.session_token,
            self.input.profile.clone(),
        ))
    }

    /// The supplied cached session, unless refresh was requested or it belongs elsewhere.
    fn reusable_session(&self) -> Option<&CachedSession> {
        if self.input.refresh {
            return None;
        }
        self.input
            .cached_session
            .as_ref()
            .filter(|session| session.belongs_to(&self.input.profile))
    }
}
