//! Profile configuration layering.
//!
//! The SDK does not merge a profile with its `source_profile`, so the base
//! region and keys used to sign `AssumeRole` have to be recovered by hand:
//! source profile, then the profile itself, then live credentials, then the
//! `AWS_REGION` override. Each layer is a shallow key overwrite.

use std::{collections::BTreeMap, path::Path};

use ini::{Ini, ParseOption};
use tracing::{debug, info};

use crate::{
    constants::{self, DEFAULT_PROFILE},
    error::{AwsenvError, Result},
};

pub const ACCESS_KEY_ID_KEY: &str = "aws_access_key_id";
pub const SECRET_ACCESS_KEY_KEY: &str = "aws_secret_access_key";
pub const SESSION_TOKEN_KEY: &str = "aws_session_token";
pub const REGION_KEY: &str = "region";
pub const ROLE_ARN_KEY: &str = "role_arn";
pub const SOURCE_PROFILE_KEY: &str = "source_profile";

/// Settings of a single profile, keyed by their config file names.
pub type ConfigBlock = BTreeMap<String, String>;

/// Credentials held by the running shell rather than the config files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl LiveCredentials {
    fn overlay(&self, block: &mut ConfigBlock) {
        block.insert(ACCESS_KEY_ID_KEY.to_string(), self.access_key_id.clone());
        block.insert(
            SECRET_ACCESS_KEY_KEY.to_string(),
            self.secret_access_key.clone(),
        );
        match &self.session_token {
            Some(token) => {
                block.insert(SESSION_TOKEN_KEY.to_string(), token.clone());
            }
            None => {
                block.remove(SESSION_TOKEN_KEY);
            }
        }
    }
}

/// The merged, read-only view of a profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileConfig(ConfigBlock);

impl ProfileConfig {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn access_key_id(&self) -> Option<&str> {
        self.get(ACCESS_KEY_ID_KEY)
    }

    pub fn secret_access_key(&self) -> Option<&str> {
        self.get(SECRET_ACCESS_KEY_KEY)
    }

    pub fn session_token(&self) -> Option<&str> {
        self.get(SESSION_TOKEN_KEY)
    }

    pub fn region(&self) -> Option<&str> {
        self.get(REGION_KEY)
    }

    pub fn role_arn(&self) -> Option<&str> {
        self.get(ROLE_ARN_KEY)
    }

    pub fn source_profile(&self) -> Option<&str> {
        self.get(SOURCE_PROFILE_KEY)
    }

    pub fn as_map(&self) -> &ConfigBlock {
        &self.0
    }
}

impl From<ConfigBlock> for ProfileConfig {
    fn from(block: ConfigBlock) -> Self {
        Self(block)
    }
}

/// Snapshot of every profile found in the shared config and credentials files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    profiles: BTreeMap<String, ConfigBlock>,
}

impl ConfigSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `AWS_CONFIG_FILE` / `AWS_SHARED_CREDENTIALS_FILE` or their defaults under `~/.aws`.
    pub fn load() -> Result<Self> {
        let config_path = constants::get_aws_config_path();
        let credentials_path = constants::get_aws_credentials_path();
        Self::load_from(config_path.as_deref(), credentials_path.as_deref())
    }

    /// Load from explicit paths. Missing files contribute nothing.
    ///
    /// Keys from the credentials file win over the config file for the same profile.
    pub fn load_from(config_path: Option<&Path>, credentials_path: Option<&Path>) -> Result<Self> {
        let mut snapshot = Self::new();

        if let Some(ini) = config_path.map(read_ini).transpose()?.flatten() {
            for (section, props) in ini.iter() {
                let Some(name) = section.and_then(config_section_profile) else {
                    continue;
                };
                let block = snapshot.profiles.entry(name.to_string()).or_default();
                for (key, value) in props.iter() {
                    block.insert(key.to_string(), value.to_string());
                }
            }
        }

        if let Some(ini) = credentials_path.map(read_ini).transpose()?.flatten() {
            for (section, props) in ini.iter() {
                let Some(name) = section else {
                    continue;
                };
                let block = snapshot.profiles.entry(name.trim().to_string()).or_default();
                for (key, value) in props.iter() {
                    block.insert(key.to_string(), value.to_string());
                }
            }
        }

        debug!("Loaded {} AWS profiles", snapshot.profiles.len());
        Ok(snapshot)
    }

    /// Add or replace a profile definition.
    pub fn with_profile<I, K, V>(mut self, name: impl Into<String>, settings: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let block = settings
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.profiles.insert(name.into(), block);
        self
    }

    pub fn contains(&self, profile: &str) -> bool {
        self.profiles.contains_key(profile)
    }

    /// The stored block for `profile`.
    ///
    /// An undefined `default` profile resolves to an empty block; any other
    /// undefined profile is an error.
    pub fn profile_config(&self, profile: &str) -> Result<ConfigBlock> {
        match self.profiles.get(profile) {
            Some(block) => Ok(block.clone()),
            None if profile == DEFAULT_PROFILE => Ok(ConfigBlock::new()),
            None => Err(AwsenvError::ProfileNotFound(profile.to_string())),
        }
    }

    /// The stored block of the profile's `source_profile`, or empty.
    pub fn source_profile_config(&self, profile: &str) -> Result<ConfigBlock> {
        let config = self.profile_config(profile)?;
        Ok(config
            .get(SOURCE_PROFILE_KEY)
            .and_then(|source| self.profiles.get(source))
            .cloned()
            .unwrap_or_default())
    }

    /// Layer source profile, profile, live credentials and region override.
    pub fn merged_config(
        &self,
        profile: &str,
        live_credentials: Option<&LiveCredentials>,
        region_override: Option<&str>,
    ) -> Result<ProfileConfig> {
        let mut merged = self.source_profile_config(profile)?;
        merged.extend(self.profile_config(profile)?);

        if let Some(live) = live_credentials {
            live.overlay(&mut merged);
        }

        if let Some(region) = region_override.filter(|r| !r.is_empty()) {
            merged.insert(REGION_KEY.to_string(), region.to_string());
        }

        Ok(ProfileConfig(merged))
    }

    /// A copy of this snapshot with a role profile synthesised for `account_id`.
    ///
    /// The generated profile assumes `arn:{partition}:iam::{account_id}:role/{profile}`
    /// using `source_profile` for base credentials. The partition follows
    /// `region_override`, else the source profile's region. Existing definitions
    /// are left alone.
    pub fn with_generated_profile(
        &self,
        profile: &str,
        account_id: &str,
        source_profile: &str,
        region_override: Option<&str>,
    ) -> Self {
        if self.contains(profile) {
            return self.clone();
        }

        let region = region_override.filter(|r| !r.is_empty()).or_else(|| {
            self.profiles
                .get(source_profile)
                .and_then(|block| block.get(REGION_KEY))
                .map(String::as_str)
        });
        let role_arn = format!(
            "arn:{}:iam::{}:role/{}",
            partition_for_region(region),
            account_id,
            profile
        );
        info!("Generated profile {} assuming {}", profile, role_arn);

        self.clone().with_profile(
            profile,
            [
                (ROLE_ARN_KEY, role_arn),
                (SOURCE_PROFILE_KEY, source_profile.to_string()),
            ],
        )
    }
}

/// AWS partition that owns `region`.
pub fn partition_for_region(region: Option<&str>) -> &'static str {
    match region {
        Some(r) if r.starts_with("cn-") => "aws-cn",
        Some(r) if r.starts_with("us-gov-") => "aws-us-gov",
        _ => "aws",
    }
}

fn read_ini(path: &Path) -> Result<Option<Ini>> {
    if !path.exists() {
        debug!("AWS file not found: {}", path.display());
        return Ok(None);
    }

    // Secrets may contain characters the INI escape rules would mangle
    let opt = ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    };

    Ini::load_from_file_opt(path, opt)
        .map(Some)
        .map_err(|source| AwsenvError::ConfigLoad {
            path: path.to_path_buf(),
            source,
        })
}

/// Profile name of a config file section (`[default]` or `[profile NAME]`).
fn config_section_profile(section: &str) -> Option<&str> {
    let section = section.trim();
    if section == DEFAULT_PROFILE {
        return Some(DEFAULT_PROFILE);
    }
    section
        .strip_prefix("profile ")
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn snapshot() -> ConfigSnapshot {
        ConfigSnapshot::new()
            .with_profile("default", [("region", "us-west-2")])
            .with_profile(
                "custom",
                [("role_arn", "r1"), ("source_profile", "default")],
            )
    }

    #[test]
    fn test_config_section_profile() {
        assert_eq!(config_section_profile("default"), Some("default"));
        assert_eq!(config_section_profile("profile custom"), Some("custom"));
        assert_eq!(config_section_profile("profile  spaced "), Some("spaced"));
        assert_eq!(config_section_profile("sso-session corp"), None);
        assert_eq!(config_section_profile("profile "), None);
    }

    #[test]
    fn test_load_from_files() {
        let config = write_file(
            "[default]\nregion = us-west-2\n\n[profile custom]\nrole_arn = arn:aws:iam::123456789012:role/custom\nsource_profile = default\n\n[sso-session corp]\nsso_region = us-east-1\n",
        );
        let credentials = write_file(
            "[default]\naws_access_key_id = AKIDEXAMPLE\naws_secret_access_key = se/cr+et\n",
        );

        let snapshot =
            ConfigSnapshot::load_from(Some(config.path()), Some(credentials.path())).unwrap();

        assert!(snapshot.contains("custom"));
        assert!(snapshot.contains("default"));
        assert!(!snapshot.contains("corp"));
        let default = snapshot.profile_config("default").unwrap();
        assert_eq!(default["region"], "us-west-2");
        assert_eq!(default["aws_access_key_id"], "AKIDEXAMPLE");
        assert_eq!(default["aws_secret_access_key"], "se/cr+et");
    }

    #[test]
    fn test_load_from_missing_files() {
        let snapshot = ConfigSnapshot::load_from(
            Some(Path::new("/nonexistent/aws/config")),
            None,
        )
        .unwrap();
        assert_eq!(snapshot, ConfigSnapshot::new());
    }

    #[test]
    fn test_load_from_malformed_file() {
        let config = write_file("region = us-west-2\n[default");
        let result = ConfigSnapshot::load_from(Some(config.path()), None);
        assert!(matches!(result, Err(AwsenvError::ConfigLoad { .. })));
    }

    #[test]
    fn test_profile_config_not_found() {
        let result = snapshot().profile_config("missing");
        assert!(matches!(result, Err(AwsenvError::ProfileNotFound(name)) if name == "missing"));
    }

    #[test]
    fn test_undefined_default_profile_is_empty() {
        let config = ConfigSnapshot::new().profile_config("default").unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn test_source_profile_config() {
        let snapshot = snapshot();
        let source = snapshot.source_profile_config("custom").unwrap();
        assert_eq!(source["region"], "us-west-2");

        // no source_profile reference
        assert!(snapshot.source_profile_config("default").unwrap().is_empty());
    }

    #[test]
    fn test_source_profile_config_dangling_reference() {
        let snapshot =
            ConfigSnapshot::new().with_profile("custom", [("source_profile", "missing")]);
        assert!(snapshot.source_profile_config("custom").unwrap().is_empty());
    }

    #[test]
    fn test_merged_config() {
        let merged = snapshot().merged_config("custom", None, None).unwrap();

        let expected: ConfigBlock = [
            ("region", "us-west-2"),
            ("role_arn", "r1"),
            ("source_profile", "default"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        assert_eq!(merged.as_map(), &expected);
        assert_eq!(merged.region(), Some("us-west-2"));
        assert_eq!(merged.role_arn(), Some("r1"));
    }

    #[test]
    fn test_merged_config_region_override() {
        let merged = snapshot()
            .merged_config("custom", None, Some("us-east-2"))
            .unwrap();
        assert_eq!(merged.region(), Some("us-east-2"));
    }

    #[test]
    fn test_merged_config_empty_region_override_ignored() {
        let merged = snapshot().merged_config("custom", None, Some("")).unwrap();
        assert_eq!(merged.region(), Some("us-west-2"));
    }

    #[test]
    fn test_merged_config_profile_overrides_source() {
        let snapshot = snapshot().with_profile(
            "custom",
            [
                ("role_arn", "r1"),
                ("source_profile", "default"),
                ("region", "eu-west-1"),
            ],
        );
        let merged = snapshot.merged_config("custom", None, None).unwrap();
        assert_eq!(merged.region(), Some("eu-west-1"));
    }

    #[test]
    fn test_merged_config_live_credentials() {
        let snapshot = snapshot().with_profile(
            "default",
            [
                ("region", "us-west-2"),
                ("aws_access_key_id", "stored"),
                ("aws_session_token", "stale"),
            ],
        );
        let live = LiveCredentials {
            access_key_id: "live-key".to_string(),
            secret_access_key: "live-secret".to_string(),
            session_token: None,
        };

        let merged = snapshot
            .merged_config("custom", Some(&live), Some("us-east-2"))
            .unwrap();

        assert_eq!(merged.access_key_id(), Some("live-key"));
        assert_eq!(merged.secret_access_key(), Some("live-secret"));
        assert_eq!(merged.session_token(), None);
        assert_eq!(merged.region(), Some("us-east-2"));
    }

    #[test]
    fn test_with_generated_profile() {
        let original = snapshot();
        let augmented = original.with_generated_profile("ops", "123456789012", "default", None);

        assert!(!original.contains("ops"));
        let merged = augmented.merged_config("ops", None, None).unwrap();
        assert_eq!(merged.role_arn(), Some("arn:aws:iam::123456789012:role/ops"));
        assert_eq!(merged.source_profile(), Some("default"));
        assert_eq!(merged.region(), Some("us-west-2"));
    }

    #[test]
    fn test_with_generated_profile_keeps_existing() {
        let original = snapshot();
        let augmented = original.with_generated_profile("custom", "123456789012", "default", None);
        assert_eq!(augmented, original);
    }

    #[test]
    fn test_with_generated_profile_china_partition() {
        let snapshot = ConfigSnapshot::new().with_profile("default", [("region", "cn-north-1")]);
        let augmented = snapshot.with_generated_profile("ops", "123456789012", "default", None);
        let merged = augmented.merged_config("ops", None, None).unwrap();
        assert_eq!(
            merged.role_arn(),
            Some("arn:aws-cn:iam::123456789012:role/ops")
        );
    }

    #[test]
    fn test_with_generated_profile_region_override_partition() {
        let augmented =
            snapshot().with_generated_profile("gen", "123456789012", "default", Some("cn-north-1"));
        let merged = augmented.merged_config("gen", None, None).unwrap();
        assert_eq!(
            merged.role_arn(),
            Some("arn:aws-cn:iam::123456789012:role/gen")
        );

        // empty override falls back to the source profile region
        let augmented = snapshot().with_generated_profile("gen", "123456789012", "default", Some(""));
        let merged = augmented.merged_config("gen", None, None).unwrap();
        assert_eq!(merged.role_arn(), Some("arn:aws:iam::123456789012:role/gen"));
    }

    #[test]
    fn test_partition_for_region() {
        assert_eq!(partition_for_region(None), "aws");
        assert_eq!(partition_for_region(Some("eu-central-1")), "aws");
        assert_eq!(partition_for_region(Some("cn-northwest-1")), "aws-cn");
        assert_eq!(partition_for_region(Some("us-gov-west-1")), "aws-us-gov");
    }
}
