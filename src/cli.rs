use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::info;

use crate::{
    aws::StsRoleAssumer,
    cache,
    config::ConfigSnapshot,
    constants::DEFAULT_SESSION_DURATION,
    coordinator::CredentialCoordinator,
    environment::{Environment, InvocationOptions},
    shell,
};

#[derive(Debug, Clone, Parser)]
#[command(
    name = "awsenv",
    version,
    about = "AWS profile and session management from the CLI",
    long_about = "Resolve an AWS profile into environment variables, assuming its role if one is \
                  configured. Use as: eval $(awsenv [PROFILE])"
)]
pub struct Cli {
    #[arg(help = "AWS profile name (defaults to AWS_PROFILE, then AWS_DEFAULT_PROFILE, then \"default\")")]
    pub profile: Option<String>,

    #[arg(
        short = 'd',
        long,
        default_value_t = DEFAULT_SESSION_DURATION,
        help = "Role session duration in seconds"
    )]
    pub session_duration: i32,

    #[arg(
        short = 'r',
        long,
        help = "Assume the role again even if the cached session is still valid"
    )]
    pub refresh: bool,

    #[arg(
        short = 'a',
        long,
        value_parser = clap::builder::NonEmptyStringValueParser::new(),
        help = "AWS account ID used to generate a role profile when PROFILE is not configured"
    )]
    pub account_id: Option<String>,

    #[arg(short = 'v', long, action = ArgAction::Count, help = "Increase verbosity (-v info, -vv debug, -vvv trace)")]
    pub verbose: u8,
}

impl Cli {
    pub fn options(&self) -> InvocationOptions {
        InvocationOptions {
            profile: self.profile.clone(),
            session_duration: self.session_duration,
            refresh: self.refresh,
            account_id: self.account_id.clone(),
        }
    }

    pub async fn execute(self) -> Result<()> {
        let environment = Environment::capture();
        let input = environment.coordinator_input(self.options(), cache::now());
        let profile = input.profile.clone();
        info!("Resolving credentials for profile: {}", profile);

        let config = ConfigSnapshot::load().context("Failed to load AWS configuration")?;

        let mut coordinator = CredentialCoordinator::new(input, config, StsRoleAssumer::new());
        let credentials = coordinator
            .update_credentials()
            .await
            .with_context(|| format!("Failed to resolve credentials for profile '{profile}'"))?;

        // Rendered in full before anything reaches stdout
        let output = shell::to_environment(credentials.render_environment());
        println!("{output}");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, error::ErrorKind};

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["awsenv"]).unwrap();
        assert_eq!(cli.profile, None);
        assert_eq!(cli.session_duration, DEFAULT_SESSION_DURATION);
        assert!(!cli.refresh);
        assert_eq!(cli.account_id, None);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_profile_positional() {
        let cli = Cli::try_parse_from(["awsenv", "production"]).unwrap();
        assert_eq!(cli.profile.as_deref(), Some("production"));
    }

    #[test]
    fn test_session_duration_flag() {
        let cli = Cli::try_parse_from(["awsenv", "-d", "900"]).unwrap();
        assert_eq!(cli.session_duration, 900);

        let cli = Cli::try_parse_from(["awsenv", "--session-duration", "1800", "dev"]).unwrap();
        assert_eq!(cli.session_duration, 1800);
        assert_eq!(cli.profile.as_deref(), Some("dev"));
    }

    #[test]
    fn test_session_duration_must_be_integer() {
        let result = Cli::try_parse_from(["awsenv", "--session-duration", "an-hour"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_refresh_flag() {
        let cli = Cli::try_parse_from(["awsenv", "--refresh"]).unwrap();
        assert!(cli.refresh);

        let cli = Cli::try_parse_from(["awsenv", "-r", "dev"]).unwrap();
        assert!(cli.refresh);
    }

    #[test]
    fn test_account_id_flag() {
        let cli = Cli::try_parse_from(["awsenv", "ops", "--account-id", "123456789012"]).unwrap();
        assert_eq!(cli.account_id.as_deref(), Some("123456789012"));

        let options = cli.options();
        assert_eq!(options.profile.as_deref(), Some("ops"));
        assert_eq!(options.account_id.as_deref(), Some("123456789012"));
    }

    #[test]
    fn test_empty_account_id_rejected() {
        let result = Cli::try_parse_from(["awsenv", "ops", "-a", ""]);
        assert!(result.is_err());
        if let Err(e) = result {
            assert_eq!(e.kind(), ErrorKind::InvalidValue);
        }
    }

    #[test]
    fn test_verbose_flag_multiple() {
        let cli = Cli::try_parse_from(["awsenv", "-vvv"]).unwrap();
        assert_eq!(cli.verbose, 3);
    }

    #[test]
    fn test_too_many_positionals_fail() {
        let result = Cli::try_parse_from(["awsenv", "one", "two"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_command_structure_validation() {
        let cmd = Cli::command();
        cmd.debug_assert();
    }

    #[test]
    fn test_help_flag_works() {
        let result = Cli::try_parse_from(["awsenv", "--help"]);
        assert!(result.is_err());
        if let Err(e) = result {
            assert_eq!(e.kind(), ErrorKind::DisplayHelp);
        }
    }

    #[test]
    fn test_version_flag_works() {
        let result = Cli::try_parse_from(["awsenv", "--version"]);
        assert!(result.is_err());
        if let Err(e) = result {
            assert_eq!(e.kind(), ErrorKind::DisplayVersion);
        }
    }
}
