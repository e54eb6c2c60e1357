//! Process environment adapter.
//!
//! The environment is read once into an [`Environment`] snapshot and turned
//! into a [`CoordinatorInput`]; nothing below this layer touches `std::env`.

use std::{collections::BTreeMap, env};

use tracing::debug;

use crate::{
    cache::{self, CachedSession},
    config::LiveCredentials,
    constants::{
        AWS_ACCESS_KEY_ID, AWS_DEFAULT_PROFILE, AWS_PROFILE, AWS_REGION, AWS_SECRET_ACCESS_KEY,
        AWS_SESSION_NAME, AWS_SESSION_TOKEN, DEFAULT_PROFILE,
    },
    coordinator::CoordinatorInput,
};

const CONSUMED_VARS: [&str; 7] = [
    AWS_PROFILE,
    AWS_DEFAULT_PROFILE,
    AWS_REGION,
    AWS_ACCESS_KEY_ID,
    AWS_SECRET_ACCESS_KEY,
    AWS_SESSION_NAME,
    AWS_SESSION_TOKEN,
];

/// Per-invocation options taken from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationOptions {
    pub profile: Option<String>,
    pub session_duration: i32,
    pub refresh: bool,
    pub account_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Snapshot the variables this tool reads from the process environment.
    pub fn capture() -> Self {
        Self::from_vars(
            CONSUMED_VARS
                .iter()
                .filter_map(|key| env::var(key).ok().map(|value| (*key, value))),
        )
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of `key`, treating an empty variable as unset.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// `AWS_DEFAULT_PROFILE`, else `default`.
    pub fn default_profile(&self) -> String {
        self.get(AWS_DEFAULT_PROFILE)
            .unwrap_or(DEFAULT_PROFILE)
            .to_string()
    }

    /// `AWS_PROFILE`, else the default profile.
    pub fn selected_profile(&self) -> String {
        self.get(AWS_PROFILE)
            .map(str::to_string)
            .unwrap_or_else(|| self.default_profile())
    }

    pub fn region_override(&self) -> Option<String> {
        self.get(AWS_REGION).map(str::to_string)
    }

    /// The session left behind by the previous invocation, if still valid.
    pub fn cached_session(&self, now: f64, session_duration: i32) -> Option<CachedSession> {
        cache::load(
            self.get(AWS_SESSION_NAME),
            self.get(AWS_SESSION_TOKEN),
            self.get(AWS_PROFILE),
            now,
            session_duration,
        )
    }

    /// Keys from the environment that may be layered over `profile`.
    ///
    /// Plain pass-through keys (no session name) apply when `AWS_PROFILE` is
    /// unset or names `profile`. Keys left by a previous invocation only apply
    /// together with the session they belong to.
    pub fn live_credentials(
        &self,
        profile: &str,
        cached_session: Option<&CachedSession>,
        refresh: bool,
    ) -> Option<LiveCredentials> {
        let access_key_id = self.get(AWS_ACCESS_KEY_ID)?;
        let secret_access_key = self.get(AWS_SECRET_ACCESS_KEY)?;

        let usable = match self.get(AWS_SESSION_NAME) {
            None => self.get(AWS_PROFILE).is_none_or(|owner| owner == profile),
            Some(_) => !refresh && cached_session.is_some_and(|s| s.belongs_to(profile)),
        };
        if !usable {
            debug!("Ignoring environment keys of a stale or foreign session");
            return None;
        }

        Some(LiveCredentials {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: self.get(AWS_SESSION_TOKEN).map(str::to_string),
        })
    }

    /// Build the coordinator input for this invocation at time `now`.
    pub fn coordinator_input(&self, options: InvocationOptions, now: f64) -> CoordinatorInput {
        let profile = options
            .profile
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.selected_profile());
        debug!("Resolved profile: {}", profile);

        let cached_session = self
            .cached_session(now, options.session_duration)
            .filter(|session| {
                let same = session.belongs_to(&profile);
                if !same {
                    debug!(
                        "Cached session belongs to profile {}, not {}",
                        session.profile, profile
                    );
                }
                same
            });
        let live_credentials =
            self.live_credentials(&profile, cached_session.as_ref(), options.refresh);

        CoordinatorInput {
            default_profile: self.default_profile(),
            session_duration: options.session_duration,
            refresh: options.refresh,
            account_id: options.account_id,
            region_override: self.region_override(),
            cached_session,
            live_credentials,
            profile,
        }
    }
}
