use anyhow::{Context, Result};
use clap::ValueEnum;
use std::str::FromStr;

use crate::util::env::{env_flag, env_opt, env_parse, env_req};

pub const REQUIRED_ENV: [&str; 4] = [
    "LEGACY_API_URL",
    "LEGACY_API_TOKEN",
    "SUPABASE_URL",
    "SUPABASE_SERVICE_ROLE_KEY",
];

pub const LOGGED_ENV: [&str; 9] = [
    "LEGACY_API_URL",
    "LEGACY_API_TOKEN",
    "SUPABASE_URL",
    "SUPABASE_SERVICE_ROLE_KEY",
    "LEGACY_TIMEOUT_SECS",
    "SUPABASE_TIMEOUT_SECS",
    "MIGRATE_NOTIFY_USERS",
    "MIGRATE_SCOPE_POLICY",
    "MIGRATE_TEMP_PASSWORD_LEN",
];

const MIN_TEMP_PASSWORD_LEN: usize = 12;

/// How approval `scope_id`s that are not video-scoped are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ScopePolicy {
    /// Map video scopes through the video map and project scopes through the
    /// project map; skip approvals with any other scope type.
    #[default]
    Resolve,
    /// Map video scopes only and copy every other scope id unchanged.
    Passthrough,
}

impl FromStr for ScopePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resolve" => Ok(Self::Resolve),
            "passthrough" | "pass-through" => Ok(Self::Passthrough),
            other => anyhow::bail!("unknown scope policy '{other}' (expected resolve|passthrough)"),
        }
    }
}

/// Knobs the stage orchestrator reads; independent of where the data lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOptions {
    pub notify_users: bool,
    pub scope_policy: ScopePolicy,
    pub temp_password_len: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            notify_users: false,
            scope_policy: ScopePolicy::Resolve,
            temp_password_len: 24,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub legacy_api_url: String,
    pub legacy_api_token: String,
    pub supabase_url: String,
    pub service_role_key: String,
    pub legacy_timeout_secs: u64,
    pub supabase_timeout_secs: u64,
    pub pipeline: PipelineOptions,
}

impl MigrationConfig {
    pub fn from_env() -> Result<Self> {
        let scope_policy = match env_opt("MIGRATE_SCOPE_POLICY") {
            Some(raw) => raw.parse().context("MIGRATE_SCOPE_POLICY")?,
            None => ScopePolicy::default(),
        };
        let defaults = PipelineOptions::default();
        let temp_password_len: usize =
            env_parse("MIGRATE_TEMP_PASSWORD_LEN", defaults.temp_password_len);
        Ok(Self {
            legacy_api_url: env_req("LEGACY_API_URL")?,
            legacy_api_token: env_req("LEGACY_API_TOKEN")?,
            supabase_url: env_req("SUPABASE_URL")?,
            service_role_key: env_req("SUPABASE_SERVICE_ROLE_KEY")?,
            legacy_timeout_secs: env_parse("LEGACY_TIMEOUT_SECS", 30u64),
            supabase_timeout_secs: env_parse("SUPABASE_TIMEOUT_SECS", 30u64),
            pipeline: PipelineOptions {
                notify_users: env_flag("MIGRATE_NOTIFY_USERS", false),
                scope_policy,
                temp_password_len: temp_password_len.max(MIN_TEMP_PASSWORD_LEN),
            },
        })
    }

    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("LEGACY_API_URL", &self.legacy_api_url),
            ("SUPABASE_URL", &self.supabase_url),
        ] {
            let url = url::Url::parse(value).with_context(|| format!("{key} is not a valid URL"))?;
            if !matches!(url.scheme(), "http" | "https") {
                anyhow::bail!("{key} must be http(s), got {}", url.scheme());
            }
        }
        if self.legacy_timeout_secs == 0 || self.supabase_timeout_secs == 0 {
            anyhow::bail!("timeouts must be at least one second");
        }
        Ok(())
    }
}
