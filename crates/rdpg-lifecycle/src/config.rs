//! Smoke run configuration
//!
//! Loaded once from a JSON file before anything is provisioned, then passed
//! into the orchestrator. Field names follow the platform's acceptance-test
//! config files (`apps_domain`, `service_name`, `plan_names`, ...).

use crate::error::ConfigError;
use crate::identifier::MAX_KEY_LENGTH;
use crate::polling::{scale_timeout, PollPolicy, MAX_TIMEOUT};
use crate::sql::KEY_COLUMN_WIDTH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// Environment variable overriding the insertion count
pub const NUM_INSERTIONS_ENV: &str = "NUM_INSERTIONS";

/// Rows inserted per table when not overridden
pub const DEFAULT_NUM_INSERTIONS: usize = 10;

/// Smoke run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeConfig {
    /// Platform API endpoint; when set, the suite creates its own org and space
    pub api: Option<String>,
    /// Admin user for org/space setup
    pub admin_user: Option<String>,
    /// Admin password for org/space setup
    pub admin_password: Option<String>,
    /// Domain application routes live under
    pub apps_domain: String,
    /// Pass `--skip-ssl-validation` when targeting the API
    pub skip_ssl_validation: bool,
    /// Service offering to provision
    pub service_name: String,
    /// Plans to run a lifecycle pass for, in order
    pub plan_names: Vec<String>,
    /// Multiplier applied to every timeout
    pub timeout_scale: f64,
    /// Unscaled assertion and platform timeout
    pub base_timeout_secs: u64,
    /// Pause between polls
    pub poll_interval_ms: u64,
    /// Unscaled window for negative checks; defaults to `base_timeout_secs`
    pub consistently_window_secs: Option<u64>,
    /// Per-request timeout of the HTTP probe
    pub probe_timeout_secs: u64,
    /// Rows inserted per table
    pub num_insertions: usize,
    /// Maximum length of generated names and keys
    pub max_key_length: usize,
    /// Schema names the generator must never pick
    pub reserved_schemas: Vec<String>,
    /// Path of the test application to push
    pub app_path: PathBuf,
    /// Memory limit of the pushed application
    pub app_memory: String,
    /// Stack of the pushed application
    pub app_stack: Option<String>,
    /// Prefix of the org and space created for the run
    pub org_prefix: String,
    /// Seed for reproducible names
    pub seed: Option<u64>,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            api: None,
            admin_user: None,
            admin_password: None,
            apps_domain: String::new(),
            skip_ssl_validation: false,
            service_name: String::new(),
            plan_names: Vec::new(),
            timeout_scale: 3.0,
            base_timeout_secs: 60,
            poll_interval_ms: 500,
            consistently_window_secs: None,
            probe_timeout_secs: 30,
            num_insertions: DEFAULT_NUM_INSERTIONS,
            max_key_length: MAX_KEY_LENGTH,
            reserved_schemas: vec!["public".to_string(), "bdr".to_string()],
            app_path: PathBuf::from("assets/postgres-test-app"),
            app_memory: "256M".to_string(),
            app_stack: Some("cflinuxfs2".to_string()),
            org_prefix: "rdpg-postgres-smoke-test".to_string(),
            seed: None,
        }
    }
}

/// Credentials and target for the suite's own org and space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSettings {
    /// API endpoint
    pub api: String,
    /// Admin user
    pub admin_user: String,
    /// Admin password
    pub admin_password: String,
    /// Skip TLS validation against the API
    pub skip_ssl_validation: bool,
    /// Org/space name prefix
    pub org_prefix: String,
}

impl SmokeConfig {
    /// Read a config file
    ///
    /// # Errors
    /// `ConfigError::Io` or `ConfigError::Parse`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path`, apply an optional insertion-count override, and validate
    ///
    /// # Errors
    /// `ConfigError::MissingPath` when no path is given, or any load,
    /// override or validation error.
    pub fn load(path: Option<&Path>, num_insertions: Option<&str>) -> Result<Self, ConfigError> {
        let path = path.ok_or(ConfigError::MissingPath)?;
        let mut config = Self::from_path(path)?;
        if let Some(raw) = num_insertions {
            config.override_num_insertions(raw)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Apply a textual insertion-count override
    ///
    /// An empty value keeps the configured count.
    ///
    /// # Errors
    /// `ConfigError::InvalidOverride` if `raw` is not a non-negative integer.
    pub fn override_num_insertions(&mut self, raw: &str) -> Result<(), ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(());
        }
        self.num_insertions = raw.parse().map_err(|_| ConfigError::InvalidOverride {
            key: NUM_INSERTIONS_ENV,
            value: raw.to_string(),
            expected: "a non-negative integer",
        })?;
        Ok(())
    }

    /// Reject settings a run cannot start with
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(key: &'static str, reason: &str) -> ConfigError {
            ConfigError::Invalid {
                key,
                reason: reason.to_string(),
            }
        }

        if self.apps_domain.trim().is_empty() {
            return Err(invalid("apps_domain", "must not be empty"));
        }
        if self.service_name.trim().is_empty() {
            return Err(invalid("service_name", "must not be empty"));
        }
        if self.plan_names.is_empty() {
            return Err(invalid("plan_names", "at least one plan is required"));
        }
        if self.plan_names.iter().any(|p| p.trim().is_empty()) {
            return Err(invalid("plan_names", "plan names must not be empty"));
        }
        if !(self.timeout_scale.is_finite() && self.timeout_scale > 0.0) {
            return Err(invalid("timeout_scale", "must be a positive number"));
        }
        let windows = [Some(self.base_timeout_secs), self.consistently_window_secs];
        for secs in windows.into_iter().flatten() {
            if scale_timeout(Duration::from_secs(secs), self.timeout_scale).is_none() {
                return Err(ConfigError::Invalid {
                    key: "timeout_scale",
                    reason: format!(
                        "{secs}s scaled by {} exceeds {:?}",
                        self.timeout_scale, MAX_TIMEOUT
                    ),
                });
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms", "must be positive"));
        }
        if self.num_insertions == 0 {
            return Err(invalid("num_insertions", "must be positive"));
        }
        if self.max_key_length == 0 {
            return Err(invalid("max_key_length", "must be positive"));
        }
        if self.max_key_length > KEY_COLUMN_WIDTH {
            return Err(ConfigError::Invalid {
                key: "max_key_length",
                reason: format!("must not exceed the key column width of {KEY_COLUMN_WIDTH}"),
            });
        }
        if self.api.is_some() && (self.admin_user.is_none() || self.admin_password.is_none()) {
            return Err(invalid(
                "admin_user",
                "admin_user and admin_password are required when api is set",
            ));
        }
        Ok(())
    }

    /// Base timeout multiplied by `timeout_scale`
    #[must_use]
    pub fn scaled_timeout(&self) -> Duration {
        self.eventually_policy().timeout
    }

    /// Pause between polls
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Policy for eventually-matches assertions
    #[must_use]
    pub fn eventually_policy(&self) -> PollPolicy {
        PollPolicy::new(Duration::from_secs(self.base_timeout_secs), self.poll_interval())
            .scaled(self.timeout_scale)
    }

    /// Policy for consistently-not-matches assertions
    #[must_use]
    pub fn consistently_policy(&self) -> PollPolicy {
        let window = self
            .consistently_window_secs
            .unwrap_or(self.base_timeout_secs);
        PollPolicy::new(Duration::from_secs(window), self.poll_interval()).scaled(self.timeout_scale)
    }

    /// Per-request probe timeout
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Org/space settings, if the suite should manage its own
    #[must_use]
    pub fn context_settings(&self) -> Option<ContextSettings> {
        let api = self.api.clone()?;
        Some(ContextSettings {
            api,
            admin_user: self.admin_user.clone()?,
            admin_password: self.admin_password.clone()?,
            skip_ssl_validation: self.skip_ssl_validation,
            org_prefix: self.org_prefix.clone(),
        })
    }

    /// Copy safe to print
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.admin_password.is_some() {
            copy.admin_password = Some("<redacted>".to_string());
        }
        copy
    }
}
