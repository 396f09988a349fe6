//! Client configuration
//!
//! Settings are resolved in three layers: built-in defaults, an optional TOML
//! file, then `CONFSEC_*` environment variables.

use std::env;
use std::path::Path;

use config::{Config, File};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// API key
pub const API_KEY_ENV_VAR: &str = "CONFSEC_API_KEY";
/// Number of requests the engine keeps in flight
pub const CONCURRENT_REQUESTS_TARGET_ENV_VAR: &str = "CONFSEC_CONCURRENT_REQUESTS_TARGET";
/// Maximum candidate nodes per request
pub const MAX_CANDIDATE_NODES_ENV_VAR: &str = "CONFSEC_MAX_CANDIDATE_NODES";
/// Comma-separated default node tags
pub const DEFAULT_NODE_TAGS_ENV_VAR: &str = "CONFSEC_DEFAULT_NODE_TAGS";
/// Engine environment
pub const ENV_ENV_VAR: &str = "CONFSEC_ENV";
/// Exact OIDC issuer of the identity policy
pub const OIDC_ISSUER_ENV_VAR: &str = "CONFSEC_OIDC_ISSUER";
/// OIDC issuer pattern of the identity policy
pub const OIDC_ISSUER_REGEX_ENV_VAR: &str = "CONFSEC_OIDC_ISSUER_REGEX";
/// Exact OIDC subject of the identity policy
pub const OIDC_SUBJECT_ENV_VAR: &str = "CONFSEC_OIDC_SUBJECT";
/// OIDC subject pattern of the identity policy
pub const OIDC_SUBJECT_REGEX_ENV_VAR: &str = "CONFSEC_OIDC_SUBJECT_REGEX";

/// Default number of requests the engine keeps in flight
pub const DEFAULT_CONCURRENT_REQUESTS_TARGET: u32 = 10;
/// Default number of candidate nodes considered per request
pub const DEFAULT_MAX_CANDIDATE_NODES: u32 = 5;
/// Default engine environment
pub const DEFAULT_ENV: &str = "prod";

/// Identity the compute nodes' attestation must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPolicy {
    /// Exact OIDC issuer
    pub oidc_issuer: Option<String>,
    /// OIDC issuer pattern
    pub oidc_issuer_regex: Option<String>,
    /// Exact OIDC subject
    pub oidc_subject: Option<String>,
    /// OIDC subject pattern
    pub oidc_subject_regex: Option<String>,
}

impl IdentityPolicy {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.oidc_issuer.is_none()
            && self.oidc_issuer_regex.is_none()
            && self.oidc_subject.is_none()
            && self.oidc_subject_regex.is_none()
    }

    fn from_env(mut self) -> Self {
        if let Ok(issuer) = env::var(OIDC_ISSUER_ENV_VAR) {
            self.oidc_issuer = Some(issuer);
        }
        if let Ok(issuer_regex) = env::var(OIDC_ISSUER_REGEX_ENV_VAR) {
            self.oidc_issuer_regex = Some(issuer_regex);
        }
        if let Ok(subject) = env::var(OIDC_SUBJECT_ENV_VAR) {
            self.oidc_subject = Some(subject);
        }
        if let Ok(subject_regex) = env::var(OIDC_SUBJECT_REGEX_ENV_VAR) {
            self.oidc_subject_regex = Some(subject_regex);
        }
        self
    }
}

/// Configuration used to create a [`crate::ConfsecClient`]
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// API key, required
    pub api_key: String,
    /// Number of requests the engine aims to keep in flight
    pub concurrent_requests_target: u32,
    /// Maximum number of candidate nodes per request
    pub max_candidate_nodes: u32,
    /// Node tags applied to every request
    pub default_node_tags: Vec<String>,
    /// Engine environment
    pub env: String,
    /// Attestation identity policy
    pub identity_policy: Option<IdentityPolicy>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("concurrent_requests_target", &self.concurrent_requests_target)
            .field("max_candidate_nodes", &self.max_candidate_nodes)
            .field("default_node_tags", &self.default_node_tags)
            .field("env", &self.env)
            .field("identity_policy", &self.identity_policy)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            concurrent_requests_target: DEFAULT_CONCURRENT_REQUESTS_TARGET,
            max_candidate_nodes: DEFAULT_MAX_CANDIDATE_NODES,
            default_node_tags: Vec::new(),
            env: DEFAULT_ENV.to_string(),
            identity_policy: None,
        }
    }
}

impl ClientConfig {
    /// Defaults with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Set the concurrency target
    pub fn concurrent_requests_target(mut self, target: u32) -> Self {
        self.concurrent_requests_target = target;
        self
    }

    /// Set the maximum number of candidate nodes
    pub fn max_candidate_nodes(mut self, max: u32) -> Self {
        self.max_candidate_nodes = max;
        self
    }

    /// Set the default node tags
    pub fn default_node_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_node_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the engine environment
    pub fn env(mut self, env: impl Into<String>) -> Self {
        self.env = env.into();
        self
    }

    /// Set the attestation identity policy
    pub fn identity_policy(mut self, policy: IdentityPolicy) -> Self {
        self.identity_policy = Some(policy);
        self
    }

    /// Load defaults overridden by a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_string_lossy().to_string();
        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(File::with_name(&path))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Override fields from `CONFSEC_*` environment variables
    pub fn from_env(mut self) -> Result<Self> {
        if let Ok(api_key) = env::var(API_KEY_ENV_VAR) {
            self.api_key = api_key;
        }

        if let Ok(target) = env::var(CONCURRENT_REQUESTS_TARGET_ENV_VAR) {
            self.concurrent_requests_target = target.parse().map_err(|_| {
                Error::Config(format!(
                    "{CONCURRENT_REQUESTS_TARGET_ENV_VAR} must be a non-negative integer"
                ))
            })?;
        }

        if let Ok(max) = env::var(MAX_CANDIDATE_NODES_ENV_VAR) {
            self.max_candidate_nodes = max.parse().map_err(|_| {
                Error::Config(format!(
                    "{MAX_CANDIDATE_NODES_ENV_VAR} must be a non-negative integer"
                ))
            })?;
        }

        if let Ok(tags) = env::var(DEFAULT_NODE_TAGS_ENV_VAR) {
            self.default_node_tags = tags
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(ToString::to_string)
                .collect();
        }

        if let Ok(env) = env::var(ENV_ENV_VAR) {
            self.env = env;
        }

        let policy = self
            .identity_policy
            .take()
            .unwrap_or_default()
            .from_env();
        if !policy.is_empty() {
            self.identity_policy = Some(policy);
        }

        Ok(self)
    }

    /// Check the fields the engine cannot do without
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config("API key is required".to_string()));
        }
        if self.env.trim().is_empty() {
            return Err(Error::Config("environment must not be empty".to_string()));
        }
        Ok(())
    }
}
