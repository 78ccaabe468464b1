use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use recharge_limit::LimiterConfig;
use url::Url;

use crate::error::RechargeError;
use crate::error::Result;

pub const DEFAULT_BASE_URL: &str = "https://api.rechargeapps.com";
pub const DEFAULT_API_VERSION: &str = "2021-11";
pub const DEFAULT_MAX_DEPTH: usize = 100;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything a [`crate::RechargeClient`] needs at construction.
#[derive(Clone, PartialEq)]
pub struct ClientConfig {
    pub(crate) access_token: String,
    pub(crate) base_url: String,
    pub(crate) api_version: Option<String>,
    pub(crate) max_depth: usize,
    pub(crate) limits: LimiterConfig,
    pub(crate) timeout: Option<Duration>,
}

// Keep the access token out of logs.
impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("access_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("api_version", &self.api_version)
            .field("max_depth", &self.max_depth)
            .field("limits", &self.limits)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: Some(DEFAULT_API_VERSION.to_string()),
            max_depth: DEFAULT_MAX_DEPTH,
            limits: LimiterConfig::default(),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Reads the configuration from `RECHARGE_*` environment variables.
    ///
    /// `RECHARGE_ACCESS_TOKEN` is required. `RECHARGE_BASE_URL`,
    /// `RECHARGE_API_VERSION`, `RECHARGE_MAX_QUEUE_DEPTH` and
    /// `RECHARGE_HTTP_TIMEOUT_SECS` override the defaults; a timeout of `0`
    /// disables it.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("RECHARGE_ACCESS_TOKEN")
            .filter(|token| !token.is_empty())
            .ok_or_else(|| RechargeError::Config("RECHARGE_ACCESS_TOKEN is not set".to_string()))?;
        let mut config = Self::new(token);

        if let Some(base_url) = lookup("RECHARGE_BASE_URL") {
            config = config.with_base_url(base_url);
        }
        if let Some(version) = lookup("RECHARGE_API_VERSION") {
            config = config.with_api_version((!version.is_empty()).then_some(version));
        }
        if let Some(depth) = lookup("RECHARGE_MAX_QUEUE_DEPTH") {
            config = config.with_max_depth(parse("RECHARGE_MAX_QUEUE_DEPTH", &depth)?);
        }
        if let Some(secs) = lookup("RECHARGE_HTTP_TIMEOUT_SECS") {
            let secs: u64 = parse("RECHARGE_HTTP_TIMEOUT_SECS", &secs)?;
            config = config.with_timeout((secs > 0).then(|| Duration::from_secs(secs)));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the version tag header; `None` omits the header.
    pub fn with_api_version(mut self, api_version: Option<String>) -> Self {
        self.api_version = api_version;
        self
    }

    /// Bounds the number of requests waiting behind the one in flight.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_limits(mut self, limits: LimiterConfig) -> Self {
        self.limits = limits;
        self
    }

    /// Per-call transport timeout; `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn limits(&self) -> &LimiterConfig {
        &self.limits
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.access_token.is_empty() {
            return Err(RechargeError::Config("access token is empty".to_string()));
        }
        if self.max_depth == 0 {
            return Err(RechargeError::Config(
                "max queue depth must be at least 1".to_string(),
            ));
        }
        let url = Url::parse(&self.base_url)
            .map_err(|err| RechargeError::Config(format!("base url {}: {err}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RechargeError::Config(format!(
                "base url {} must be http(s)",
                self.base_url
            )));
        }
        Ok(())
    }
}

fn parse<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err| RechargeError::Config(format!("{key}={raw}: {err}")))
}
