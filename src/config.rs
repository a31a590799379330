//! Client configuration: backend location, deadlines, and token freshness windows.

// std
use std::env;
// self
use crate::{_prelude::*, auth::DeviceId, error::ConfigError};

/// Environment variable holding the backend base URL.
pub const ENV_BASE_URL: &str = "ELD_API_BASE_URL";
/// Environment variable overriding the request timeout, in whole seconds.
pub const ENV_TIMEOUT_SECS: &str = "ELD_API_TIMEOUT_SECS";
/// Environment variable holding the app version reported on every call.
pub const ENV_APP_VERSION: &str = "ELD_APP_VERSION";
/// Environment variable holding the default device identity.
pub const ENV_DEVICE_ID: &str = "ELD_DEVICE_ID";

/// Immutable settings shared by the session coordinator, pipeline, and uploader.
#[derive(Clone, Debug)]
pub struct ClientConfig {
	/// Environment-selected backend root; endpoint paths are appended to it.
	pub base_url: Url,
	/// Default per-call deadline; also bounds refresh calls.
	pub request_timeout: StdDuration,
	/// Path of the token refresh endpoint.
	pub refresh_path: String,
	/// Pre-expiry window inside which an access token counts as stale.
	pub stale_margin: Duration,
	/// Lifetime assumed when a token response omits `expires_in`.
	pub access_token_lifetime: Duration,
	/// Period of the proactive freshness check.
	pub refresh_interval: StdDuration,
	/// `X-App-Version` sent when a call does not supply one.
	pub app_version: Option<String>,
	/// `X-Device-ID` sent when a call does not supply one.
	pub device_id: Option<DeviceId>,
}
impl ClientConfig {
	/// Default per-call deadline.
	pub const DEFAULT_REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(30);
	/// Default refresh endpoint path.
	pub const DEFAULT_REFRESH_PATH: &str = "/refresh";
	/// Default pre-expiry margin.
	pub const DEFAULT_STALE_MARGIN: Duration = Duration::minutes(2);
	/// Nominal server-side access token lifetime.
	pub const DEFAULT_ACCESS_TOKEN_LIFETIME: Duration = Duration::minutes(10);
	/// Default proactive check period.
	pub const DEFAULT_REFRESH_INTERVAL: StdDuration = StdDuration::from_secs(8 * 60);

	/// Returns a builder rooted at `base_url`.
	pub fn builder(base_url: Url) -> ClientConfigBuilder {
		ClientConfigBuilder::new(base_url)
	}

	/// Builds a configuration from `ELD_API_*` environment variables.
	pub fn from_env() -> Result<Self, ConfigError> {
		let raw_base =
			env::var(ENV_BASE_URL).map_err(|_| ConfigError::MissingEnv { name: ENV_BASE_URL })?;
		let base_url =
			Url::parse(raw_base.trim()).map_err(|source| ConfigError::InvalidBaseUrl { source })?;
		let mut builder = Self::builder(base_url);

		if let Ok(raw) = env::var(ENV_TIMEOUT_SECS) {
			let secs = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
				name: ENV_TIMEOUT_SECS,
				value: raw.clone(),
			})?;

			builder = builder.request_timeout(StdDuration::from_secs(secs));
		}
		if let Ok(version) = env::var(ENV_APP_VERSION) {
			builder = builder.app_version(version);
		}
		if let Ok(raw) = env::var(ENV_DEVICE_ID) {
			builder = builder.device_id(DeviceId::new(raw.trim())?);
		}

		builder.build()
	}

	/// Resolves `path` against the base URL, keeping any base path prefix.
	pub fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
		let joined = format!(
			"{}/{}",
			self.base_url.as_str().trim_end_matches('/'),
			path.trim_start_matches('/')
		);

		Url::parse(&joined)
			.map_err(|source| ConfigError::InvalidPath { path: path.to_owned(), source })
	}

	/// Returns `true` when `path` addresses the refresh endpoint.
	pub fn is_refresh_path(&self, path: &str) -> bool {
		normalize_path(path) == normalize_path(&self.refresh_path)
	}
}

/// Builder for [`ClientConfig`] values.
#[derive(Debug)]
pub struct ClientConfigBuilder {
	config: ClientConfig,
}
impl ClientConfigBuilder {
	fn new(base_url: Url) -> Self {
		Self {
			config: ClientConfig {
				base_url,
				request_timeout: ClientConfig::DEFAULT_REQUEST_TIMEOUT,
				refresh_path: ClientConfig::DEFAULT_REFRESH_PATH.into(),
				stale_margin: ClientConfig::DEFAULT_STALE_MARGIN,
				access_token_lifetime: ClientConfig::DEFAULT_ACCESS_TOKEN_LIFETIME,
				refresh_interval: ClientConfig::DEFAULT_REFRESH_INTERVAL,
				app_version: None,
				device_id: None,
			},
		}
	}

	/// Overrides the default per-call deadline.
	pub fn request_timeout(mut self, timeout: StdDuration) -> Self {
		self.config.request_timeout = timeout;

		self
	}

	/// Overrides the refresh endpoint path.
	pub fn refresh_path(mut self, path: impl Into<String>) -> Self {
		self.config.refresh_path = path.into();

		self
	}

	/// Overrides the pre-expiry margin.
	pub fn stale_margin(mut self, margin: Duration) -> Self {
		self.config.stale_margin = margin;

		self
	}

	/// Overrides the lifetime assumed when `expires_in` is missing.
	pub fn access_token_lifetime(mut self, lifetime: Duration) -> Self {
		self.config.access_token_lifetime = lifetime;

		self
	}

	/// Overrides the proactive check period.
	pub fn refresh_interval(mut self, interval: StdDuration) -> Self {
		self.config.refresh_interval = interval;

		self
	}

	/// Sets the default `X-App-Version` value.
	pub fn app_version(mut self, version: impl Into<String>) -> Self {
		self.config.app_version = Some(version.into());

		self
	}

	/// Sets the default `X-Device-ID` value.
	pub fn device_id(mut self, device_id: DeviceId) -> Self {
		self.config.device_id = Some(device_id);

		self
	}

	/// Validates and returns the configuration.
	pub fn build(self) -> Result<ClientConfig, ConfigError> {
		let config = self.config;

		if !matches!(config.base_url.scheme(), "http" | "https") {
			return Err(ConfigError::UnsupportedScheme { url: config.base_url.to_string() });
		}
		if config.request_timeout.is_zero() {
			return Err(ConfigError::NonPositiveDuration { setting: "request_timeout" });
		}
		if config.refresh_interval.is_zero() {
			return Err(ConfigError::NonPositiveDuration { setting: "refresh_interval" });
		}
		if !config.access_token_lifetime.is_positive() {
			return Err(ConfigError::NonPositiveDuration { setting: "access_token_lifetime" });
		}
		if config.stale_margin.is_negative() {
			return Err(ConfigError::NonPositiveDuration { setting: "stale_margin" });
		}

		config.endpoint(&config.refresh_path)?;

		Ok(config)
	}
}

/// Flush triggers for the telemetry batch uploader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlushPolicy {
	/// Period of the timed flush.
	pub interval: StdDuration,
	/// Buffer length that triggers an immediate flush.
	pub threshold: usize,
	/// Path of the batch endpoint.
	pub batch_path: String,
}
impl FlushPolicy {
	/// Default timed flush period.
	pub const DEFAULT_INTERVAL: StdDuration = StdDuration::from_secs(30);
	/// Default size threshold.
	pub const DEFAULT_THRESHOLD: usize = 10;
	/// Default batch endpoint path.
	pub const DEFAULT_BATCH_PATH: &str = "/location/batch";

	/// Overrides the timed flush period; a zero period is raised to one second.
	pub fn with_interval(mut self, interval: StdDuration) -> Self {
		self.interval = if interval.is_zero() { StdDuration::from_secs(1) } else { interval };

		self
	}

	/// Overrides the size threshold; values below 1 are raised to 1.
	pub fn with_threshold(mut self, threshold: usize) -> Self {
		self.threshold = threshold.max(1);

		self
	}

	/// Overrides the batch endpoint path.
	pub fn with_batch_path(mut self, path: impl Into<String>) -> Self {
		self.batch_path = path.into();

		self
	}
}
impl Default for FlushPolicy {
	fn default() -> Self {
		Self {
			interval: Self::DEFAULT_INTERVAL,
			threshold: Self::DEFAULT_THRESHOLD,
			batch_path: Self::DEFAULT_BATCH_PATH.into(),
		}
	}
}

fn normalize_path(path: &str) -> &str {
	path.split(['?', '#']).next().unwrap_or_default().trim_matches('/')
}
