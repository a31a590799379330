//! Gateway-level error types shared across the session, pipeline, and telemetry layers.

// self
use crate::_prelude::*;

/// Gateway-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Field-level validation messages keyed by field name.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Coarse classification callers map onto user-visible behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
	/// Transport failure; no response was received.
	Network,
	/// Deadline exceeded and the request was aborted.
	Timeout,
	/// Credentials were rejected after the refresh-and-retry path was exhausted.
	Unauthorized,
	/// Client-side request problem, usually with field errors attached.
	Validation,
	/// Upstream 5xx failure.
	Server,
	/// Anything the gateway could not classify.
	Unknown,
}
impl ErrorKind {
	/// Returns a stable label suitable for logs or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ErrorKind::Network => "network",
			ErrorKind::Timeout => "timeout",
			ErrorKind::Unauthorized => "unauthorized",
			ErrorKind::Validation => "validation",
			ErrorKind::Server => "server",
			ErrorKind::Unknown => "unknown",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Canonical gateway error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Credential storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The request exceeded its deadline and was cancelled.
	#[error("Request timed out after {}ms.", .after.as_millis())]
	Timeout {
		/// Deadline that elapsed.
		after: StdDuration,
	},
	/// The session is no longer authorized.
	#[error("Unauthorized: {message}.")]
	Unauthorized {
		/// Server- or gateway-supplied message.
		message: String,
	},
	/// The server rejected the request payload.
	#[error("Validation failed ({status}): {message}.")]
	Validation {
		/// HTTP status code.
		status: u16,
		/// Server-supplied message.
		message: String,
		/// Field-level messages, possibly empty.
		field_errors: FieldErrors,
	},
	/// The server failed while handling the request.
	#[error("Server error ({status}): {message}.")]
	Server {
		/// HTTP status code.
		status: u16,
		/// Server-supplied message.
		message: String,
	},
	/// Response the gateway could not classify.
	#[error("Unexpected response: {message}.")]
	Unknown {
		/// HTTP status code, when a response was received.
		status: Option<u16>,
		/// Server- or gateway-supplied message.
		message: String,
	},
	/// A successful response carried a body that did not match the expected shape.
	#[error("Response body could not be decoded at `{}`.", .source.path())]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the response.
		status: u16,
	},
}
impl Error {
	/// Classifies the error into one of the caller-facing kinds.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Transport(_) => ErrorKind::Network,
			Self::Timeout { .. } => ErrorKind::Timeout,
			Self::Unauthorized { .. } => ErrorKind::Unauthorized,
			Self::Validation { .. } => ErrorKind::Validation,
			Self::Server { .. } => ErrorKind::Server,
			Self::Storage(_) | Self::Config(_) | Self::Unknown { .. } | Self::Decode { .. } =>
				ErrorKind::Unknown,
		}
	}

	/// HTTP-status-shaped code; `0` when no response was involved.
	pub fn code(&self) -> u16 {
		match self {
			Self::Timeout { .. } => 408,
			Self::Unauthorized { .. } => 401,
			Self::Validation { status, .. } | Self::Server { status, .. } => *status,
			Self::Decode { status, .. } => *status,
			Self::Unknown { status, .. } => status.unwrap_or(0),
			Self::Storage(_) | Self::Config(_) | Self::Transport(_) => 0,
		}
	}

	/// Field-level messages attached to validation failures.
	pub fn field_errors(&self) -> Option<&FieldErrors> {
		match self {
			Self::Validation { field_errors, .. } if !field_errors.is_empty() => Some(field_errors),
			_ => None,
		}
	}

	/// Returns `true` when the caller should offer a retry affordance.
	pub fn is_retryable(&self) -> bool {
		matches!(self.kind(), ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Server)
	}
}

/// Configuration and request-construction failures raised by the gateway.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] ::http::Error),
	/// Base URL cannot be parsed.
	#[error("Base URL is invalid.")]
	InvalidBaseUrl {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Base URL uses a scheme other than http/https.
	#[error("Base URL must use http or https: {url}.")]
	UnsupportedScheme {
		/// Offending URL.
		url: String,
	},
	/// Endpoint path cannot be joined onto the base URL.
	#[error("Endpoint path `{path}` is invalid.")]
	InvalidPath {
		/// Offending path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Header value contains characters HTTP does not allow.
	#[error("Header `{name}` has an invalid value.")]
	InvalidHeader {
		/// Header name.
		name: &'static str,
		/// Underlying validation failure.
		#[source]
		source: ::http::header::InvalidHeaderValue,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	SerializeBody(#[from] serde_json::Error),
	/// Identifier validation failed.
	#[error(transparent)]
	Identifier(#[from] crate::auth::IdentifierError),
	/// Required environment variable is absent.
	#[error("Environment variable `{name}` is not set.")]
	MissingEnv {
		/// Variable name.
		name: &'static str,
	},
	/// Environment variable is present but unusable.
	#[error("Environment variable `{name}` is invalid: {value}.")]
	InvalidEnv {
		/// Variable name.
		name: &'static str,
		/// Offending value.
		value: String,
	},
	/// A duration setting must be positive.
	#[error("The {setting} setting must be positive.")]
	NonPositiveDuration {
		/// Setting label.
		setting: &'static str,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the backend.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the backend.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
