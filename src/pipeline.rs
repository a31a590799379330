//! Authenticated request pipeline with a bounded retry-after-refresh protocol.
//!
//! Every call runs through a small state machine:
//!
//! ```text
//! ATTEMPT --401--> REFRESH --ok--> RETRY_ONCE --401--> TERMINAL
//!    |                |                |
//!    |                +--failed--> TERMINAL
//!    +--other--> FINISH <--other-------+
//! ```
//!
//! `RETRY_ONCE` has no transition back to `REFRESH`, so a request reaches the transport at
//! most twice. Both attempts carry the same [`PendingRequest`], which keeps the
//! idempotency key identical across the retry while headers are rebuilt with the refreshed
//! token.

pub mod classify;

// crates.io
use ::http::{
	HeaderMap, HeaderName, HeaderValue, Method, StatusCode,
	header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
};
// self
use crate::{
	_prelude::*,
	auth::{AuthScheme, DeviceId},
	config::ClientConfig,
	error::ConfigError,
	http::{HttpRequest, HttpResponse, HttpTransport},
	idempotency::IdempotencyKey,
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
	session::{LogoutReason, SessionCoordinator},
};

/// `Idempotency-Key` header name.
pub const IDEMPOTENCY_KEY: &str = "idempotency-key";
/// `X-Device-ID` header name.
pub const X_DEVICE_ID: &str = "x-device-id";
/// `X-App-Version` header name.
pub const X_APP_VERSION: &str = "x-app-version";

const APPLICATION_JSON: &str = "application/json";

/// Successful pipeline result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse<T> {
	/// Always `true`; failures surface as [`Error`].
	pub success: bool,
	/// HTTP status code of the final attempt.
	pub status: u16,
	/// Decoded response body.
	pub data: T,
	/// Top-level `message` field of the body, if any.
	pub message: Option<String>,
}

/// Per-call metadata supplied by the caller.
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
	/// Key naming the logical action; required for side-effecting mutations.
	pub idempotency_key: Option<IdempotencyKey>,
	/// Overrides the configured `X-Device-ID`.
	pub device_id: Option<DeviceId>,
	/// Overrides the configured `X-App-Version`.
	pub app_version: Option<String>,
	/// Overrides the configured request timeout.
	pub timeout: Option<StdDuration>,
}
impl RequestOptions {
	/// Options carrying `key` as the idempotency key.
	pub fn idempotent(key: IdempotencyKey) -> Self {
		Self { idempotency_key: Some(key), ..Default::default() }
	}

	/// Sets the idempotency key.
	pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
		self.idempotency_key = Some(key);

		self
	}

	/// Sets the device identity header.
	pub fn with_device_id(mut self, device_id: DeviceId) -> Self {
		self.device_id = Some(device_id);

		self
	}

	/// Sets the app version header.
	pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
		self.app_version = Some(version.into());

		self
	}

	/// Sets the per-call timeout.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}
}

/// One logical call, reused verbatim for its single permitted retry.
#[derive(Clone, Debug)]
pub struct PendingRequest {
	/// HTTP method.
	pub method: Method,
	/// Endpoint path relative to the base URL.
	pub path: String,
	/// Extra headers sent with every attempt.
	pub headers: HeaderMap,
	/// Serialized JSON body.
	pub body: Option<Vec<u8>>,
	/// Idempotency key shared by every attempt.
	pub idempotency_key: Option<IdempotencyKey>,
	/// Device identity header value; `None` falls back to the configured device.
	pub device_id: Option<DeviceId>,
	/// App version header value; `None` falls back to the configured version.
	pub app_version: Option<String>,
	/// Deadline applied to each attempt; `None` uses the configured request timeout.
	pub timeout: Option<StdDuration>,
}
impl PendingRequest {
	/// Creates a request with no body that inherits the pipeline's configured defaults.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			headers: HeaderMap::new(),
			body: None,
			idempotency_key: None,
			device_id: None,
			app_version: None,
			timeout: None,
		}
	}

	/// Serializes `body` as the JSON payload.
	pub fn with_json<B>(mut self, body: &B) -> Result<Self>
	where
		B: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(body).map_err(ConfigError::from)?);

		Ok(self)
	}

	/// Applies caller options, leaving unset fields untouched.
	pub fn with_options(mut self, options: RequestOptions) -> Self {
		if let Some(key) = options.idempotency_key {
			self.idempotency_key = Some(key);
		}
		if let Some(device_id) = options.device_id {
			self.device_id = Some(device_id);
		}
		if let Some(version) = options.app_version {
			self.app_version = Some(version);
		}
		if let Some(timeout) = options.timeout {
			self.timeout = Some(timeout);
		}

		self
	}
}

enum Step {
	Attempt,
	Refresh(HttpResponse),
	RetryOnce,
	Finish(HttpResponse),
	Terminal(LogoutReason, HttpResponse),
}

/// Issues authenticated backend calls.
#[derive(Clone)]
pub struct RequestPipeline {
	config: Arc<ClientConfig>,
	session: Arc<SessionCoordinator>,
	transport: Arc<dyn HttpTransport>,
}
impl RequestPipeline {
	/// Creates a pipeline sharing `session` for credentials and `transport` for I/O.
	pub fn new(
		config: Arc<ClientConfig>,
		session: Arc<SessionCoordinator>,
		transport: Arc<dyn HttpTransport>,
	) -> Self {
		Self { config, session, transport }
	}

	/// Shared configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Coordinator backing this pipeline.
	pub fn session(&self) -> &Arc<SessionCoordinator> {
		&self.session
	}

	/// `GET path`.
	pub async fn get<T>(&self, path: &str, options: RequestOptions) -> Result<ApiResponse<T>>
	where
		T: DeserializeOwned,
	{
		self.send(PendingRequest::new(Method::GET, path).with_options(options)).await
	}

	/// `POST path` with a JSON body.
	pub async fn post<B, T>(
		&self,
		path: &str,
		body: &B,
		options: RequestOptions,
	) -> Result<ApiResponse<T>>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		let request =
			PendingRequest::new(Method::POST, path).with_json(body)?.with_options(options);

		self.send(request).await
	}

	/// `PUT path` with a JSON body.
	pub async fn put<B, T>(
		&self,
		path: &str,
		body: &B,
		options: RequestOptions,
	) -> Result<ApiResponse<T>>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		let request =
			PendingRequest::new(Method::PUT, path).with_json(body)?.with_options(options);

		self.send(request).await
	}

	/// `PATCH path` with a JSON body.
	pub async fn patch<B, T>(
		&self,
		path: &str,
		body: &B,
		options: RequestOptions,
	) -> Result<ApiResponse<T>>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		let request =
			PendingRequest::new(Method::PATCH, path).with_json(body)?.with_options(options);

		self.send(request).await
	}

	/// `DELETE path`.
	pub async fn delete<T>(&self, path: &str, options: RequestOptions) -> Result<ApiResponse<T>>
	where
		T: DeserializeOwned,
	{
		self.send(PendingRequest::new(Method::DELETE, path).with_options(options)).await
	}

	/// Runs `request` through the refresh-aware state machine and decodes the result.
	pub async fn send<T>(&self, request: PendingRequest) -> Result<ApiResponse<T>>
	where
		T: DeserializeOwned,
	{
		const KIND: OperationKind = OperationKind::Request;

		let span = OperationSpan::new(KIND, "send");

		obs::record_outcome(KIND, OperationOutcome::Attempt);

		let result = span
			.instrument(self.run(&request))
			.await
			.and_then(classify::into_api_response);

		match &result {
			Ok(_) => obs::record_outcome(KIND, OperationOutcome::Success),
			Err(e) => {
				obs::record_outcome(KIND, OperationOutcome::Failure);
				obs::debug_event(
					KIND,
					&format_args!("{} {} failed ({}): {e}", request.method, request.path, e.kind()),
				);
			},
		}

		result
	}

	async fn run(&self, request: &PendingRequest) -> Result<HttpResponse> {
		let targets_refresh = self.config.is_refresh_path(&request.path);

		// A failed proactive refresh is not fatal; the reactive 401 path decides.
		if !targets_refresh {
			self.session.ensure_fresh().await;
		}

		let mut step = Step::Attempt;

		loop {
			step = match step {
				Step::Attempt => {
					let response = self.dispatch(request, targets_refresh).await?;

					match response.status() {
						StatusCode::UNAUTHORIZED if targets_refresh =>
							Step::Terminal(LogoutReason::RefreshEndpointRejected, response),
						StatusCode::UNAUTHORIZED => Step::Refresh(response),
						_ => Step::Finish(response),
					}
				},
				Step::Refresh(rejected) =>
					if self.session.refresh().await {
						Step::RetryOnce
					} else {
						Step::Terminal(LogoutReason::RefreshUnavailable, rejected)
					},
				Step::RetryOnce => {
					let response = self.dispatch(request, false).await?;

					if response.status() == StatusCode::UNAUTHORIZED {
						Step::Terminal(LogoutReason::RetryRejected, response)
					} else {
						Step::Finish(response)
					}
				},
				Step::Finish(response) if response.status().is_success() => return Ok(response),
				Step::Finish(response) =>
					return Err(classify::failure(response.status(), response.body())),
				Step::Terminal(reason, response) => {
					self.session.end_session(reason).await;

					return Err(classify::failure(StatusCode::UNAUTHORIZED, response.body()));
				},
			};
		}
	}

	async fn dispatch(
		&self,
		request: &PendingRequest,
		targets_refresh: bool,
	) -> Result<HttpResponse> {
		let http_request = self.build(request, targets_refresh).await?;
		let timeout = request.timeout.unwrap_or(self.config.request_timeout);

		match tokio::time::timeout(timeout, self.transport.execute(http_request)).await {
			Ok(result) => Ok(result?),
			Err(_) => Err(Error::Timeout { after: timeout }),
		}
	}

	// Headers are rebuilt per attempt so a retry picks up the refreshed token.
	async fn build(&self, request: &PendingRequest, targets_refresh: bool) -> Result<HttpRequest> {
		let url = self.config.endpoint(&request.path)?;
		let mut headers = request.headers.clone();
		let device_id = request.device_id.as_ref().or(self.config.device_id.as_ref());
		let app_version = request.app_version.as_ref().or(self.config.app_version.as_ref());

		headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
		headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));

		if !targets_refresh {
			if let Some(token) = self.session.access_token().await? {
				let value = header_value("Authorization", &AuthScheme::header_value(&token))?;

				headers.insert(AUTHORIZATION, value);
			}
		}
		if let Some(key) = &request.idempotency_key {
			headers.insert(
				HeaderName::from_static(IDEMPOTENCY_KEY),
				header_value("Idempotency-Key", key.as_str())?,
			);
		}
		if let Some(device_id) = device_id {
			headers
				.insert(HeaderName::from_static(X_DEVICE_ID), header_value("X-Device-ID", device_id)?);
		}
		if let Some(version) = app_version {
			headers.insert(
				HeaderName::from_static(X_APP_VERSION),
				header_value("X-App-Version", version)?,
			);
		}

		let mut http_request = ::http::Request::builder()
			.method(request.method.clone())
			.uri(url.as_str())
			.body(request.body.clone().unwrap_or_default())
			.map_err(ConfigError::from)?;

		*http_request.headers_mut() = headers;

		Ok(http_request)
	}
}

impl Debug for RequestPipeline {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestPipeline")
			.field("base_url", &self.config.base_url.as_str())
			.field("request_timeout", &self.config.request_timeout)
			.finish()
	}
}

fn header_value(name: &'static str, value: &str) -> Result<HeaderValue, ConfigError> {
	let mut value = HeaderValue::from_str(value)
		.map_err(|source| ConfigError::InvalidHeader { name, source })?;

	if name == "Authorization" {
		value.set_sensitive(true);
	}

	Ok(value)
}
