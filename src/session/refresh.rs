//! Single-flight access token refresh.
//!
//! The first caller of [`SessionCoordinator::refresh`] becomes the leader: it marks the
//! refresh state as locked, publishes a watch handle, and performs the refresh call. Every
//! caller arriving while the lock is held subscribes to that handle instead of issuing its
//! own call, so all of them observe the leader's outcome. A drop guard releases the lock on
//! every exit path, including cancellation of the leader's future. Waiters that see the
//! channel close without an outcome take over and lead a new refresh, so cancelling one
//! caller never decides the outcome for the others.

// crates.io
use ::http::{
	Method, StatusCode,
	header::{ACCEPT, CONTENT_TYPE},
};
use tokio::sync::watch;
// self
use crate::{
	_prelude::*,
	auth::{CredentialState, TokenGrant, TokenSecret},
	error::ConfigError,
	http::HttpRequest,
	obs::{self, OperationKind, OperationOutcome, OperationSpan},
	pipeline::classify,
	session::{LogoutReason, SessionCoordinator},
};

type FlightReceiver = watch::Receiver<Option<bool>>;

/// Process-wide refresh lock; `locked` holds exactly when a flight handle is present.
#[derive(Debug, Default)]
pub(crate) struct RefreshState {
	in_flight: Option<FlightReceiver>,
}
impl RefreshState {
	pub(crate) fn is_locked(&self) -> bool {
		self.in_flight.is_some()
	}
}

enum FlightRole {
	Leader(watch::Sender<Option<bool>>),
	Follower(FlightReceiver),
}

/// Owns the leader's sender; the lock is cleared before the sender closes.
struct FlightRelease<'a> {
	state: &'a Mutex<RefreshState>,
	sender: watch::Sender<Option<bool>>,
}
impl Drop for FlightRelease<'_> {
	fn drop(&mut self) {
		self.state.lock().in_flight = None;
	}
}

#[derive(Debug)]
enum RefreshFailure {
	/// The backend rejected the refresh token; the session is over.
	Rejected,
	/// Network, timeout, or server trouble; stored credentials stay as they are.
	Recoverable(Error),
}

#[derive(Serialize)]
struct RefreshBody<'a> {
	refresh_token: &'a str,
}

impl SessionCoordinator {
	/// Refreshes the access token, joining any refresh already in flight.
	///
	/// Returns `true` when new credentials were stored. `false` either means the session was
	/// terminated (the logout handler has run) or the refresh failed recoverably and the
	/// stale credentials were left in place.
	pub async fn refresh(&self) -> bool {
		loop {
			match self.acquire_role() {
				FlightRole::Follower(mut receiver) => {
					self.metrics.record_joined();

					let outcome = receiver.wait_for(Option::is_some).await.map(|outcome| *outcome);

					if let Ok(outcome) = outcome {
						return outcome == Some(true);
					}

					// The leader was dropped before publishing; the lock is already clear.
					obs::debug_event(
						OperationKind::Refresh,
						&"refresh leader cancelled; taking over the flight",
					);
				},
				FlightRole::Leader(sender) => {
					let flight = FlightRelease { state: &self.refresh_state, sender };
					let refreshed = self.lead_refresh().await;

					flight.sender.send_replace(Some(refreshed));
					drop(flight);

					return refreshed;
				},
			}
		}
	}

	fn acquire_role(&self) -> FlightRole {
		let mut state = self.refresh_state.lock();

		match &state.in_flight {
			Some(receiver) => FlightRole::Follower(receiver.clone()),
			None => {
				let (sender, receiver) = watch::channel(None);

				state.in_flight = Some(receiver);

				FlightRole::Leader(sender)
			},
		}
	}

	async fn lead_refresh(&self) -> bool {
		const KIND: OperationKind = OperationKind::Refresh;

		let span = OperationSpan::new(KIND, "refresh");

		obs::record_outcome(KIND, OperationOutcome::Attempt);

		let refreshed = span.instrument(self.refresh_credentials()).await;

		if refreshed {
			self.metrics.record_success();
			obs::record_outcome(KIND, OperationOutcome::Success);
		} else {
			self.metrics.record_failure();
			obs::record_outcome(KIND, OperationOutcome::Failure);
		}

		refreshed
	}

	async fn refresh_credentials(&self) -> bool {
		let current = match self.store.get().await {
			Ok(current) => current,
			Err(e) => {
				obs::warn_event(
					OperationKind::Refresh,
					&format_args!("credential read failed: {e}"),
				);

				return false;
			},
		};
		let Some(refresh_token) = current.refresh_token else {
			self.end_session(LogoutReason::MissingRefreshToken).await;

			return false;
		};

		self.metrics.record_attempt();

		let grant = match self.request_grant(&refresh_token).await {
			Ok(grant) => grant,
			Err(RefreshFailure::Rejected) => {
				self.end_session(LogoutReason::RefreshRejected).await;

				return false;
			},
			Err(RefreshFailure::Recoverable(e)) => {
				obs::warn_event(
					OperationKind::Refresh,
					&format_args!("refresh failed, keeping stored credentials: {e}"),
				);

				return false;
			},
		};
		let mut next = CredentialState::from_grant(
			&grant,
			OffsetDateTime::now_utc(),
			self.config.access_token_lifetime,
		);

		// Backends that do not rotate omit the refresh token.
		if next.refresh_token.is_none() {
			next.refresh_token = Some(refresh_token);
		}

		match self.store.set(next).await {
			Ok(()) => true,
			Err(e) => {
				obs::warn_event(
					OperationKind::Refresh,
					&format_args!("refreshed credentials could not be stored: {e}"),
				);

				false
			},
		}
	}

	async fn request_grant(
		&self,
		refresh_token: &TokenSecret,
	) -> Result<TokenGrant, RefreshFailure> {
		let request =
			self.build_refresh_request(refresh_token).map_err(RefreshFailure::Recoverable)?;
		let timeout = self.config.request_timeout;
		let response = match tokio::time::timeout(timeout, self.transport.execute(request)).await {
			Ok(Ok(response)) => response,
			Ok(Err(e)) => return Err(RefreshFailure::Recoverable(e.into())),
			Err(_) => return Err(RefreshFailure::Recoverable(Error::Timeout { after: timeout })),
		};
		let status = response.status();

		if status == StatusCode::UNAUTHORIZED {
			return Err(RefreshFailure::Rejected);
		}
		if !status.is_success() {
			return Err(RefreshFailure::Recoverable(classify::failure(status, response.body())));
		}

		classify::decode::<TokenGrant>(status, response.body())
			.map_err(RefreshFailure::Recoverable)
	}

	// The refresh endpoint mints access tokens, so it never carries an Authorization header.
	fn build_refresh_request(&self, refresh_token: &TokenSecret) -> Result<HttpRequest> {
		let url = self.config.endpoint(&self.config.refresh_path)?;
		let body = serde_json::to_vec(&RefreshBody { refresh_token: refresh_token.expose() })
			.map_err(ConfigError::from)?;
		let request = ::http::Request::builder()
			.method(Method::POST)
			.uri(url.as_str())
			.header(CONTENT_TYPE, "application/json")
			.header(ACCEPT, "application/json")
			.body(body)
			.map_err(ConfigError::from)?;

		Ok(request)
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use ::http::header::AUTHORIZATION;
	use serde_json::{Value, json};
	// self
	use super::*;
	use crate::{
		auth::AccessCredential,
		config::ClientConfig,
		http::{HttpTransport, TransportFuture},
		store::MemoryStore,
	};

	#[derive(Default)]
	struct RecordingTransport {
		requests: Mutex<Vec<HttpRequest>>,
	}
	impl HttpTransport for RecordingTransport {
		fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
			self.requests.lock().push(request);

			Box::pin(async move {
				let body = br#"{"token":"opaque-2","refresh_token":"refresh-2","expires_in":600}"#;

				Ok(::http::Response::builder()
					.status(200)
					.body(body.to_vec())
					.expect("Response fixture should build."))
			})
		}
	}

	#[tokio::test]
	async fn refresh_calls_carry_only_the_refresh_token() {
		let base = Url::parse("https://eld.example.test/api/").expect("Base URL should parse.");
		let config = ClientConfig::builder(base).build().expect("Config should build.");
		let store = Arc::new(MemoryStore::with_state(CredentialState {
			access: Some(AccessCredential::new("opaque-1", OffsetDateTime::now_utc())),
			refresh_token: Some(TokenSecret::new("refresh-1")),
		}));
		let transport = Arc::new(RecordingTransport::default());
		let coordinator = SessionCoordinator::new(Arc::new(config), store.clone(), transport.clone());

		assert!(coordinator.refresh().await);
		assert!(!coordinator.refresh_state.lock().is_locked());

		let requests = transport.requests.lock();
		let request = requests.first().expect("One refresh call should be recorded.");
		let body: Value =
			serde_json::from_slice(request.body()).expect("Refresh body should be JSON.");

		assert_eq!(requests.len(), 1);
		assert_eq!(request.method(), Method::POST);
		assert_eq!(request.uri(), "https://eld.example.test/api/refresh");
		assert!(request.headers().get(AUTHORIZATION).is_none());
		assert_eq!(body, json!({ "refresh_token": "refresh-1" }));
		assert_eq!(store.snapshot().access_token().map(TokenSecret::expose), Some("opaque-2"));
	}

	#[tokio::test]
	async fn waiter_leads_a_new_refresh_when_the_leader_is_dropped() {
		let base = Url::parse("https://eld.example.test/api/").expect("Base URL should parse.");
		let config = ClientConfig::builder(base).build().expect("Config should build.");
		let store = Arc::new(MemoryStore::with_state(CredentialState {
			access: Some(AccessCredential::new("opaque-1", OffsetDateTime::now_utc())),
			refresh_token: Some(TokenSecret::new("refresh-1")),
		}));
		let transport = Arc::new(RecordingTransport::default());
		let coordinator = SessionCoordinator::new(Arc::new(config), store.clone(), transport.clone());
		let (sender, receiver) = watch::channel(None);

		coordinator.refresh_state.lock().in_flight = Some(receiver);

		let abandoned = FlightRelease { state: &coordinator.refresh_state, sender };
		let (refreshed, ()) = tokio::join!(coordinator.refresh(), async move {
			tokio::task::yield_now().await;
			drop(abandoned);
		});

		assert!(refreshed);
		assert_eq!(transport.requests.lock().len(), 1);
		assert_eq!(coordinator.metrics().joined(), 1);
		assert!(!coordinator.refresh_state.lock().is_locked());
		assert_eq!(store.snapshot().access_token().map(TokenSecret::expose), Some("opaque-2"));
	}
}
