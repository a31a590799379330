//! Session lifecycle: credential freshness, single-flight refresh, and terminal logout.
//!
//! [`SessionCoordinator`] is the only writer of the [`CredentialStore`]. It is constructed
//! once at process start, injected into the [`RequestPipeline`](crate::pipeline::RequestPipeline)
//! and any background tasks, and disposed of at logout. Three independent triggers keep the
//! access token fresh:
//!
//! - the pipeline calls [`SessionCoordinator::ensure_fresh`] before building every request;
//! - a periodic task started with [`SessionCoordinator::spawn_proactive_refresh`] does the same
//!   on a fixed period;
//! - an app-foreground signal registered through [`SessionCoordinator::attach_lifecycle`].
//!
//! All of them funnel into [`SessionCoordinator::refresh`], which guarantees at most one refresh
//! call in flight.

pub mod lifecycle;
pub mod refresh;
pub mod timer;

mod metrics;

pub use lifecycle::*;
pub use metrics::RefreshMetrics;
pub use timer::BackgroundTask;

// self
use crate::{
	_prelude::*,
	auth::{CredentialState, TokenGrant, TokenSecret},
	config::ClientConfig,
	http::HttpTransport,
	obs::{self, OperationKind},
	store::CredentialStore,
};
use refresh::RefreshState;

/// Callback invoked when the session is invalidated.
pub type LogoutHandler = Arc<dyn Fn(LogoutReason) + Send + Sync>;

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogoutReason {
	/// A refresh was needed but no refresh token was stored.
	MissingRefreshToken,
	/// The refresh endpoint rejected the refresh token.
	RefreshRejected,
	/// A request was rejected again after a successful refresh.
	RetryRejected,
	/// A request was rejected and the refresh could not complete.
	RefreshUnavailable,
	/// A caller hit the refresh endpoint directly and was rejected.
	RefreshEndpointRejected,
	/// The user signed out.
	SignedOut,
}
impl LogoutReason {
	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			LogoutReason::MissingRefreshToken => "missing_refresh_token",
			LogoutReason::RefreshRejected => "refresh_rejected",
			LogoutReason::RetryRejected => "retry_rejected",
			LogoutReason::RefreshUnavailable => "refresh_unavailable",
			LogoutReason::RefreshEndpointRejected => "refresh_endpoint_rejected",
			LogoutReason::SignedOut => "signed_out",
		}
	}
}
impl Display for LogoutReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Owns the credential lifecycle for one signed-in user.
pub struct SessionCoordinator {
	config: Arc<ClientConfig>,
	store: Arc<dyn CredentialStore>,
	transport: Arc<dyn HttpTransport>,
	logout_handler: Option<LogoutHandler>,
	refresh_state: Mutex<RefreshState>,
	metrics: Arc<RefreshMetrics>,
}
impl SessionCoordinator {
	/// Creates a coordinator over `store`, issuing refresh calls through `transport`.
	pub fn new(
		config: Arc<ClientConfig>,
		store: Arc<dyn CredentialStore>,
		transport: Arc<dyn HttpTransport>,
	) -> Self {
		Self {
			config,
			store,
			transport,
			logout_handler: None,
			refresh_state: Default::default(),
			metrics: Default::default(),
		}
	}

	/// Registers the callback invoked when the session is invalidated.
	pub fn with_logout_handler(
		mut self,
		handler: impl 'static + Fn(LogoutReason) + Send + Sync,
	) -> Self {
		self.logout_handler = Some(Arc::new(handler));

		self
	}

	/// Shared configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Refresh counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Reads the stored credential record.
	pub async fn credentials(&self) -> Result<CredentialState> {
		Ok(self.store.get().await?)
	}

	/// Current access token, if a session exists.
	pub async fn access_token(&self) -> Result<Option<TokenSecret>> {
		Ok(self.store.get().await?.access.map(|access| access.token))
	}

	/// Stores the tokens returned by a successful login.
	pub async fn establish(&self, grant: &TokenGrant) -> Result<()> {
		let state = CredentialState::from_grant(
			grant,
			OffsetDateTime::now_utc(),
			self.config.access_token_lifetime,
		);

		self.store.set(state).await?;

		Ok(())
	}

	/// Ends the session at the user's request.
	pub async fn sign_out(&self) -> Result<()> {
		let previous = self.store.remove().await?;

		if !previous.is_empty() {
			self.notify_logout(LogoutReason::SignedOut);
		}

		Ok(())
	}

	/// `true` when no expiry is stored or the token is inside the pre-expiry margin.
	///
	/// An unreadable store counts as stale so the refresh path gets a chance to recover.
	pub async fn is_access_token_stale(&self) -> bool {
		match self.store.get().await {
			Ok(state) => state.is_stale_at(OffsetDateTime::now_utc(), self.config.stale_margin),
			Err(e) => {
				obs::warn_event(
					OperationKind::Refresh,
					&format_args!("credential read failed: {e}"),
				);

				true
			},
		}
	}

	/// Returns `true` immediately when the token is fresh; refreshes otherwise.
	pub async fn ensure_fresh(&self) -> bool {
		if !self.is_access_token_stale().await {
			return true;
		}

		self.refresh().await
	}

	/// Handles the app returning to the foreground by checking freshness in the background.
	///
	/// Returns `None` when called outside a Tokio runtime.
	pub fn on_app_became_active(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<bool>> {
		let Ok(runtime) = tokio::runtime::Handle::try_current() else {
			obs::debug_event(
				OperationKind::Refresh,
				&"foreground check skipped outside a Tokio runtime",
			);

			return None;
		};
		let coordinator = Arc::clone(self);

		Some(runtime.spawn(async move { coordinator.ensure_fresh().await }))
	}

	/// Clears stored credentials and notifies the logout handler.
	///
	/// The handler fires only when something was actually cleared, so overlapping terminal
	/// paths (a rejected refresh followed by the pipeline giving up) report one logout.
	/// Returns `true` when a session existed.
	pub(crate) async fn end_session(&self, reason: LogoutReason) -> bool {
		let previous = match self.store.remove().await {
			Ok(previous) => previous,
			Err(e) => {
				obs::warn_event(
					OperationKind::Refresh,
					&format_args!("credential removal failed during {reason}: {e}"),
				);

				return false;
			},
		};

		if previous.is_empty() {
			return false;
		}

		self.notify_logout(reason);

		true
	}

	fn notify_logout(&self, reason: LogoutReason) {
		self.metrics.record_logout();
		obs::warn_event(OperationKind::Refresh, &format_args!("session ended: {reason}"));

		if let Some(handler) = &self.logout_handler {
			handler(reason);
		}
	}
}
impl Debug for SessionCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionCoordinator")
			.field("base_url", &self.config.base_url.as_str())
			.field("logout_handler_set", &self.logout_handler.is_some())
			.field("refreshing", &self.refresh_state.lock().is_locked())
			.finish()
	}
}
