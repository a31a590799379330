//! Stored session credentials and the token grant shape returned by the backend.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Access token paired with its expiry; the two are never stored apart.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessCredential {
	/// Access token secret; callers must avoid logging it.
	pub token: TokenSecret,
	/// Instant after which the server rejects the token.
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
}
impl AccessCredential {
	/// Pairs a token with its expiry instant.
	pub fn new(token: impl Into<String>, expires_at: OffsetDateTime) -> Self {
		Self { token: TokenSecret::new(token), expires_at }
	}
}
impl Debug for AccessCredential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessCredential")
			.field("token", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Full credential record held by a [`CredentialStore`](crate::store::CredentialStore).
///
/// Writes always replace the whole record, so readers observe either the old or the new
/// snapshot and never a token without its expiry.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct CredentialState {
	/// Access token and expiry, if a session exists.
	pub access: Option<AccessCredential>,
	/// Refresh token used solely to mint new access tokens.
	pub refresh_token: Option<TokenSecret>,
}
impl CredentialState {
	/// Builds the record produced by a login or refresh response received at `now`.
	///
	/// A lifetime that would push the expiry past the representable range is treated like a
	/// missing one.
	pub fn from_grant(grant: &TokenGrant, now: OffsetDateTime, fallback_lifetime: Duration) -> Self {
		let expires_at = grant
			.lifetime()
			.and_then(|lifetime| now.checked_add(lifetime))
			.unwrap_or_else(|| now.saturating_add(fallback_lifetime));

		Self {
			access: Some(AccessCredential::new(grant.token.clone(), expires_at)),
			refresh_token: grant.refresh_token.as_deref().map(TokenSecret::new),
		}
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.access.is_none() && self.refresh_token.is_none()
	}

	/// Current access token, if any.
	pub fn access_token(&self) -> Option<&TokenSecret> {
		self.access.as_ref().map(|access| &access.token)
	}

	/// Stored expiry instant, if any.
	pub fn expires_at(&self) -> Option<OffsetDateTime> {
		self.access.as_ref().map(|access| access.expires_at)
	}

	/// A token is stale when no expiry is stored or `now` has entered the pre-expiry margin.
	pub fn is_stale_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
		self.expires_at()
			.and_then(|expires_at| expires_at.checked_sub(margin))
			.is_none_or(|threshold| now >= threshold)
	}
}
impl Debug for CredentialState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialState")
			.field("access", &self.access)
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

/// Token response returned by the login and refresh endpoints.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenGrant {
	/// Newly minted access token.
	pub token: String,
	/// Rotated refresh token; absent when the backend does not rotate.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// Access token lifetime in seconds.
	#[serde(default)]
	pub expires_in: Option<i64>,
}
impl TokenGrant {
	/// Server-reported lifetime, ignoring non-positive values.
	pub fn lifetime(&self) -> Option<Duration> {
		self.expires_in.filter(|secs| *secs > 0).map(Duration::seconds)
	}
}
impl Debug for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenGrant")
			.field("token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expires_in", &self.expires_in)
			.finish()
	}
}
