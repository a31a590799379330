//! Authorization header scheme selection.
//!
//! Signed JWT access tokens travel as `Bearer`, while opaque legacy tokens keep the
//! `Token` scheme older backends expect. The choice is made from the token's shape alone.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Scheme used in the `Authorization` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AuthScheme {
	/// `Authorization: Bearer <jwt>`.
	Bearer,
	/// `Authorization: Token <opaque>`.
	Token,
}
impl AuthScheme {
	/// Picks the scheme matching the token's shape.
	pub fn detect(token: &str) -> Self {
		if looks_like_jwt(token) { Self::Bearer } else { Self::Token }
	}

	/// Returns the scheme keyword.
	pub const fn as_str(self) -> &'static str {
		match self {
			AuthScheme::Bearer => "Bearer",
			AuthScheme::Token => "Token",
		}
	}

	/// Formats a complete header value for `token`.
	pub fn header_value(token: &TokenSecret) -> String {
		let token = token.expose();

		format!("{} {token}", Self::detect(token).as_str())
	}
}
impl Display for AuthScheme {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[derive(Deserialize)]
struct JoseHeader {
	alg: String,
}

fn looks_like_jwt(token: &str) -> bool {
	let mut segments = token.split('.');
	let (Some(header), Some(payload), Some(_signature), None) =
		(segments.next(), segments.next(), segments.next(), segments.next())
	else {
		return false;
	};

	if header.is_empty() || payload.is_empty() {
		return false;
	}

	let Ok(raw) = URL_SAFE_NO_PAD.decode(header.trim_end_matches('=')) else {
		return false;
	};

	serde_json::from_slice::<JoseHeader>(&raw).is_ok_and(|jose| !jose.alg.is_empty())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn signed_jwt_uses_bearer() {
		let token = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.eyJzdWIiOiIxIn0.c2ln";

		assert_eq!(AuthScheme::detect(token), AuthScheme::Bearer);
		assert_eq!(
			AuthScheme::header_value(&TokenSecret::new(token)),
			format!("Bearer {token}")
		);
	}

	#[test]
	fn opaque_and_malformed_tokens_use_legacy_scheme() {
		assert_eq!(
			AuthScheme::detect("9944b09199c62bcf9418ad846dd0e4bbdfc6ee4b"),
			AuthScheme::Token
		);
		// Dotted, but the header segment is not a JOSE header.
		assert_eq!(AuthScheme::detect("abc.def.ghi"), AuthScheme::Token);
		assert_eq!(AuthScheme::detect("a.b"), AuthScheme::Token);
		assert_eq!(AuthScheme::detect("a.b.c.d"), AuthScheme::Token);
		assert_eq!(
			AuthScheme::header_value(&TokenSecret::new("legacy")),
			"Token legacy".to_string()
		);
	}
}
