//! Device identity carried on telemetry and request headers.

// std
use std::ops::Deref;
// self
use crate::_prelude::*;

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier.
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier.
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier.
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Logical device identity; `(device_id, seq)` is the server's dedup key.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);
impl DeviceId {
	const KIND: &'static str = "Device";

	/// Validates and wraps a device identifier.
	pub fn new(value: impl Into<String>) -> Result<Self, IdentifierError> {
		let value = value.into();

		validate_view(Self::KIND, &value)?;

		Ok(Self(value))
	}

	/// Mints a fresh device identity.
	///
	/// A device that lost its sequence counter must switch to a fresh identity instead of
	/// restarting `seq` at 1 under the old one.
	pub fn generate() -> Self {
		let bytes: [u8; 16] = rand::random();

		Self(format!("device-{}", uuid::Builder::from_random_bytes(bytes).into_uuid()))
	}

	/// Borrows the identifier as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Deref for DeviceId {
	type Target = str;

	fn deref(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for DeviceId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl TryFrom<String> for DeviceId {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl From<DeviceId> for String {
	fn from(value: DeviceId) -> Self {
		value.0
	}
}
impl FromStr for DeviceId {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for DeviceId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "DeviceId({})", self.0)
	}
}
impl Display for DeviceId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}
