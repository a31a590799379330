//! Idempotency keys for mutations with externally visible side effects.
//!
//! A key names one logical user action. The generator never hands out the same value twice;
//! reusing a value across the transport-level retry of that action is the caller's job, and
//! [`RequestPipeline`](crate::pipeline::RequestPipeline) does exactly that for its single
//! retry after a token refresh.

// self
use crate::_prelude::*;

/// Opaque key sent in the `Idempotency-Key` header.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);
impl IdempotencyKey {
	/// Wraps a caller-supplied key, e.g. one restored after an app restart.
	pub fn from_raw(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the header value.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for IdempotencyKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Debug for IdempotencyKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "IdempotencyKey({})", self.0)
	}
}
impl Display for IdempotencyKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Builds `{operation}-{discriminator}-{unix_millis}-{uuid}` for one logical action.
///
/// `discriminator` narrows the action (a log date, an entity id). Empty segments are
/// omitted. Safe to call concurrently; the random suffix makes every value unique.
pub fn generate(operation: &str, discriminator: &str) -> IdempotencyKey {
	generate_at(operation, discriminator, OffsetDateTime::now_utc())
}

pub(crate) fn generate_at(
	operation: &str,
	discriminator: &str,
	now: OffsetDateTime,
) -> IdempotencyKey {
	let bytes: [u8; 16] = rand::random();
	let unique = uuid::Builder::from_random_bytes(bytes).into_uuid();
	let millis = now.unix_timestamp_nanos() / 1_000_000;
	let mut key = String::new();

	for segment in [sanitize(operation), sanitize(discriminator)] {
		if !segment.is_empty() {
			key.push_str(&segment);
			key.push('-');
		}
	}

	key.push_str(&format!("{millis}-{unique}"));

	IdempotencyKey(key)
}

// Header values must stay visible ASCII without separators.
fn sanitize(segment: &str) -> String {
	segment
		.trim()
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
		.collect()
}
