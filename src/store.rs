//! Storage contract and built-in backends for session credentials.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::CredentialState};

/// Boxed future returned by [`CredentialStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistent key-value holder for the single credential record.
///
/// Stores are pure storage: they never interpret expiry or refresh state. Only the
/// [`SessionCoordinator`](crate::session::SessionCoordinator) writes through this trait.
pub trait CredentialStore
where
	Self: Send + Sync,
{
	/// Reads the current record; an empty [`CredentialState`] when nothing is stored.
	fn get(&self) -> StoreFuture<'_, CredentialState>;

	/// Atomically replaces the whole record.
	fn set(&self, state: CredentialState) -> StoreFuture<'_, ()>;

	/// Removes every stored credential, returning what was there.
	fn remove(&self) -> StoreFuture<'_, CredentialState>;
}

/// Error type produced by [`CredentialStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;
	use crate::error::{Error, ErrorKind};

	#[test]
	fn store_error_converts_into_gateway_error_with_source() {
		let store_error = StoreError::Backend { message: "keystore locked".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert_eq!(error.kind(), ErrorKind::Unknown);
		assert!(error.to_string().contains("keystore locked"));

		let source = StdError::source(&error)
			.expect("Gateway error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}
}
