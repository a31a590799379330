//! Thread-safe in-memory [`CredentialStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::CredentialState,
	store::{CredentialStore, StoreFuture},
};

/// Thread-safe storage backend that keeps the record in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<RwLock<CredentialState>>);
impl MemoryStore {
	/// Creates a store pre-seeded with `state`.
	pub fn with_state(state: CredentialState) -> Self {
		Self(Arc::new(RwLock::new(state)))
	}

	/// Returns a synchronous snapshot of the stored record.
	pub fn snapshot(&self) -> CredentialState {
		self.0.read().clone()
	}
}
impl CredentialStore for MemoryStore {
	fn get(&self) -> StoreFuture<'_, CredentialState> {
		let state = self.snapshot();

		Box::pin(async move { Ok(state) })
	}

	fn set(&self, state: CredentialState) -> StoreFuture<'_, ()> {
		*self.0.write() = state;

		Box::pin(async move { Ok(()) })
	}

	fn remove(&self) -> StoreFuture<'_, CredentialState> {
		let previous = std::mem::take(&mut *self.0.write());

		Box::pin(async move { Ok(previous) })
	}
}
