// crates.io
use time::macros;
// self
use eld_gateway::{
	_preludet::*,
	auth::{AccessCredential, CredentialState, TokenSecret},
	store::{CredentialStore, MemoryStore},
};

fn build_state(access: &str, refresh: Option<&str>) -> CredentialState {
	let issued = macros::datetime!(2026-03-02 08:00 UTC);

	CredentialState {
		access: Some(AccessCredential::new(access, issued + Duration::minutes(10))),
		refresh_token: refresh.map(TokenSecret::new),
	}
}

#[tokio::test]
async fn set_and_get_round_trip() {
	let store = MemoryStore::default();
	let state = build_state("access-1", Some("refresh-1"));

	assert!(store.get().await.expect("Reading an empty store should succeed.").is_empty());

	store.set(state.clone()).await.expect("Saving credentials into memory store should succeed.");

	let fetched = store.get().await.expect("Fetching credentials from memory store should succeed.");

	assert_eq!(fetched.access_token().map(TokenSecret::expose), Some("access-1"));
	assert_eq!(fetched.refresh_token.as_ref().map(TokenSecret::expose), Some("refresh-1"));
	assert_eq!(fetched.expires_at(), state.expires_at());
}

#[tokio::test]
async fn remove_returns_previous_record_and_clears() {
	let store = MemoryStore::with_state(build_state("access-1", Some("refresh-1")));
	let previous = store.remove().await.expect("Removing credentials should succeed.");

	assert!(!previous.is_empty());
	assert!(store.snapshot().is_empty());

	let again = store.remove().await.expect("Removing from an empty store should succeed.");

	assert!(again.is_empty());
}

#[tokio::test]
async fn concurrent_writers_never_mix_records() {
	let store = MemoryStore::default();
	let store_a = store.clone();
	let store_b = store.clone();
	let task_a = tokio::spawn(async move {
		for _ in 0..100 {
			store_a
				.set(build_state("access-a", Some("refresh-a")))
				.await
				.expect("Writer A should store its record.");
		}
	});
	let task_b = tokio::spawn(async move {
		for _ in 0..100 {
			store_b
				.set(build_state("access-b", Some("refresh-b")))
				.await
				.expect("Writer B should store its record.");
		}
	});
	let (a, b) = tokio::join!(task_a, task_b);

	a.expect("Writer A should not panic.");
	b.expect("Writer B should not panic.");

	let last = store.snapshot();
	let pair = (
		last.access_token().map(TokenSecret::expose),
		last.refresh_token.as_ref().map(TokenSecret::expose),
	);

	assert!(matches!(
		pair,
		(Some("access-a"), Some("refresh-a")) | (Some("access-b"), Some("refresh-b"))
	));
}
