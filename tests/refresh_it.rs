#![cfg(feature = "reqwest")]

// std
use std::time::Duration as StdDuration;
// crates.io
use futures_util::future;
use httpmock::prelude::*;
use serde_json::json;
// self
use oauth2_session::{
	_preludet::*,
	auth::IdentitySnapshot,
	config::ClientConfig,
	store::{MemoryStore, StoreKey, TokenStore, read_identity},
};

const CLIENT_ID: &str = "admin-panel";

fn config(server: &MockServer) -> ClientConfig {
	ClientConfig::builder(CLIENT_ID)
		.token_endpoint(
			Url::parse(&server.url("/oauth/token")).expect("Mock token endpoint should parse."),
		)
		.build()
		.expect("Client configuration should build.")
}

async fn seed(store: &MemoryStore, access: &str, refresh: &str) {
	store
		.set(vec![
			(StoreKey::AccessToken, access.to_owned()),
			(StoreKey::RefreshToken, refresh.to_owned()),
		])
		.await
		.expect("Failed to seed the session store.");
}

fn token_body(access: &str, refresh: &str) -> String {
	json!({ "access_token": access, "refresh_token": refresh, "token_type": "bearer" }).to_string()
}

#[tokio::test]
async fn refresh_rotates_pair_and_identity() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(config(&server));
	let old_refresh = fresh_jwt("u-1");
	let new_access = jwt_expiring_in("u-2", Duration::hours(1), &["merchant"]);
	let new_refresh = fresh_jwt("u-2");

	seed(&store, &expired_jwt("u-1"), &old_refresh).await;

	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth/token")
				.header("content-type", "application/x-www-form-urlencoded")
				.form_urlencoded_tuple("client_id", CLIENT_ID)
				.form_urlencoded_tuple("grant_type", "refresh_token")
				.form_urlencoded_tuple("refresh_token", old_refresh.as_str());
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body(&new_access, &new_refresh));
		})
		.await;

	broker.coordinator().ensure_fresh().await.expect("Expired access token should be refreshed.");

	mock.assert_async().await;

	assert_eq!(store.value(StoreKey::AccessToken), Some(new_access));
	assert_eq!(store.value(StoreKey::RefreshToken), Some(new_refresh));

	let identity = read_identity(&*store)
		.await
		.expect("Identity snapshot should parse.")
		.expect("Identity snapshot should be stored after a refresh.");

	assert_eq!(
		identity,
		IdentitySnapshot { subject: "u-2".into(), display_name: "u-2 display".into() }
	);
	assert_eq!(broker.refresh_metrics.attempts(), 1);
	assert_eq!(broker.refresh_metrics.successes(), 1);
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(config(&server));
	let new_access = fresh_jwt("u-1");

	seed(&store, &expired_jwt("u-1"), &fresh_jwt("u-1")).await;

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body(&new_access, "refresh-next"))
				.delay(StdDuration::from_millis(200));
		})
		.await;
	let coordinator = broker.coordinator();
	let session = broker.session();
	let (pairs, recovered) = tokio::join!(
		future::join_all((0..4).map(|_| coordinator.refresh())),
		session.check_status(401),
	);

	mock.assert_calls_async(1).await;

	for pair in pairs {
		let pair = pair.expect("Every joined caller should observe the refreshed pair.");

		assert_eq!(pair.access_token.expose(), new_access);
	}

	assert!(recovered.is_ok());
	assert_eq!(broker.refresh_metrics.attempts(), 1);
	assert_eq!(broker.refresh_metrics.joined(), 4);
}

#[tokio::test]
async fn joined_callers_observe_the_same_failure() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(config(&server));

	seed(&store, &expired_jwt("u-1"), &fresh_jwt("u-1")).await;

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(500)
				.header("content-type", "application/json")
				.body(r#"{"error":"server_error"}"#)
				.delay(StdDuration::from_millis(200));
		})
		.await;
	let coordinator = broker.coordinator();
	let results = future::join_all((0..3).map(|_| coordinator.ensure_fresh())).await;

	mock.assert_calls_async(1).await;

	for result in results {
		let err = result.expect_err("Every joined caller should observe the refresh failure.");

		assert_eq!(err.status(), Some(500));
		assert_eq!(err.kind(), "http_error");
	}

	assert!(store.snapshot().is_empty(), "A failed refresh must clear every session key.");
	assert_eq!(broker.refresh_metrics.failures(), 1);
}

#[tokio::test]
async fn missing_or_expired_refresh_token_fails_without_network() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(config(&server));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).body(token_body("a", "r"));
		})
		.await;
	let err = broker.coordinator().ensure_fresh().await.expect_err("Empty store cannot be fresh.");

	assert!(matches!(err, Error::NoCredentials));

	seed(&store, &expired_jwt("u-1"), &expired_jwt("u-1")).await;

	let err =
		broker.coordinator().ensure_fresh().await.expect_err("Expired tokens cannot be fresh.");

	assert!(matches!(err, Error::NoCredentials));

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn fresh_access_token_skips_refresh() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(config(&server));
	let access = fresh_jwt("u-1");

	seed(&store, &access, &fresh_jwt("u-1")).await;

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).body(token_body("a", "r"));
		})
		.await;

	broker.coordinator().ensure_fresh().await.expect("Fresh access token should pass.");

	mock.assert_calls_async(0).await;

	assert_eq!(store.value(StoreKey::AccessToken), Some(access));
}

#[tokio::test]
async fn incomplete_token_response_clears_session() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(config(&server));

	seed(&store, &expired_jwt("u-1"), &fresh_jwt("u-1")).await;
	store
		.set(vec![(StoreKey::User, r#"{"subject":"u-1","displayName":"Ada"}"#.into())])
		.await
		.expect("Failed to seed the identity snapshot.");

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).header("content-type", "application/json").body("{}");
		})
		.await;
	let err = broker.coordinator().refresh().await.expect_err("Empty responses should fail.");

	mock.assert_async().await;

	assert!(matches!(err, Error::InvalidTokenResponse));
	assert_eq!(err.to_string(), "Invalid token response.");
	assert!(store.snapshot().is_empty());
}

#[tokio::test]
async fn opaque_tokens_are_stored_for_every_joined_caller() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(config(&server));

	seed(&store, &expired_jwt("u-1"), &fresh_jwt("u-1")).await;
	store
		.set(vec![(StoreKey::User, r#"{"subject":"u-1","displayName":"Ada"}"#.into())])
		.await
		.expect("Failed to seed the identity snapshot.");

	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("NEW_ACCESS", "NEW_REFRESH"))
				.delay(StdDuration::from_millis(200));
		})
		.await;
	let coordinator = broker.coordinator();
	let (first, second) = tokio::join!(coordinator.ensure_fresh(), coordinator.ensure_fresh());

	mock.assert_calls_async(1).await;

	first.expect("The first caller should observe the stored pair.");
	second.expect("The joined caller should observe the stored pair.");

	assert_eq!(store.value(StoreKey::AccessToken), Some("NEW_ACCESS".into()));
	assert_eq!(store.value(StoreKey::RefreshToken), Some("NEW_REFRESH".into()));
	assert_eq!(store.value(StoreKey::User), None, "A snapshot of the old token must not survive.");
	assert_eq!(broker.refresh_metrics.successes(), 1);
	assert_eq!(broker.refresh_metrics.joined(), 1);
}

#[tokio::test]
async fn next_call_after_failure_starts_a_new_operation() {
	let server = MockServer::start_async().await;
	let (broker, store) = build_reqwest_test_broker(config(&server));
	let refresh = fresh_jwt("u-1");

	seed(&store, &expired_jwt("u-1"), &refresh).await;

	let failing = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(503).body("maintenance");
		})
		.await;
	let err = broker.coordinator().refresh().await.expect_err("First refresh should fail.");

	assert_eq!(err.status(), Some(503));

	failing.assert_async().await;
	failing.delete_async().await;
	seed(&store, &expired_jwt("u-1"), &refresh).await;

	let new_access = fresh_jwt("u-1");
	let succeeding = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).body(token_body(&new_access, "refresh-next"));
		})
		.await;
	let pair = broker.coordinator().refresh().await.expect("Second refresh should succeed.");

	succeeding.assert_async().await;

	assert_eq!(pair.access_token.expose(), new_access);
	assert_eq!(broker.refresh_metrics.attempts(), 2);
}
