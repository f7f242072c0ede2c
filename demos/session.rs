//! Walks a full admin-panel session against a mock authorization server: password login,
//! an authenticated API call, permission and identity lookups, then logout.

// std
use std::sync::Arc;
// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use time::{Duration, OffsetDateTime};
use url::Url;
// self
use oauth2_session::{
	config::ClientConfig,
	flows::{LoginCredentials, ReqwestBroker},
	store::{MemoryStore, TokenStore},
};

fn demo_jwt(subject: &str, roles: &[&str]) -> String {
	let exp = (OffsetDateTime::now_utc() + Duration::hours(1)).unix_timestamp();
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
	let payload = URL_SAFE_NO_PAD.encode(
		json!({ "sub": subject, "exp": exp, "name": "Ada Lovelace", "roles": roles }).to_string(),
	);

	format!("{header}.{payload}.demo")
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let access = demo_jwt("u-1", &["admin"]);
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token").form_urlencoded_tuple("grant_type", "password");
			then.status(200).header("content-type", "application/json").body(
				json!({ "access_token": access, "refresh_token": demo_jwt("u-1", &[]) }).to_string(),
			);
		})
		.await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/v1/orders").header("authorization", format!("Bearer {access}"));
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"[{"id":1,"total":42}]"#);
		})
		.await;
	let revoke_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/revoke");
			then.status(200);
		})
		.await;
	let config = ClientConfig::builder("admin-panel")
		.token_endpoint(Url::parse(&server.url("/oauth/token"))?)
		.build()?;
	let store: Arc<dyn TokenStore> = Arc::new(MemoryStore::default());
	let broker = ReqwestBroker::new(store, config)?;
	let session = broker.session();
	let identity = session.login(LoginCredentials::password("ada", "hunter2")).await?;

	println!("Signed in as {} ({}).", identity.display_name, identity.subject);

	let orders = broker.client().get(Url::parse(&server.url("/v1/orders"))?).await?;

	println!("Orders: {}.", orders.data.unwrap_or_default());
	println!("Permission: {}.", session.get_permissions().await?);
	println!("Identity: {:?}.", session.get_identity().await?);

	session.logout().await?;

	println!("Signed out; check_auth now reports: {:?}.", session.check_auth().await.err());

	token_mock.assert_async().await;
	api_mock.assert_async().await;
	revoke_mock.assert_async().await;

	Ok(())
}
