//! JWT claim decoding and the canonical freshness check.
//!
//! Tokens are decoded without signature verification: the session only needs the claims to
//! decide when to refresh and whom to greet, while the API remains the authority that
//! validates signatures. Decode failures are typed values, and every freshness decision
//! treats them (and a missing `exp`) as "not fresh".

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Number;
// self
use crate::_prelude::*;

/// Errors produced while decoding a bearer token.
#[derive(Clone, Debug, ThisError)]
pub enum DecodeError {
	/// The token does not consist of three dot-separated segments.
	#[error("Token is not a three-segment JWT.")]
	Malformed,
	/// The payload segment is not base64url.
	#[error("Token payload is not valid base64url.")]
	Base64(#[from] base64::DecodeError),
	/// The payload is not a JSON claims object of the expected shape.
	#[error("Token payload is not a valid claims object.")]
	Payload {
		/// Structured parsing failure with the offending claim path.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
	},
	/// A claim required by the caller is absent.
	#[error("Token is missing the `{claim}` claim.")]
	MissingClaim {
		/// Name of the missing claim.
		claim: &'static str,
	},
}

/// Validated view over the claims the session relies on. Every field is optional because
/// the payload is untrusted input.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Claims {
	/// `sub` claim.
	pub subject: Option<String>,
	/// `exp` claim in Unix seconds.
	pub expiry: Option<i64>,
	/// Roles from `roles`, falling back to `realm_access.roles`.
	pub roles: Option<BTreeSet<String>>,
	/// `name` claim.
	pub name: Option<String>,
	/// `preferred_username` claim.
	pub preferred_username: Option<String>,
}
impl Claims {
	/// Decodes the payload segment of `token`.
	pub fn decode(token: &str) -> Result<Self, DecodeError> {
		let mut segments = token.split('.');
		let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
			(Some(_header), Some(payload), Some(_signature), None) if !payload.is_empty() =>
				payload,
			_ => return Err(DecodeError::Malformed),
		};
		let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
		let de = &mut serde_json::Deserializer::from_slice(&bytes);
		let raw: RawClaims = serde_path_to_error::deserialize(de)
			.map_err(|e| DecodeError::Payload { source: Arc::new(e) })?;

		Ok(raw.into())
	}

	/// Returns `true` while `now` is strictly before the `exp` claim.
	///
	/// A token without `exp` is never fresh.
	pub fn is_fresh_at(&self, now: OffsetDateTime) -> bool {
		self.expiry.is_some_and(|exp| now.unix_timestamp() < exp)
	}

	/// Returns `true` when the role set contains `role`.
	pub fn has_role(&self, role: &str) -> bool {
		self.roles.as_ref().is_some_and(|roles| roles.contains(role))
	}

	/// Human-readable name: `name`, else `preferred_username`, else `sub`.
	pub fn display_name(&self) -> Option<&str> {
		self.name
			.as_deref()
			.or(self.preferred_username.as_deref())
			.or(self.subject.as_deref())
	}
}

/// Checks `token` against the current UTC clock.
pub fn is_fresh(token: &str) -> bool {
	is_fresh_at(token, OffsetDateTime::now_utc())
}

/// Checks `token` against `now`; undecodable tokens are not fresh.
pub fn is_fresh_at(token: &str, now: OffsetDateTime) -> bool {
	Claims::decode(token).is_ok_and(|claims| claims.is_fresh_at(now))
}

#[derive(Deserialize)]
struct RawClaims {
	sub: Option<String>,
	exp: Option<Number>,
	roles: Option<RoleClaim>,
	realm_access: Option<RealmAccess>,
	name: Option<String>,
	preferred_username: Option<String>,
}
impl From<RawClaims> for Claims {
	fn from(raw: RawClaims) -> Self {
		let roles = match (raw.roles, raw.realm_access) {
			(Some(RoleClaim::One(role)), _) => Some(BTreeSet::from([role])),
			(Some(RoleClaim::Many(roles)), _) => Some(roles),
			(None, Some(realm)) => realm.roles,
			(None, None) => None,
		};

		Self {
			subject: raw.sub,
			expiry: raw.exp.as_ref().and_then(numeric_date),
			roles,
			name: raw.name,
			preferred_username: raw.preferred_username,
		}
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RoleClaim {
	One(String),
	Many(BTreeSet<String>),
}

#[derive(Deserialize)]
struct RealmAccess {
	roles: Option<BTreeSet<String>>,
}

// Some issuers emit fractional seconds.
fn numeric_date(value: &Number) -> Option<i64> {
	value
		.as_i64()
		.or_else(|| value.as_f64().filter(|secs| secs.is_finite()).map(|secs| secs.trunc() as i64))
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn encode(payload: &str) -> String {
		format!(
			"{}.{}.sig",
			URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#),
			URL_SAFE_NO_PAD.encode(payload)
		)
	}

	#[test]
	fn decodes_standard_claims() {
		let token = encode(
			r#"{"sub":"u-1","exp":1735693200,"roles":["admin","merchant"],"name":"Ada"}"#,
		);
		let claims = Claims::decode(&token).expect("Well-formed token should decode.");

		assert_eq!(claims.subject.as_deref(), Some("u-1"));
		assert_eq!(claims.expiry, Some(1_735_693_200));
		assert!(claims.has_role("admin"));
		assert!(claims.has_role("merchant"));
		assert_eq!(claims.display_name(), Some("Ada"));
	}

	#[test]
	fn realm_roles_and_single_role_strings_are_accepted() {
		let realm = Claims::decode(&encode(r#"{"sub":"u","realm_access":{"roles":["merchant"]}}"#))
			.expect("Realm roles should decode.");

		assert!(realm.has_role("merchant"));

		let single = Claims::decode(&encode(r#"{"sub":"u","roles":"admin"}"#))
			.expect("A single role string should decode.");

		assert!(single.has_role("admin"));
		assert_eq!(single.display_name(), Some("u"));
	}

	#[test]
	fn malformed_tokens_are_typed_errors() {
		assert!(matches!(Claims::decode("not-a-jwt"), Err(DecodeError::Malformed)));
		assert!(matches!(Claims::decode("a.b.c.d"), Err(DecodeError::Malformed)));
		assert!(matches!(Claims::decode("a..c"), Err(DecodeError::Malformed)));
		assert!(matches!(Claims::decode("a.!!!.c"), Err(DecodeError::Base64(_))));
		assert!(matches!(Claims::decode(&encode("[1,2]")), Err(DecodeError::Payload { .. })));
		assert!(matches!(
			Claims::decode(&encode(r#"{"exp":"soon"}"#)),
			Err(DecodeError::Payload { .. })
		));
	}

	#[test]
	fn padded_payloads_and_fractional_expiry_decode() {
		let padded = format!("h.{}==.s", URL_SAFE_NO_PAD.encode(r#"{"exp":10.9}"#));
		let claims = Claims::decode(&padded).expect("Padded payload should decode.");

		assert_eq!(claims.expiry, Some(10));
	}

	#[test]
	fn freshness_boundary_is_strict() {
		let now = macros::datetime!(2025-01-01 00:00 UTC);
		let exp = now.unix_timestamp();

		assert!(is_fresh_at(&encode(&format!(r#"{{"exp":{}}}"#, exp + 1)), now));
		assert!(!is_fresh_at(&encode(&format!(r#"{{"exp":{exp}}}"#)), now));
		assert!(!is_fresh_at(&encode(&format!(r#"{{"exp":{}}}"#, exp - 1)), now));
	}

	#[test]
	fn missing_expiry_and_garbage_are_never_fresh() {
		assert!(!is_fresh(&encode(r#"{"sub":"forever"}"#)));
		assert!(!is_fresh("garbage"));
		assert!(!is_fresh(""));
	}
}
