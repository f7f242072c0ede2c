//! Identity snapshots cached next to the credential pair, and the coarse permission model.

// self
use crate::{
	_prelude::*,
	auth::claims::{Claims, DecodeError},
};

/// Identity captured from an access token at the moment it was issued.
///
/// Serialized as `{"subject": .., "displayName": ..}` under the `user` store key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySnapshot {
	/// `sub` claim of the token.
	pub subject: String,
	/// Display name derived from the token claims.
	pub display_name: String,
}
impl IdentitySnapshot {
	/// Builds a snapshot from decoded claims; the `sub` claim is required.
	pub fn from_claims(claims: &Claims) -> Result<Self, DecodeError> {
		let subject =
			claims.subject.clone().ok_or(DecodeError::MissingClaim { claim: "sub" })?;
		let display_name = claims.display_name().unwrap_or(&subject).to_owned();

		Ok(Self { subject, display_name })
	}

	/// Decodes `token` and builds a snapshot from its claims.
	pub fn from_token(token: &str) -> Result<Self, DecodeError> {
		Self::from_claims(&Claims::decode(token)?)
	}
}

/// Identity shape handed to the application.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
	/// Stable user identifier.
	pub id: String,
	/// Name shown in the UI.
	pub full_name: String,
}
impl From<IdentitySnapshot> for Identity {
	fn from(snapshot: IdentitySnapshot) -> Self {
		Self { id: snapshot.subject, full_name: snapshot.display_name }
	}
}

/// Coarse permission derived from the access token's roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
	/// Full administrative access.
	Admin,
	/// Merchant-scoped access.
	Merchant,
}
impl Permission {
	/// Maps a role set to a permission; `admin` takes precedence over `merchant`.
	pub fn from_claims(claims: &Claims) -> Option<Self> {
		if claims.has_role("admin") {
			Some(Self::Admin)
		} else if claims.has_role("merchant") {
			Some(Self::Merchant)
		} else {
			None
		}
	}

	/// Returns the role label backing the permission.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Admin => "admin",
			Self::Merchant => "merchant",
		}
	}
}
impl Display for Permission {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn claims(subject: Option<&str>, roles: &[&str]) -> Claims {
		Claims {
			subject: subject.map(str::to_owned),
			roles: Some(roles.iter().map(|role| (*role).to_owned()).collect()),
			..Claims::default()
		}
	}

	#[test]
	fn admin_wins_over_merchant() {
		assert_eq!(
			Permission::from_claims(&claims(None, &["merchant", "admin"])),
			Some(Permission::Admin)
		);
		assert_eq!(Permission::from_claims(&claims(None, &["merchant"])), Some(Permission::Merchant));
		assert_eq!(Permission::from_claims(&claims(None, &["viewer"])), None);
		assert_eq!(Permission::from_claims(&Claims::default()), None);
	}

	#[test]
	fn snapshot_requires_subject_and_serializes_camel_case() {
		assert!(matches!(
			IdentitySnapshot::from_claims(&claims(None, &[])),
			Err(DecodeError::MissingClaim { claim: "sub" })
		));

		let snapshot = IdentitySnapshot::from_claims(&Claims {
			preferred_username: Some("ada".into()),
			..claims(Some("u-1"), &[])
		})
		.expect("Subject is present.");
		let json = serde_json::to_value(&snapshot).expect("Snapshot should serialize.");

		assert_eq!(json, serde_json::json!({ "subject": "u-1", "displayName": "ada" }));

		let identity = Identity::from(snapshot);

		assert_eq!(
			serde_json::to_value(&identity).expect("Identity should serialize."),
			serde_json::json!({ "id": "u-1", "fullName": "ada" })
		);
	}
}
