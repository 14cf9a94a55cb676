//! The verified claims of an access token

use std::convert::TryFrom;

use aliri_braid::braid;
use serde::{Deserialize, Serialize};
use tollgate::{
    clock::UnixTime,
    error::ClaimsRejected,
    jwt::{Audiences, BasicClaims, RegisteredClaims, Issuer, IssuerRef, Subject, SubjectRef},
};

use crate::Permissions;

/// The client (authorized party) a token was issued to
#[braid(serde, ref_doc = "A borrowed reference to a [`ClientId`]")]
pub struct ClientId;

/// The verified claims of an access token
///
/// Deserialization fails, rather than defaulting, when any of `iss`, `aud`,
/// `sub`, `iat` or `exp` is absent. The `permissions` claim is optional here
/// so that the permission gate can tell a token without permissions apart
/// from a token lacking a specific one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ClaimsDto")]
#[must_use]
pub struct Claims {
    iss: Issuer,
    aud: Audiences,
    sub: Subject,
    iat: UnixTime,
    exp: UnixTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    nbf: Option<UnixTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    azp: Option<ClientId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    permissions: Option<Permissions>,
}

impl Claims {
    /// The issuer of the token
    #[must_use]
    pub fn issuer(&self) -> &IssuerRef {
        &self.iss
    }

    /// The audiences the token was issued for
    pub fn audiences(&self) -> &Audiences {
        &self.aud
    }

    /// The subject (usually the user) of the token
    #[must_use]
    pub fn subject(&self) -> &SubjectRef {
        &self.sub
    }

    /// When the token was issued
    #[must_use]
    pub fn issued_at(&self) -> UnixTime {
        self.iat
    }

    /// When the token expires
    #[must_use]
    pub fn expires_at(&self) -> UnixTime {
        self.exp
    }

    /// The client the token was issued to, from the `azp` claim
    #[must_use]
    pub fn authorized_party(&self) -> Option<&ClientIdRef> {
        self.azp.as_deref()
    }

    /// The raw, space-delimited `scope` claim
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// The `permissions` claim, if the token carries one
    pub fn permissions(&self) -> Option<&Permissions> {
        self.permissions.as_ref()
    }
}

impl RegisteredClaims for Claims {
    fn nbf(&self) -> Option<UnixTime> {
        self.nbf
    }

    fn exp(&self) -> Option<UnixTime> {
        Some(self.exp)
    }

    fn iat(&self) -> Option<UnixTime> {
        Some(self.iat)
    }

    fn aud(&self) -> &Audiences {
        &self.aud
    }

    fn iss(&self) -> Option<&IssuerRef> {
        Some(&*self.iss)
    }

    fn sub(&self) -> Option<&SubjectRef> {
        Some(&*self.sub)
    }
}

/// The token payload as it arrives, before required claims are enforced
#[derive(Debug, Deserialize)]
pub(crate) struct ClaimsDto {
    #[serde(flatten)]
    core: BasicClaims,
    #[serde(default)]
    azp: Option<ClientId>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    permissions: Option<Permissions>,
}

impl RegisteredClaims for ClaimsDto {
    fn nbf(&self) -> Option<UnixTime> {
        self.core.nbf()
    }

    fn exp(&self) -> Option<UnixTime> {
        self.core.exp()
    }

    fn iat(&self) -> Option<UnixTime> {
        self.core.iat()
    }

    fn aud(&self) -> &Audiences {
        self.core.aud()
    }

    fn iss(&self) -> Option<&IssuerRef> {
        self.core.iss()
    }

    fn sub(&self) -> Option<&SubjectRef> {
        self.core.sub()
    }
}

impl TryFrom<ClaimsDto> for Claims {
    type Error = ClaimsRejected;

    fn try_from(dto: ClaimsDto) -> Result<Self, Self::Error> {
        let missing = ClaimsRejected::MissingRequiredClaim;

        if dto.aud().is_empty() {
            return Err(missing("aud"));
        }

        Ok(Self {
            iss: dto.iss().ok_or(missing("iss"))?.to_owned(),
            aud: dto.aud().clone(),
            sub: dto.sub().ok_or(missing("sub"))?.to_owned(),
            iat: dto.iat().ok_or(missing("iat"))?,
            exp: dto.exp().ok_or(missing("exp"))?,
            nbf: dto.nbf(),
            azp: dto.azp,
            scope: dto.scope,
            permissions: dto.permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;

    use super::*;

    const AUTH0_PAYLOAD: &str = r#"{
        "iss": "https://tenant.example.com/",
        "sub": "auth0|5f5a1b2c3d4e5f6a7b8c9d0e",
        "aud": ["image", "https://tenant.example.com/userinfo"],
        "iat": 1600000000,
        "exp": 1600007200,
        "azp": "kWj3pNQkTeH2Nm8nEW5lJd0C1X9OD4Wc",
        "scope": "openid profile email",
        "permissions": ["get:images", "post:images"]
    }"#;

    #[test]
    fn decodes_identity_provider_payload() -> Result<()> {
        let claims: Claims = serde_json::from_str(AUTH0_PAYLOAD)?;
        assert_eq!(claims.issuer().as_str(), "https://tenant.example.com/");
        assert!(claims
            .audiences()
            .contains(tollgate::jwt::AudienceRef::from_str("image")));
        assert_eq!(claims.issued_at(), UnixTime(1_600_000_000));
        assert_eq!(claims.expires_at(), UnixTime(1_600_007_200));
        assert_eq!(claims.scope(), Some("openid profile email"));
        assert_eq!(claims.permissions().map(Permissions::len), Some(2));
        Ok(())
    }

    #[test]
    fn missing_permissions_is_not_an_empty_set() -> Result<()> {
        let claims: Claims = serde_json::from_str(
            r#"{ "iss": "i", "sub": "s", "aud": "a", "iat": 1, "exp": 2 }"#,
        )?;
        assert!(claims.permissions().is_none());
        Ok(())
    }

    #[test]
    fn required_claims_are_not_defaulted() {
        let complete = serde_json::json!({
            "iss": "i", "sub": "s", "aud": "a", "iat": 1, "exp": 2
        });

        for claim in ["iss", "sub", "aud", "iat", "exp"] {
            let mut payload = complete.clone();
            if let Some(object) = payload.as_object_mut() {
                object.remove(claim);
            }
            let result = serde_json::from_value::<Claims>(payload);
            assert!(result.is_err(), "{claim} should be required");
        }
    }

    #[test]
    fn empty_audience_list_is_rejected() {
        let result = serde_json::from_str::<Claims>(
            r#"{ "iss": "i", "sub": "s", "aud": [], "iat": 1, "exp": 2 }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn round_trips_through_json() -> Result<()> {
        let claims: Claims = serde_json::from_str(AUTH0_PAYLOAD)?;
        let again: Claims = serde_json::from_value(serde_json::to_value(&claims)?)?;
        assert_eq!(claims, again);
        Ok(())
    }
}
