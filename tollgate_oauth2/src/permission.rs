//! Permissions granted by a token and the policy that gates on them

use std::{collections::btree_set, convert::TryFrom, str::FromStr};

use aliri_braid::braid;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AuthError, Claims};

/// An invalid permission
#[derive(Debug, Error)]
pub enum InvalidPermission {
    /// The permission was the empty string
    #[error("permission cannot be empty")]
    EmptyString,
    /// The permission contained an invalid byte
    #[error("invalid permission byte at position {position}: 0x{value:02x}")]
    InvalidByte {
        /// The index in the permission where the invalid byte was found
        position: usize,
        /// The invalid byte value
        value: u8,
    },
}

impl From<std::convert::Infallible> for InvalidPermission {
    fn from(x: std::convert::Infallible) -> Self {
        match x {}
    }
}

/// A single permission granted by an identity provider, such as `get:images`
///
/// A permission must be composed of printable ASCII characters excluding
/// ` ` (space), `"` (double quote), and `\` (backslash).
#[braid(serde, validator, ref_doc = "A borrowed reference to a [`Permission`]")]
pub struct Permission;

impl aliri_braid::Validator for Permission {
    type Error = InvalidPermission;

    fn validate(s: &str) -> Result<(), Self::Error> {
        if s.is_empty() {
            Err(InvalidPermission::EmptyString)
        } else if let Some((position, &value)) = s
            .as_bytes()
            .iter()
            .enumerate()
            .find(|(_, &b)| b <= 0x20 || b == 0x22 || b == 0x5C || 0x7F <= b)
        {
            Err(InvalidPermission::InvalidByte { position, value })
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum PermissionsDto {
    String(String),
    Array(Vec<String>),
}

impl From<PermissionsDto> for Permissions {
    fn from(dto: PermissionsDto) -> Self {
        match dto {
            PermissionsDto::String(s) => usable(s.split_whitespace().map(str::to_owned)),
            PermissionsDto::Array(arr) => usable(arr),
        }
    }
}

impl From<Permissions> for PermissionsDto {
    fn from(p: Permissions) -> Self {
        Self::Array(p.iter().map(|p| p.as_str().to_owned()).collect())
    }
}

fn usable(granted: impl IntoIterator<Item = String>) -> Permissions {
    let mut permissions = Permissions::empty();

    for (idx, permission) in granted.into_iter().enumerate() {
        match Permission::new(permission) {
            Ok(permission) => permissions.insert(permission),
            Err(err) => {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, permissions.idx = idx, "skipping unusable permission");
            }
        }
    }

    permissions
}

/// The set of permissions carried in a token's `permissions` claim
///
/// Deserializes from either an array of strings or a single space-delimited
/// string, and always serializes as an array. Iteration is in sorted order.
///
/// A granted entry that is not a valid [`Permission`] can never satisfy a
/// [`PermissionPolicy`]. Deserialization skips such entries with a warning
/// instead of rejecting the whole claim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PermissionsDto", into = "PermissionsDto")]
#[must_use]
pub struct Permissions(btree_set::BTreeSet<Permission>);

impl Permissions {
    /// An empty permission set
    #[inline]
    pub const fn empty() -> Self {
        Self(btree_set::BTreeSet::new())
    }

    /// Adds a permission to the set
    #[inline]
    pub fn insert(&mut self, permission: Permission) {
        self.0.insert(permission);
    }

    /// Whether the set grants the given permission
    #[inline]
    #[must_use]
    pub fn contains(&self, permission: &PermissionRef) -> bool {
        self.0.contains(permission)
    }

    /// The number of permissions in the set
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates through the permissions in sorted order
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &PermissionRef> {
        self.0.iter().map(AsRef::as_ref)
    }
}

impl<P> FromIterator<P> for Permissions
where
    P: Into<Permission>,
{
    fn from_iter<I: IntoIterator<Item = P>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl IntoIterator for Permissions {
    type Item = Permission;
    type IntoIter = btree_set::IntoIter<Permission>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl TryFrom<&'_ str> for Permissions {
    type Error = InvalidPermission;

    #[inline]
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.split_whitespace()
            .map(|p| Permission::new(p.to_owned()))
            .collect::<Result<_, _>>()
            .map(Self)
    }
}

impl FromStr for Permissions {
    type Err = InvalidPermission;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

/// An access policy over the permissions carried by a verified token
///
/// # Examples
///
/// ```
/// use tollgate_oauth2::{AuthError, Permissions, PermissionPolicy};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let granted: Permissions = "get:images post:images".parse()?;
///
/// let policy: PermissionPolicy = "get:images".parse()?;
/// assert!(policy.evaluate(Some(&granted)).is_ok());
///
/// let policy: PermissionPolicy = "delete:images".parse()?;
/// assert!(matches!(
///     policy.evaluate(Some(&granted)),
///     Err(AuthError::PermissionDenied)
/// ));
///
/// let policy = PermissionPolicy::authenticated();
/// assert!(matches!(
///     policy.evaluate(None),
///     Err(AuthError::PermissionsClaimMissing)
/// ));
///
/// assert!(PermissionPolicy::allow_any().evaluate(None).is_ok());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct PermissionPolicy {
    inner: PolicyInner,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum PolicyInner {
    AllowAny,
    Authenticated,
    Require(Permission),
}

impl PermissionPolicy {
    /// Skips the permission gate entirely
    ///
    /// Any verified token is accepted, with or without a `permissions` claim.
    #[inline]
    pub const fn allow_any() -> Self {
        Self {
            inner: PolicyInner::AllowAny,
        }
    }

    /// Requires only that the token carry a `permissions` claim
    #[inline]
    pub const fn authenticated() -> Self {
        Self {
            inner: PolicyInner::Authenticated,
        }
    }

    /// Requires the token to grant the given permission
    #[inline]
    pub fn require(permission: impl Into<Permission>) -> Self {
        Self {
            inner: PolicyInner::Require(permission.into()),
        }
    }

    /// The permission required by this policy, if any
    #[must_use]
    pub fn required(&self) -> Option<&PermissionRef> {
        match &self.inner {
            PolicyInner::Require(p) => Some(p.as_ref()),
            _ => None,
        }
    }

    /// Evaluates the permissions granted by a verified token
    ///
    /// # Errors
    ///
    /// * [`AuthError::PermissionsClaimMissing`] when the token has no
    ///   `permissions` claim, unless the policy allows any token
    /// * [`AuthError::PermissionDenied`] when the required permission is not
    ///   granted
    pub fn evaluate(&self, granted: Option<&Permissions>) -> Result<(), AuthError> {
        if self.inner == PolicyInner::AllowAny {
            return Ok(());
        }

        let granted = granted.ok_or(AuthError::PermissionsClaimMissing)?;

        match &self.inner {
            PolicyInner::Require(required) if !granted.contains(required) => {
                tracing::debug!(permission = %required, "required permission not granted");
                Err(AuthError::PermissionDenied)
            }
            _ => Ok(()),
        }
    }
}

impl Default for PermissionPolicy {
    #[inline]
    fn default() -> Self {
        Self::authenticated()
    }
}

impl From<Permission> for PermissionPolicy {
    #[inline]
    fn from(permission: Permission) -> Self {
        Self::require(permission)
    }
}

/// Parses a required permission; the empty string requires authentication only
impl FromStr for PermissionPolicy {
    type Err = InvalidPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            Ok(Self::authenticated())
        } else {
            Permission::new(s.to_owned()).map(Self::require)
        }
    }
}

/// Checks the verified claims against a permission policy
///
/// # Errors
///
/// See [`PermissionPolicy::evaluate`].
#[inline]
pub fn check_permissions(policy: &PermissionPolicy, claims: &Claims) -> Result<(), AuthError> {
    policy.evaluate(claims.permissions())
}

#[cfg(test)]
mod tests {
    use color_eyre::Result;
    use tracing_test::traced_test;

    use super::*;

    fn granted(perms: &[&str]) -> Permissions {
        perms.join(" ").parse().expect("valid permissions")
    }

    #[test]
    fn required_permission_present() -> Result<()> {
        let policy: PermissionPolicy = "get:x".parse()?;
        policy.evaluate(Some(&granted(&["get:x"])))?;
        Ok(())
    }

    #[test]
    fn required_permission_absent_is_forbidden() -> Result<()> {
        let policy: PermissionPolicy = "post:x".parse()?;
        let err = policy.evaluate(Some(&granted(&["get:x"]))).unwrap_err();
        assert!(matches!(err, AuthError::PermissionDenied));
        assert_eq!(err.status().as_u16(), 403);
        Ok(())
    }

    #[test]
    fn missing_claim_is_bad_request_regardless_of_requirement() -> Result<()> {
        for required in ["", "get:x", "post:x"] {
            let policy: PermissionPolicy = required.parse()?;
            let err = policy.evaluate(None).unwrap_err();
            assert!(matches!(err, AuthError::PermissionsClaimMissing));
            assert_eq!(err.status().as_u16(), 400);
        }
        Ok(())
    }

    #[test]
    fn empty_requirement_accepts_empty_permission_list() -> Result<()> {
        let policy: PermissionPolicy = "".parse()?;
        assert_eq!(policy, PermissionPolicy::authenticated());
        policy.evaluate(Some(&Permissions::empty()))?;
        Ok(())
    }

    #[test]
    fn allow_any_skips_the_gate() {
        assert!(PermissionPolicy::allow_any().evaluate(None).is_ok());
        assert!(PermissionPolicy::allow_any().required().is_none());
    }

    #[test]
    fn rejects_permission_with_whitespace() {
        assert!("get images".parse::<PermissionPolicy>().is_err());
        assert!(Permission::new("get:images\n".to_owned()).is_err());
    }

    #[test]
    fn permissions_deserialize_from_array_or_string() -> Result<()> {
        let from_array: Permissions = serde_json::from_str(r#"["post:images", "get:images"]"#)?;
        let from_string: Permissions = serde_json::from_str(r#""get:images post:images""#)?;
        assert_eq!(from_array, from_string);
        assert_eq!(
            from_array.iter().map(PermissionRef::as_str).collect::<Vec<_>>(),
            ["get:images", "post:images"]
        );
        Ok(())
    }

    #[test]
    fn permissions_serialize_as_array() -> Result<()> {
        let value = serde_json::to_value(granted(&["get:x", "post:x"]))?;
        assert_eq!(value, serde_json::json!(["get:x", "post:x"]));
        Ok(())
    }

    #[test]
    #[traced_test]
    fn unusable_granted_permissions_are_skipped() -> Result<()> {
        let permissions: Permissions = serde_json::from_str(
            r#"["get:x", "", "read:données", "manage images", "say:\"hi\""]"#,
        )?;

        assert_eq!(
            permissions.iter().map(PermissionRef::as_str).collect::<Vec<_>>(),
            ["get:x"]
        );
        assert!(logs_contain("skipping unusable permission"));
        Ok(())
    }

    #[test]
    fn unusable_entry_in_string_form_is_skipped() -> Result<()> {
        let permissions: Permissions = serde_json::from_str(r#""get:x read:données""#)?;
        assert_eq!(permissions.len(), 1);
        Ok(())
    }

    #[test]
    fn parsing_stays_strict() {
        assert!("get:x read:données".parse::<Permissions>().is_err());
    }

    #[test]
    fn claim_must_hold_strings() {
        assert!(serde_json::from_str::<Permissions>("[1, 2]").is_err());
        assert!(serde_json::from_str::<Permissions>("{}").is_err());
    }
}
