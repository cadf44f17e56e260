//! Domain model types for sellerlink.
//!
//! This module defines the core types used throughout the crate:
//! - [`EbayUserId`] - Opaque identifier of a seller account on eBay's side
//! - [`AccountId`] - Internal handle for a linked account
//! - [`UserId`] - Internal handle for a user in the directory
//! - [`Account`] - Linked account metadata
//! - [`Role`] - Closed set of per-account roles
//! - [`RoleBinding`] - The (user, account, role) authorization edge

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque eBay user identifier for a linked seller account.
///
/// Assigned by eBay during the consent flow; unique across all linked
/// accounts and immutable after linking. Kept verbatim (no normalization),
/// since eBay treats it as an opaque string.
///
/// # Examples
///
/// ```
/// use sellerlink_core::EbayUserId;
///
/// let id = EbayUserId::new("seller-8842");
/// assert_eq!(id.as_str(), "seller-8842");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EbayUserId(String);

impl EbayUserId {
    /// Create a new eBay user ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EbayUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EbayUserId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EbayUserId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Internal handle for a linked account.
///
/// Generated when the account is registered; all other components refer to
/// the account through this handle rather than the external identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Generate a fresh account ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AccountId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Internal handle for a user.
///
/// Users are owned by the external [`UserDirectory`](crate::users::UserDirectory);
/// role bindings hold this non-owning reference only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Generate a fresh user ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Metadata for a linked eBay seller account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Internal handle for this account.
    pub id: AccountId,

    /// Unique external identifier, immutable after linking.
    pub ebay_user_id: EbayUserId,

    /// Optional human-readable name for the account.
    pub display_name: Option<String>,

    /// When the account was linked.
    pub created_at: DateTime<Utc>,

    /// When the account metadata was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with fresh timestamps.
    pub fn new(ebay_user_id: EbayUserId, display_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::new(),
            ebay_user_id,
            display_name,
            created_at: now,
            updated_at: now,
        }
    }

    /// Human-readable label: the display name, falling back to the
    /// external identifier.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.ebay_user_id.as_str())
    }

    /// Bump the modification timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Per-account role a user can hold.
///
/// A closed set: every capability decision is an exhaustive match, so adding
/// a role forces every table to be revisited at compile time.
///
/// Escalation order: `SuperAdmin` outranks `Admin`, which outranks the three
/// junior roles. `Reviewer`, `Creator`, and `Drafter` are capability siblings
/// with equal escalation rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "Super-Admin")]
    SuperAdmin,
    Admin,
    Reviewer,
    Creator,
    Drafter,
}

impl Role {
    /// Get the role as its wire string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "Super-Admin",
            Self::Admin => "Admin",
            Self::Reviewer => "Reviewer",
            Self::Creator => "Creator",
            Self::Drafter => "Drafter",
        }
    }

    /// Rank used for escalation checks.
    ///
    /// Granting or setting a role with a higher rank than the actor's own is
    /// a privilege violation. The junior roles share a rank: none of them can
    /// manage roles at all, so their relative order never matters.
    pub fn escalation_rank(&self) -> u8 {
        match self {
            Self::SuperAdmin => 3,
            Self::Admin => 2,
            Self::Reviewer | Self::Creator | Self::Drafter => 1,
        }
    }

    /// Whether this role is an administrative one (Admin or SuperAdmin).
    pub fn is_administrative(&self) -> bool {
        self.escalation_rank() >= 2
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The authorization edge associating a user with an account.
///
/// At most one binding exists per (user, account) pair; changing a user's
/// role mutates the existing binding rather than adding a second one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleBinding {
    /// The user holding the role.
    pub user: UserId,

    /// The account the role applies to.
    pub account: AccountId,

    /// The role held.
    pub role: Role,

    /// When the binding was created.
    pub created_at: DateTime<Utc>,

    /// When the binding was last modified.
    pub updated_at: DateTime<Utc>,
}

impl RoleBinding {
    /// Create a new binding with fresh timestamps.
    pub fn new(user: UserId, account: AccountId, role: Role) -> Self {
        let now = Utc::now();
        Self {
            user,
            account,
            role,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the role and bump the modification timestamp.
    pub fn set_role(&mut self, role: Role) {
        self.role = role;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_label_falls_back_to_external_id() {
        let named = Account::new(EbayUserId::new("seller-1"), Some("Shop One".to_string()));
        assert_eq!(named.label(), "Shop One");

        let unnamed = Account::new(EbayUserId::new("seller-2"), None);
        assert_eq!(unnamed.label(), "seller-2");

        let blank = Account::new(EbayUserId::new("seller-3"), Some(String::new()));
        assert_eq!(blank.label(), "seller-3");
    }

    #[test]
    fn test_role_escalation_order() {
        assert!(Role::SuperAdmin.escalation_rank() > Role::Admin.escalation_rank());
        assert!(Role::Admin.escalation_rank() > Role::Reviewer.escalation_rank());
        assert_eq!(
            Role::Reviewer.escalation_rank(),
            Role::Drafter.escalation_rank()
        );
    }

    #[test]
    fn test_role_wire_strings() {
        let encoded = serde_json::to_string(&Role::SuperAdmin).unwrap();
        assert_eq!(encoded, "\"Super-Admin\"");

        let decoded: Role = serde_json::from_str("\"Drafter\"").unwrap();
        assert_eq!(decoded, Role::Drafter);
    }

    #[test]
    fn test_set_role_bumps_updated_at() {
        let mut binding = RoleBinding::new(UserId::new(), AccountId::new(), Role::Drafter);
        let created = binding.updated_at;
        binding.set_role(Role::Creator);
        assert_eq!(binding.role, Role::Creator);
        assert!(binding.updated_at >= created);
    }
}
