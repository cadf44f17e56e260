//! Permission resolution.
//!
//! This module provides:
//! - [`Action`] - Closed set of things a user can attempt on an account
//! - [`Decision`] - Allowed or Denied, nothing in between
//! - [`AuthorizationEngine`] - Resolves (user, account, action) to a decision
//!
//! Resolution consults the role binding store: no binding means denied, with
//! no implicit default role. A role held on one account says nothing about
//! any other account.

use std::sync::Arc;

use crate::model::{AccountId, Role, UserId};
use crate::roles::{RoleBindingStore, RoleError};

/// An action a user can attempt on a linked account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Grant, change, or revoke role bindings on the account.
    ManageRoles,

    /// Replace or remove the account's stored credentials.
    ManageCredentials,

    /// Create listings on the account.
    CreateListing,

    /// Review listings on the account.
    ReviewListing,

    /// Work on draft listings only.
    DraftListing,
}

impl Action {
    /// Get the action as a stable string, for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManageRoles => "manage-roles",
            Self::ManageCredentials => "manage-credentials",
            Self::CreateListing => "create-listing",
            Self::ReviewListing => "review-listing",
            Self::DraftListing => "draft-listing",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied,
}

impl Decision {
    /// Whether the check allowed the action.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Whether a role carries a capability.
///
/// This is the whole policy: a fixed table, exhaustive over both enums, so
/// adding a role or an action fails to compile until it is placed here.
fn role_permits(role: Role, action: Action) -> bool {
    match role {
        Role::SuperAdmin | Role::Admin => match action {
            Action::ManageRoles
            | Action::ManageCredentials
            | Action::CreateListing
            | Action::ReviewListing
            | Action::DraftListing => true,
        },
        Role::Reviewer => matches!(action, Action::ReviewListing),
        Role::Creator => matches!(action, Action::CreateListing),
        Role::Drafter => matches!(action, Action::DraftListing),
    }
}

/// Resolves whether a user may perform an action on an account.
pub struct AuthorizationEngine {
    bindings: Arc<RoleBindingStore>,
}

impl AuthorizationEngine {
    /// Create an engine over the given binding store.
    pub fn new(bindings: Arc<RoleBindingStore>) -> Self {
        Self { bindings }
    }

    /// Decide whether `user` may perform `action` on `account`.
    ///
    /// Absence of a binding is an ordinary denial, not an error.
    pub fn authorize(
        &self,
        user: &UserId,
        account: &AccountId,
        action: Action,
    ) -> Result<Decision, RoleError> {
        let Some(binding) = self.bindings.get(user, account)? else {
            tracing::debug!(%user, %account, %action, "denied: no role binding");
            return Ok(Decision::Denied);
        };

        if role_permits(binding.role, action) {
            tracing::debug!(%user, %account, %action, role = %binding.role, "allowed");
            Ok(Decision::Allowed)
        } else {
            tracing::debug!(%user, %account, %action, role = %binding.role, "denied");
            Ok(Decision::Denied)
        }
    }
}

impl std::fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationEngine").finish_non_exhaustive()
    }
}
