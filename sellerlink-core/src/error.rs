//! Top-level error type for sellerlink.

use thiserror::Error;

use crate::config::ConfigError;
use crate::provider::ProviderError;
use crate::refresh::RefreshError;
use crate::registry::RegistryError;
use crate::roles::RoleError;
use crate::users::UserError;
use crate::vault::VaultError;

/// Top-level error type encompassing all sellerlink errors.
#[derive(Debug, Error)]
pub enum SellerlinkError {
    /// Error from the account registry.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Error from the credential vault.
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    /// Error from refresh coordination.
    #[error("refresh error: {0}")]
    Refresh(#[from] RefreshError),

    /// Error from the provider exchange.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from role binding operations.
    #[error("role error: {0}")]
    Role(#[from] RoleError),

    /// Error from the user directory.
    #[error("user directory error: {0}")]
    User(#[from] UserError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The named user does not exist or is inactive.
    #[error("user {user} is unknown or inactive")]
    UnknownUser { user: crate::model::UserId },

    /// The named account is not linked.
    #[error("account {account} is not linked")]
    UnknownAccount { account: crate::model::AccountId },

    /// The acting user is not authorized for the attempted operation.
    #[error("user {user} is not authorized to {action} on account {account}")]
    NotAuthorized {
        user: crate::model::UserId,
        account: crate::model::AccountId,
        action: crate::authz::Action,
    },
}
