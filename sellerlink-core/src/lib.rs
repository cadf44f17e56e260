//! # Sellerlink Core
//!
//! Core library for sellerlink multi-account eBay credential and access
//! management.
//!
//! This crate provides:
//! - Domain types for users, linked accounts, and role bindings
//! - An encrypted credential vault with pluggable storage backends
//! - A refresh coordinator that keeps access tokens usable without
//!   duplicated provider calls
//! - Role-based authorization over per-account capabilities
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sellerlink_core::{AccountId, LinkService};
//!
//! async fn fetch_token(
//!     service: &LinkService,
//!     account: &AccountId,
//! ) -> Result<String, sellerlink_core::SellerlinkError> {
//!     let token = service.access_token(account).await?;
//!     Ok(token.expose().to_string())
//! }
//! ```

pub mod authz;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod refresh;
pub mod registry;
pub mod roles;
pub mod service;
pub mod users;
pub mod vault;

// Re-export commonly used types at crate root
pub use model::{
    Account,
    AccountId,
    EbayUserId,
    Role,
    RoleBinding,
    UserId,
};

pub use vault::{
    resolve_vault_key,
    CredentialVault,
    MemoryVault,
    Secret,
    TokenPair,
    VaultBackend,
    VaultError,
    VaultKey,
};

#[cfg(feature = "keyring-store")]
pub use vault::KeyringKeyStore;

pub use refresh::{
    CredentialState,
    RefreshConfig,
    RefreshError,
    TokenRefreshCoordinator,
};

pub use authz::{
    Action,
    AuthorizationEngine,
    Decision,
};

pub use roles::{
    Actor,
    RoleBindingStore,
    RoleError,
};

pub use registry::{
    AccountRegistry,
    RegistryError,
};

pub use users::{
    MemoryUserDirectory,
    User,
    UserDirectory,
    UserError,
};

pub use provider::{
    ProviderEndpoints,
    ProviderError,
    RefreshExchanger,
    RefreshedTokens,
};

#[cfg(feature = "oauth")]
pub use provider::OAuthRefreshExchanger;

pub use config::{
    load_config,
    Environment,
    ServiceConfig,
};

pub use error::SellerlinkError;

pub use service::LinkService;
