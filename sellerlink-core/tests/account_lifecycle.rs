//! Integration tests for the linked-account lifecycle.
//!
//! These tests verify the end-to-end functionality of account management:
//! - Linking accounts and the bootstrap SuperAdmin grant
//! - Duplicate eBay user ID rejection
//! - Unlinking with cascaded credential and binding removal
//! - Persistence of accounts and bindings across reloads
//! - Role grant, change, and revoke through the service

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sellerlink_core::authz::Action;
use sellerlink_core::provider::{ProviderError, RefreshExchanger, RefreshedTokens};
use sellerlink_core::refresh::RefreshConfig;
use sellerlink_core::registry::{AccountRegistry, RegistryError};
use sellerlink_core::roles::{RoleBindingStore, RoleError};
use sellerlink_core::users::{MemoryUserDirectory, UserDirectory};
use sellerlink_core::vault::{CredentialVault, MemoryVault, Secret, TokenPair, VaultKey};
use sellerlink_core::{AccountId, EbayUserId, LinkService, Role, SellerlinkError, UserId};
use tempfile::TempDir;

/// Exchanger for tests that never reach the provider.
struct NeverExchanger;

#[async_trait]
impl RefreshExchanger for NeverExchanger {
    async fn exchange(
        &self,
        _account: &AccountId,
        _refresh_token: &Secret,
    ) -> Result<RefreshedTokens, ProviderError> {
        Err(ProviderError::Terminal {
            message: "unexpected exchange in test".to_string(),
        })
    }
}

/// Service plus direct handles to its stores, over a temp directory.
struct Harness {
    service: LinkService,
    registry: Arc<AccountRegistry>,
    roles: Arc<RoleBindingStore>,
    vault: Arc<CredentialVault>,
    users: Arc<MemoryUserDirectory>,
    _temp: TempDir,
}

async fn harness() -> (Harness, UserId) {
    let temp = TempDir::new().unwrap();
    let registry =
        Arc::new(AccountRegistry::load_from_path(temp.path().join("accounts.json")).unwrap());
    let roles =
        Arc::new(RoleBindingStore::load_from_path(temp.path().join("bindings.json")).unwrap());
    let vault = Arc::new(CredentialVault::new(
        Box::new(MemoryVault::new()),
        VaultKey::generate(),
    ));
    let users = Arc::new(MemoryUserDirectory::new());

    let admin = users
        .create_user("admin@example.com", "Ada", "Admin", &Secret::new("pw"))
        .await
        .unwrap()
        .id;

    let service = LinkService::new(
        registry.clone(),
        vault.clone(),
        Arc::new(NeverExchanger),
        roles.clone(),
        users.clone(),
        RefreshConfig::default(),
    );

    (
        Harness {
            service,
            registry,
            roles,
            vault,
            users,
            _temp: temp,
        },
        admin,
    )
}

fn fresh_tokens() -> TokenPair {
    let now = Utc::now();
    TokenPair {
        access_token: Secret::new("access-token"),
        access_expires_at: now + Duration::hours(2),
        refresh_token: Secret::new("refresh-token"),
        refresh_expires_at: now + Duration::days(540),
    }
}

#[tokio::test]
async fn test_link_account_happy_path() {
    let (h, admin) = harness().await;

    let account = h
        .service
        .link_account(
            EbayUserId::new("seller-8842"),
            Some("Main Shop".to_string()),
            &fresh_tokens(),
            admin,
        )
        .await
        .unwrap();

    // Registered with its metadata.
    let stored = h.registry.get(&account.id).unwrap().unwrap();
    assert_eq!(stored.ebay_user_id.as_str(), "seller-8842");
    assert_eq!(stored.label(), "Main Shop");

    // Credentials are in the vault.
    let tokens = h.vault.read_decrypted(&account.id).await.unwrap();
    assert_eq!(tokens.access_token.expose(), "access-token");

    // The linking user holds SuperAdmin.
    let binding = h.roles.get(&admin, &account.id).unwrap().unwrap();
    assert_eq!(binding.role, Role::SuperAdmin);
}

#[tokio::test]
async fn test_link_duplicate_ebay_user_id_fails() {
    let (h, admin) = harness().await;

    h.service
        .link_account(EbayUserId::new("seller-1"), None, &fresh_tokens(), admin)
        .await
        .unwrap();

    let result = h
        .service
        .link_account(EbayUserId::new("seller-1"), None, &fresh_tokens(), admin)
        .await;

    assert!(matches!(
        result,
        Err(SellerlinkError::Registry(
            RegistryError::DuplicateAccount { .. }
        ))
    ));
    assert_eq!(h.registry.list().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unlink_cascades_credentials_and_bindings() {
    let (h, admin) = harness().await;
    let member = h
        .users
        .create_user("member@example.com", "Mo", "Member", &Secret::new("pw"))
        .await
        .unwrap()
        .id;

    let account = h
        .service
        .link_account(EbayUserId::new("seller-1"), None, &fresh_tokens(), admin)
        .await
        .unwrap();
    h.service
        .grant_role(admin, member, account.id, Role::Creator)
        .await
        .unwrap();

    h.service.unlink_account(admin, account.id).await.unwrap();

    assert!(h.registry.get(&account.id).unwrap().is_none());
    assert!(h.roles.list_for_account(&account.id).unwrap().is_empty());
    assert!(h.vault.record(&account.id).await.is_err());
}

#[tokio::test]
async fn test_unlink_unknown_account_fails() {
    let (h, admin) = harness().await;

    let result = h.service.unlink_account(admin, AccountId::new()).await;
    assert!(matches!(result, Err(SellerlinkError::UnknownAccount { .. })));
}

#[tokio::test]
async fn test_role_lifecycle_through_service() {
    let (h, admin) = harness().await;
    let member = h
        .users
        .create_user("member@example.com", "Mo", "Member", &Secret::new("pw"))
        .await
        .unwrap()
        .id;

    let account = h
        .service
        .link_account(EbayUserId::new("seller-1"), None, &fresh_tokens(), admin)
        .await
        .unwrap();

    // Grant, then verify the capability follows the role.
    h.service
        .grant_role(admin, member, account.id, Role::Drafter)
        .await
        .unwrap();
    assert!(h
        .service
        .authorize(&member, &account.id, Action::DraftListing)
        .unwrap()
        .is_allowed());
    assert!(!h
        .service
        .authorize(&member, &account.id, Action::CreateListing)
        .unwrap()
        .is_allowed());

    // Change the role; the old capability goes, the new one arrives.
    h.service
        .change_role(admin, member, account.id, Role::Creator)
        .await
        .unwrap();
    assert!(h
        .service
        .authorize(&member, &account.id, Action::CreateListing)
        .unwrap()
        .is_allowed());
    assert!(!h
        .service
        .authorize(&member, &account.id, Action::DraftListing)
        .unwrap()
        .is_allowed());

    // Revoke; everything goes.
    h.service.revoke_role(admin, member, account.id).unwrap();
    assert!(!h
        .service
        .authorize(&member, &account.id, Action::CreateListing)
        .unwrap()
        .is_allowed());

    // Revoking again reports the missing binding.
    let again = h.service.revoke_role(admin, member, account.id);
    assert!(matches!(
        again,
        Err(SellerlinkError::Role(RoleError::BindingNotFound { .. }))
    ));
}

#[tokio::test]
async fn test_junior_cannot_manage_roles() {
    let (h, admin) = harness().await;
    let reviewer = h
        .users
        .create_user("reviewer@example.com", "Rae", "Reviewer", &Secret::new("pw"))
        .await
        .unwrap()
        .id;
    let target = h
        .users
        .create_user("target@example.com", "Tam", "Target", &Secret::new("pw"))
        .await
        .unwrap()
        .id;

    let account = h
        .service
        .link_account(EbayUserId::new("seller-1"), None, &fresh_tokens(), admin)
        .await
        .unwrap();
    h.service
        .grant_role(admin, reviewer, account.id, Role::Reviewer)
        .await
        .unwrap();

    let result = h
        .service
        .grant_role(reviewer, target, account.id, Role::Drafter)
        .await;
    assert!(matches!(
        result,
        Err(SellerlinkError::Role(
            RoleError::InsufficientPrivilege { .. }
        ))
    ));
}

#[tokio::test]
async fn test_accounts_and_bindings_survive_reload() {
    let temp = TempDir::new().unwrap();
    let accounts_path = temp.path().join("accounts.json");
    let bindings_path = temp.path().join("bindings.json");

    let users = Arc::new(MemoryUserDirectory::new());
    let admin = users
        .create_user("admin@example.com", "Ada", "Admin", &Secret::new("pw"))
        .await
        .unwrap()
        .id;

    let account_id = {
        let registry = Arc::new(AccountRegistry::load_from_path(accounts_path.clone()).unwrap());
        let roles = Arc::new(RoleBindingStore::load_from_path(bindings_path.clone()).unwrap());
        let vault = Arc::new(CredentialVault::new(
            Box::new(MemoryVault::new()),
            VaultKey::generate(),
        ));
        let service = LinkService::new(
            registry,
            vault,
            Arc::new(NeverExchanger),
            roles,
            users.clone(),
            RefreshConfig::default(),
        );

        service
            .link_account(
                EbayUserId::new("seller-1"),
                Some("Shop".to_string()),
                &fresh_tokens(),
                admin,
            )
            .await
            .unwrap()
            .id
    };

    // Reload the file-backed stores and verify everything came back.
    let registry = AccountRegistry::load_from_path(accounts_path).unwrap();
    let roles = RoleBindingStore::load_from_path(bindings_path).unwrap();

    let account = registry.get(&account_id).unwrap().unwrap();
    assert_eq!(account.ebay_user_id.as_str(), "seller-1");

    let binding = roles.get(&admin, &account_id).unwrap().unwrap();
    assert_eq!(binding.role, Role::SuperAdmin);
}

#[tokio::test]
async fn test_rename_keeps_external_id() {
    let (h, admin) = harness().await;

    let account = h
        .service
        .link_account(EbayUserId::new("seller-1"), None, &fresh_tokens(), admin)
        .await
        .unwrap();
    assert_eq!(h.registry.get(&account.id).unwrap().unwrap().label(), "seller-1");

    h.registry
        .rename(&account.id, Some("Storefront".to_string()))
        .unwrap();

    let renamed = h.registry.get(&account.id).unwrap().unwrap();
    assert_eq!(renamed.label(), "Storefront");
    assert_eq!(renamed.ebay_user_id.as_str(), "seller-1");
}
