//! Service facade wiring the stores, vault, and engines together.
//!
//! [`LinkService`] owns the component graph and is where cross-component
//! rules live: identity validation for grants, authorization gates on
//! credential mutation, cascade deletion on unlink, and admin notification
//! when an account's grant dies.

use std::sync::Arc;

use crate::authz::{Action, AuthorizationEngine, Decision};
use crate::error::SellerlinkError;
use crate::model::{Account, AccountId, EbayUserId, Role, RoleBinding, UserId};
use crate::provider::RefreshExchanger;
use crate::refresh::{CredentialState, RefreshConfig, RefreshError, TokenRefreshCoordinator};
use crate::registry::AccountRegistry;
use crate::roles::{Actor, RoleBindingStore};
use crate::users::UserDirectory;
use crate::vault::{CredentialVault, Secret, TokenPair};

/// The linked-accounts service.
///
/// All request-path entry points take the acting user explicitly; nothing is
/// resolved from ambient state.
pub struct LinkService {
    registry: Arc<AccountRegistry>,
    vault: Arc<CredentialVault>,
    coordinator: TokenRefreshCoordinator,
    roles: Arc<RoleBindingStore>,
    authz: AuthorizationEngine,
    users: Arc<dyn UserDirectory>,
}

impl LinkService {
    /// Wire up a service over the given components.
    pub fn new(
        registry: Arc<AccountRegistry>,
        vault: Arc<CredentialVault>,
        exchanger: Arc<dyn RefreshExchanger>,
        roles: Arc<RoleBindingStore>,
        users: Arc<dyn UserDirectory>,
        refresh_config: RefreshConfig,
    ) -> Self {
        let coordinator = TokenRefreshCoordinator::with_config(vault.clone(), exchanger, refresh_config);
        let authz = AuthorizationEngine::new(roles.clone());

        Self {
            registry,
            vault,
            coordinator,
            roles,
            authz,
            users,
        }
    }

    /// Link a new seller account.
    ///
    /// Registers the account, seals and stores the token pair from the
    /// consent flow, and grants `initial_admin` the SuperAdmin role. The
    /// grant runs as [`Actor::System`]: a freshly linked account has no
    /// administrator who could authorize it.
    pub async fn link_account(
        &self,
        ebay_user_id: EbayUserId,
        display_name: Option<String>,
        tokens: &TokenPair,
        initial_admin: UserId,
    ) -> Result<Account, SellerlinkError> {
        self.require_active_user(&initial_admin).await?;

        let account = Account::new(ebay_user_id, display_name);
        let account_id = account.id;
        self.registry.add(account.clone())?;

        self.coordinator.store_credentials(account_id, tokens).await?;
        self.roles
            .grant(Actor::System, initial_admin, account_id, Role::SuperAdmin)?;

        tracing::info!(account = %account_id, admin = %initial_admin, "account linked");
        Ok(account)
    }

    /// Unlink an account, cascading credential and role-binding removal.
    ///
    /// Requires the actor to hold credential management capability on the
    /// account.
    pub async fn unlink_account(
        &self,
        actor: UserId,
        account: AccountId,
    ) -> Result<(), SellerlinkError> {
        self.require_account(&account)?;
        self.require_capability(&actor, &account, Action::ManageCredentials)?;

        self.vault.remove(&account).await?;
        self.roles.remove_all_for_account(&account)?;
        self.registry.remove(&account)?;
        self.coordinator.forget(&account);

        tracing::info!(%account, %actor, "account unlinked");
        Ok(())
    }

    /// Replace an account's stored credentials with a fresh consent result.
    ///
    /// Clears any remembered terminal refresh failure.
    pub async fn replace_credentials(
        &self,
        actor: UserId,
        account: AccountId,
        tokens: &TokenPair,
    ) -> Result<(), SellerlinkError> {
        self.require_account(&account)?;
        self.require_capability(&actor, &account, Action::ManageCredentials)?;

        self.coordinator.store_credentials(account, tokens).await?;
        Ok(())
    }

    /// Get a usable access token for an account, refreshing if needed.
    ///
    /// On a terminal refresh failure the account's administrators are named
    /// in the log so re-consent can be driven by a human.
    pub async fn access_token(&self, account: &AccountId) -> Result<Secret, SellerlinkError> {
        match self.coordinator.ensure_access_token(account).await {
            Ok(token) => Ok(token),
            Err(e @ (RefreshError::Terminal { .. } | RefreshError::ReauthRequired { .. })) => {
                self.notify_admins_of_dead_grant(account);
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Report the lifecycle state of an account's credentials.
    pub async fn credential_state(
        &self,
        account: &AccountId,
    ) -> Result<CredentialState, SellerlinkError> {
        Ok(self.coordinator.state(account).await?)
    }

    /// Grant a role to a user on an account.
    ///
    /// The subject must exist and be active in the directory, and the
    /// account must be linked; the binding store then enforces escalation.
    pub async fn grant_role(
        &self,
        actor: UserId,
        user: UserId,
        account: AccountId,
        role: Role,
    ) -> Result<RoleBinding, SellerlinkError> {
        self.require_account(&account)?;
        self.require_active_user(&user).await?;

        Ok(self.roles.grant(Actor::User(actor), user, account, role)?)
    }

    /// Change the role a user holds on an account.
    pub async fn change_role(
        &self,
        actor: UserId,
        user: UserId,
        account: AccountId,
        role: Role,
    ) -> Result<RoleBinding, SellerlinkError> {
        self.require_account(&account)?;

        Ok(self.roles.set_role(Actor::User(actor), user, account, role)?)
    }

    /// Revoke a user's role on an account.
    pub fn revoke_role(
        &self,
        actor: UserId,
        user: UserId,
        account: AccountId,
    ) -> Result<(), SellerlinkError> {
        Ok(self.roles.revoke(Actor::User(actor), user, account)?)
    }

    /// Cascade removal of a user's bindings after directory-side deletion.
    pub fn user_removed(&self, user: &UserId) -> Result<usize, SellerlinkError> {
        Ok(self.roles.remove_all_for_user(user)?)
    }

    /// Decide whether a user may perform an action on an account.
    pub fn authorize(
        &self,
        user: &UserId,
        account: &AccountId,
        action: Action,
    ) -> Result<Decision, SellerlinkError> {
        Ok(self.authz.authorize(user, account, action)?)
    }

    fn require_account(&self, account: &AccountId) -> Result<(), SellerlinkError> {
        match self.registry.get(account)? {
            Some(_) => Ok(()),
            None => Err(SellerlinkError::UnknownAccount { account: *account }),
        }
    }

    async fn require_active_user(&self, user: &UserId) -> Result<(), SellerlinkError> {
        match self.users.get(user).await? {
            Some(record) if record.is_active => Ok(()),
            _ => Err(SellerlinkError::UnknownUser { user: *user }),
        }
    }

    fn require_capability(
        &self,
        user: &UserId,
        account: &AccountId,
        action: Action,
    ) -> Result<(), SellerlinkError> {
        match self.authz.authorize(user, account, action)? {
            Decision::Allowed => Ok(()),
            Decision::Denied => Err(SellerlinkError::NotAuthorized {
                user: *user,
                account: *account,
                action,
            }),
        }
    }

    fn notify_admins_of_dead_grant(&self, account: &AccountId) {
        let admins: Vec<UserId> = self
            .roles
            .list_for_account(account)
            .map(|bindings| {
                bindings
                    .into_iter()
                    .filter(|b| b.role.is_administrative())
                    .map(|b| b.user)
                    .collect()
            })
            .unwrap_or_default();

        tracing::warn!(
            %account,
            ?admins,
            "refresh grant is dead, account requires re-consent by an administrator"
        );
    }
}

impl std::fmt::Debug for LinkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderError, RefreshedTokens};
    use crate::users::MemoryUserDirectory;
    use crate::vault::VaultKey;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

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

    async fn service_with_admin() -> (LinkService, UserId, TempDir) {
        let temp = TempDir::new().unwrap();
        let registry = Arc::new(
            AccountRegistry::load_from_path(temp.path().join("accounts.json")).unwrap(),
        );
        let roles = Arc::new(
            RoleBindingStore::load_from_path(temp.path().join("bindings.json")).unwrap(),
        );
        let vault = Arc::new(CredentialVault::new(
            Box::new(crate::vault::MemoryVault::new()),
            VaultKey::generate(),
        ));
        let users = Arc::new(MemoryUserDirectory::new());
        let admin = users
            .create_user("admin@example.com", "Ada", "Admin", &Secret::new("pw"))
            .await
            .unwrap()
            .id;

        let service = LinkService::new(
            registry,
            vault,
            Arc::new(NeverExchanger),
            roles,
            users,
            RefreshConfig::default(),
        );
        (service, admin, temp)
    }

    fn tokens() -> TokenPair {
        let now = Utc::now();
        TokenPair {
            access_token: Secret::new("access"),
            access_expires_at: now + Duration::hours(2),
            refresh_token: Secret::new("refresh"),
            refresh_expires_at: now + Duration::days(540),
        }
    }

    #[tokio::test]
    async fn test_link_grants_super_admin() {
        let (service, admin, _temp) = service_with_admin().await;

        let account = service
            .link_account(EbayUserId::new("seller-1"), None, &tokens(), admin)
            .await
            .unwrap();

        let decision = service
            .authorize(&admin, &account.id, Action::ManageRoles)
            .unwrap();
        assert!(decision.is_allowed());

        let token = service.access_token(&account.id).await.unwrap();
        assert_eq!(token.expose(), "access");
    }

    #[tokio::test]
    async fn test_link_requires_known_admin() {
        let (service, _admin, _temp) = service_with_admin().await;

        let result = service
            .link_account(EbayUserId::new("seller-1"), None, &tokens(), UserId::new())
            .await;
        assert!(matches!(result, Err(SellerlinkError::UnknownUser { .. })));

        // Nothing was registered.
        assert!(service
            .registry
            .find_by_ebay_user_id(&EbayUserId::new("seller-1"))
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unlink_cascades() {
        let (service, admin, _temp) = service_with_admin().await;
        let member = service
            .users
            .create_user("member@example.com", "Mo", "Member", &Secret::new("pw"))
            .await
            .unwrap()
            .id;

        let account = service
            .link_account(EbayUserId::new("seller-1"), None, &tokens(), admin)
            .await
            .unwrap();
        service
            .grant_role(admin, member, account.id, Role::Drafter)
            .await
            .unwrap();

        service.unlink_account(admin, account.id).await.unwrap();

        assert!(service.registry.get(&account.id).unwrap().is_none());
        assert!(service
            .roles
            .list_for_account(&account.id)
            .unwrap()
            .is_empty());
        assert!(service.vault.record(&account.id).await.is_err());
    }

    #[tokio::test]
    async fn test_non_admin_cannot_replace_credentials() {
        let (service, admin, _temp) = service_with_admin().await;
        let drafter = service
            .users
            .create_user("d@example.com", "Dee", "Drafter", &Secret::new("pw"))
            .await
            .unwrap()
            .id;

        let account = service
            .link_account(EbayUserId::new("seller-1"), None, &tokens(), admin)
            .await
            .unwrap();
        service
            .grant_role(admin, drafter, account.id, Role::Drafter)
            .await
            .unwrap();

        let result = service
            .replace_credentials(drafter, account.id, &tokens())
            .await;
        assert!(matches!(result, Err(SellerlinkError::NotAuthorized { .. })));

        let unlink = service.unlink_account(drafter, account.id).await;
        assert!(matches!(unlink, Err(SellerlinkError::NotAuthorized { .. })));
    }

    #[tokio::test]
    async fn test_grant_rejects_inactive_user() {
        let (service, admin, _temp) = service_with_admin().await;
        let inactive = service
            .users
            .create_user("gone@example.com", "Gone", "User", &Secret::new("pw"))
            .await
            .unwrap()
            .id;
        service.users.deactivate(&inactive).await.unwrap();

        let account = service
            .link_account(EbayUserId::new("seller-1"), None, &tokens(), admin)
            .await
            .unwrap();

        let result = service
            .grant_role(admin, inactive, account.id, Role::Drafter)
            .await;
        assert!(matches!(result, Err(SellerlinkError::UnknownUser { .. })));
    }

    #[tokio::test]
    async fn test_grant_rejects_unlinked_account() {
        let (service, admin, _temp) = service_with_admin().await;

        let result = service
            .grant_role(admin, admin, AccountId::new(), Role::Drafter)
            .await;
        assert!(matches!(result, Err(SellerlinkError::UnknownAccount { .. })));
    }

    #[tokio::test]
    async fn test_user_removed_cascades_bindings() {
        let (service, admin, _temp) = service_with_admin().await;
        let member = service
            .users
            .create_user("member@example.com", "Mo", "Member", &Secret::new("pw"))
            .await
            .unwrap()
            .id;

        let first = service
            .link_account(EbayUserId::new("seller-1"), None, &tokens(), admin)
            .await
            .unwrap();
        let second = service
            .link_account(EbayUserId::new("seller-2"), None, &tokens(), admin)
            .await
            .unwrap();
        service
            .grant_role(admin, member, first.id, Role::Creator)
            .await
            .unwrap();
        service
            .grant_role(admin, member, second.id, Role::Reviewer)
            .await
            .unwrap();

        assert_eq!(service.user_removed(&member).unwrap(), 2);
        assert!(!service
            .authorize(&member, &first.id, Action::CreateListing)
            .unwrap()
            .is_allowed());
    }
}
