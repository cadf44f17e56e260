//! Token refresh coordination.
//!
//! This module provides:
//! - [`CredentialState`] - Where an account's credentials sit in their lifecycle
//! - [`RefreshConfig`] - Buffers, retry counts, and backoff bounds
//! - [`TokenRefreshCoordinator`] - Single-flight refresh with bounded retries
//!
//! # Single flight
//!
//! Concurrent callers asking for the same account's access token collapse
//! into one provider exchange: the first caller refreshes, the rest wait on
//! the per-account flight lock and then re-read the stored result. Distinct
//! accounts refresh independently.
//!
//! # Failure handling
//!
//! Transient provider failures are retried with exponential backoff up to a
//! configured attempt cap. Terminal failures (revoked grant, expired refresh
//! token) are remembered: the account stays in [`CredentialState::RefreshFailed`]
//! and no further exchanges are attempted until new credentials are stored.

use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::model::AccountId;
use crate::provider::{ProviderError, RefreshExchanger};
use crate::vault::{CredentialVault, Secret, TokenPair, VaultError};

/// Default expiry buffer in minutes.
///
/// Access tokens are treated as expiring this many minutes early, so a token
/// handed to a caller does not lapse mid-request.
const DEFAULT_EXPIRY_BUFFER_MINUTES: i64 = 5;

/// Default cap on exchange attempts per refresh.
const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Error type for refresh coordination.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// Reading or writing the vault failed.
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// The refresh token itself has expired; only a new consent flow can
    /// restore the account.
    #[error("refresh token for account {account} has expired, re-consent required")]
    ReauthRequired { account: AccountId },

    /// The provider rejected the grant. The account stays failed until new
    /// credentials are stored.
    #[error("refresh for account {account} failed terminally: {message}")]
    Terminal { account: AccountId, message: String },

    /// Every attempt hit a transient failure. The account is not marked
    /// failed; a later call may succeed.
    #[error("refresh for account {account} exhausted {attempts} attempts: {message}")]
    Exhausted {
        account: AccountId,
        attempts: u32,
        message: String,
    },
}

/// Where an account's credentials sit in their lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    /// The access token is usable as-is.
    Valid,

    /// The access token expires within the buffer window; a refresh is due.
    NearExpiry,

    /// The access token has expired; a refresh is required before use.
    Expired,

    /// A refresh exchange is in flight for this account.
    Refreshing,

    /// The last refresh failed terminally. Cleared only by storing new
    /// credentials.
    RefreshFailed,
}

/// Tuning knobs for the refresh coordinator.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// How long before actual expiry a token counts as expiring.
    pub expiry_buffer: ChronoDuration,

    /// Cap on exchange attempts per refresh, counting the first.
    pub max_attempts: u32,

    /// Backoff before the second attempt; doubles each retry.
    pub initial_backoff: Duration,

    /// Upper bound on the per-retry backoff.
    pub max_backoff: Duration,

    /// Wall-clock limit on a single exchange attempt.
    pub attempt_timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            expiry_buffer: ChronoDuration::minutes(DEFAULT_EXPIRY_BUFFER_MINUTES),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            attempt_timeout: Duration::from_secs(20),
        }
    }
}

impl RefreshConfig {
    /// Backoff to apply after the given failed attempt (1-based).
    fn backoff_after(&self, attempt: u32) -> Duration {
        let doubled = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        doubled.min(self.max_backoff)
    }
}

/// Single-flight token refresh coordinator.
///
/// Owns the credential vault handle and a [`RefreshExchanger`]; all access
/// token reads go through [`ensure_access_token`](Self::ensure_access_token)
/// so expired tokens are never handed out.
pub struct TokenRefreshCoordinator {
    vault: Arc<CredentialVault>,
    exchanger: Arc<dyn RefreshExchanger>,
    config: RefreshConfig,

    /// Per-account flight locks. Waiters for an in-flight refresh queue here.
    flights: Mutex<HashMap<AccountId, Arc<tokio::sync::Mutex<()>>>>,

    /// Accounts with an exchange currently in flight.
    refreshing: Arc<Mutex<HashSet<AccountId>>>,

    /// Accounts whose last refresh failed terminally.
    failed: Mutex<HashSet<AccountId>>,
}

impl TokenRefreshCoordinator {
    /// Create a coordinator with default tuning.
    pub fn new(vault: Arc<CredentialVault>, exchanger: Arc<dyn RefreshExchanger>) -> Self {
        Self::with_config(vault, exchanger, RefreshConfig::default())
    }

    /// Create a coordinator with explicit tuning.
    pub fn with_config(
        vault: Arc<CredentialVault>,
        exchanger: Arc<dyn RefreshExchanger>,
        config: RefreshConfig,
    ) -> Self {
        Self {
            vault,
            exchanger,
            config,
            flights: Mutex::new(HashMap::new()),
            refreshing: Arc::new(Mutex::new(HashSet::new())),
            failed: Mutex::new(HashSet::new()),
        }
    }

    /// Store new credentials for an account.
    ///
    /// Clears any remembered terminal failure: fresh consent supersedes a
    /// dead grant.
    pub async fn store_credentials(
        &self,
        account: AccountId,
        tokens: &TokenPair,
    ) -> Result<(), RefreshError> {
        if tokens.access_expires_at > tokens.refresh_expires_at {
            tracing::warn!(
                %account,
                "access token outlives refresh token, treating refresh expiry as authoritative"
            );
        }

        self.vault.store(account, tokens).await?;
        self.failed.lock().remove(&account);
        Ok(())
    }

    /// Drop per-account coordination state.
    ///
    /// Called when an account is unlinked; the flight lock and any
    /// remembered terminal failure go with it. A refresh already in flight
    /// keeps its own handle on the lock and finishes undisturbed.
    pub fn forget(&self, account: &AccountId) {
        self.flights.lock().remove(account);
        self.failed.lock().remove(account);
    }

    /// Report the lifecycle state of an account's credentials.
    pub async fn state(&self, account: &AccountId) -> Result<CredentialState, RefreshError> {
        if self.refreshing.lock().contains(account) {
            return Ok(CredentialState::Refreshing);
        }
        if self.failed.lock().contains(account) {
            return Ok(CredentialState::RefreshFailed);
        }

        let record = self.vault.record(account).await?;
        let now = Utc::now();

        if now >= record.access_expires_at {
            Ok(CredentialState::Expired)
        } else if now + self.config.expiry_buffer >= record.access_expires_at {
            Ok(CredentialState::NearExpiry)
        } else {
            Ok(CredentialState::Valid)
        }
    }

    /// Get a usable access token for an account, refreshing if needed.
    ///
    /// Returns the stored token when it is outside the expiry buffer.
    /// Otherwise performs (or waits on) a refresh exchange and returns the
    /// replacement.
    pub async fn ensure_access_token(&self, account: &AccountId) -> Result<Secret, RefreshError> {
        if self.failed.lock().contains(account) {
            return Err(RefreshError::Terminal {
                account: *account,
                message: "previous refresh failed terminally, store new credentials first"
                    .to_string(),
            });
        }

        if let Some(token) = self.usable_access_token(account).await? {
            tracing::debug!(%account, "using stored access token");
            return Ok(token);
        }

        let flight = self.flight_lock(account);
        let _guard = flight.lock().await;

        // Another flight may have refreshed while this caller waited.
        if let Some(token) = self.usable_access_token(account).await? {
            tracing::debug!(%account, "refresh already completed by concurrent caller");
            return Ok(token);
        }
        if self.failed.lock().contains(account) {
            return Err(RefreshError::Terminal {
                account: *account,
                message: "concurrent refresh failed terminally".to_string(),
            });
        }

        self.refresh_holding_flight(account).await
    }

    /// Return the stored access token if it is outside the expiry buffer.
    async fn usable_access_token(
        &self,
        account: &AccountId,
    ) -> Result<Option<Secret>, RefreshError> {
        let record = self.vault.record(account).await?;

        if Utc::now() + self.config.expiry_buffer >= record.access_expires_at {
            return Ok(None);
        }

        let tokens = self.vault.read_decrypted(account).await?;
        Ok(Some(tokens.access_token))
    }

    /// Run the exchange loop. Caller must hold the account's flight lock.
    async fn refresh_holding_flight(&self, account: &AccountId) -> Result<Secret, RefreshError> {
        let stored = self.vault.read_decrypted(account).await?;

        if Utc::now() >= stored.refresh_expires_at {
            tracing::warn!(%account, "refresh token expired, account requires re-consent");
            self.failed.lock().insert(*account);
            return Err(RefreshError::ReauthRequired { account: *account });
        }

        let _refreshing = RefreshingMark::set(&self.refreshing, *account);

        let mut attempt = 1u32;
        loop {
            tracing::info!(%account, attempt, "attempting refresh exchange");

            let outcome = tokio::time::timeout(
                self.config.attempt_timeout,
                self.exchanger.exchange(account, &stored.refresh_token),
            )
            .await;

            let error = match outcome {
                Ok(Ok(refreshed)) => {
                    let replacement = TokenPair {
                        access_token: refreshed.access_token,
                        access_expires_at: refreshed.access_expires_at,
                        refresh_token: refreshed
                            .refresh_token
                            .unwrap_or_else(|| stored.refresh_token.clone()),
                        refresh_expires_at: refreshed
                            .refresh_expires_at
                            .unwrap_or(stored.refresh_expires_at),
                    };
                    let access = replacement.access_token.clone();

                    self.vault.store(*account, &replacement).await?;
                    tracing::info!(%account, "refresh exchange succeeded");
                    return Ok(access);
                }
                Ok(Err(e @ ProviderError::Transient { .. })) => e.to_string(),
                Ok(Err(e)) => {
                    tracing::error!(%account, error = %e, "refresh failed terminally");
                    self.failed.lock().insert(*account);
                    return Err(RefreshError::Terminal {
                        account: *account,
                        message: e.to_string(),
                    });
                }
                Err(_) => "exchange attempt timed out".to_string(),
            };

            if attempt >= self.config.max_attempts {
                tracing::warn!(%account, attempts = attempt, "refresh attempts exhausted");
                return Err(RefreshError::Exhausted {
                    account: *account,
                    attempts: attempt,
                    message: error,
                });
            }

            let backoff = self.config.backoff_after(attempt);
            tracing::debug!(%account, attempt, ?backoff, error = %error, "transient refresh failure, backing off");
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    fn flight_lock(&self, account: &AccountId) -> Arc<tokio::sync::Mutex<()>> {
        let mut flights = self.flights.lock();
        flights
            .entry(*account)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

impl std::fmt::Debug for TokenRefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefreshCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Marks an account as refreshing for the lifetime of the exchange loop,
/// clearing the mark on every exit path.
struct RefreshingMark {
    set: Arc<Mutex<HashSet<AccountId>>>,
    account: AccountId,
}

impl RefreshingMark {
    fn set(set: &Arc<Mutex<HashSet<AccountId>>>, account: AccountId) -> Self {
        set.lock().insert(account);
        Self {
            set: set.clone(),
            account,
        }
    }
}

impl Drop for RefreshingMark {
    fn drop(&mut self) {
        self.set.lock().remove(&self.account);
    }
}
