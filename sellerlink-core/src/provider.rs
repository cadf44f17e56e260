//! Provider-facing refresh exchange.
//!
//! This module provides:
//! - [`ProviderEndpoints`] - OAuth endpoint configuration for eBay environments
//! - [`RefreshedTokens`] - The result of a successful refresh exchange
//! - [`ProviderError`] - Transient/terminal classification of exchange failures
//! - [`RefreshExchanger`] - Trait the refresh coordinator drives
//! - [`OAuthRefreshExchanger`] (with the `oauth` feature) - HTTP implementation
//!
//! The transient/terminal split is the contract the coordinator depends on:
//! transient failures are retryable (network trouble, 5xx), terminal ones mean
//! the grant itself is dead and only a new consent can revive the account.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::AccountId;
use crate::vault::Secret;

/// Error type for refresh exchange operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The exchange failed in a way that may succeed on retry: network
    /// trouble, timeouts, provider 5xx.
    #[error("transient provider failure: {message}")]
    Transient { message: String },

    /// The provider rejected the grant itself: revoked or expired refresh
    /// token, invalid client. Retrying cannot help.
    #[error("terminal provider failure: {message}")]
    Terminal { message: String },

    /// The endpoint configuration is unusable.
    #[error("invalid provider configuration: {message}")]
    Config { message: String },
}

/// OAuth endpoint configuration for an eBay environment.
///
/// # Example
///
/// ```
/// use sellerlink_core::provider::ProviderEndpoints;
///
/// let endpoints = ProviderEndpoints::ebay_production();
/// assert!(endpoints.token_url.contains("api.ebay.com"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEndpoints {
    /// OAuth authorization endpoint URL (consent flow).
    pub auth_url: String,

    /// OAuth token endpoint URL (refresh exchange).
    pub token_url: String,
}

impl ProviderEndpoints {
    /// Endpoints for the eBay production environment.
    pub fn ebay_production() -> Self {
        Self {
            auth_url: "https://auth.ebay.com/oauth2/authorize".to_string(),
            token_url: "https://api.ebay.com/identity/v1/oauth2/token".to_string(),
        }
    }

    /// Endpoints for the eBay sandbox environment.
    pub fn ebay_sandbox() -> Self {
        Self {
            auth_url: "https://auth.sandbox.ebay.com/oauth2/authorize".to_string(),
            token_url: "https://api.sandbox.ebay.com/identity/v1/oauth2/token".to_string(),
        }
    }

    /// Endpoints with a custom token URL, keeping the production auth URL.
    ///
    /// Useful for pointing the exchanger at a mock server in tests.
    pub fn with_token_url(token_url: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            ..Self::ebay_production()
        }
    }
}

/// Tokens returned by a successful refresh exchange.
///
/// eBay does not rotate refresh tokens on every exchange; the optional
/// fields are `Some` only when the provider issued replacements.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    /// The fresh access token.
    pub access_token: Secret,

    /// When the fresh access token expires.
    pub access_expires_at: DateTime<Utc>,

    /// A replacement refresh token, if the provider rotated it.
    pub refresh_token: Option<Secret>,

    /// Expiry of the replacement refresh token, if one was issued.
    pub refresh_expires_at: Option<DateTime<Utc>>,
}

/// Abstraction over the provider's refresh exchange.
///
/// The refresh coordinator drives this trait and never talks HTTP itself,
/// so tests can swap in scripted exchangers.
#[async_trait]
pub trait RefreshExchanger: Send + Sync {
    /// Exchange a refresh token for a fresh access token.
    async fn exchange(
        &self,
        account: &AccountId,
        refresh_token: &Secret,
    ) -> Result<RefreshedTokens, ProviderError>;
}

#[cfg(feature = "oauth")]
pub use self::oauth_exchanger::OAuthRefreshExchanger;

#[cfg(feature = "oauth")]
mod oauth_exchanger {
    use super::*;
    use oauth2::{
        AuthUrl, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl,
        basic::BasicClient, reqwest::async_http_client,
    };

    /// HTTP refresh exchanger backed by the OAuth2 token endpoint.
    pub struct OAuthRefreshExchanger {
        client: BasicClient,
    }

    impl OAuthRefreshExchanger {
        /// Build an exchanger for the given endpoints and client credentials.
        pub fn new(
            endpoints: &ProviderEndpoints,
            client_id: impl Into<String>,
            client_secret: impl Into<String>,
        ) -> Result<Self, ProviderError> {
            let auth_url =
                AuthUrl::new(endpoints.auth_url.clone()).map_err(|e| ProviderError::Config {
                    message: format!("invalid auth URL: {}", e),
                })?;

            let token_url =
                TokenUrl::new(endpoints.token_url.clone()).map_err(|e| ProviderError::Config {
                    message: format!("invalid token URL: {}", e),
                })?;

            let client = BasicClient::new(
                ClientId::new(client_id.into()),
                Some(ClientSecret::new(client_secret.into())),
                auth_url,
                Some(token_url),
            );

            Ok(Self { client })
        }
    }

    impl std::fmt::Debug for OAuthRefreshExchanger {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("OAuthRefreshExchanger").finish_non_exhaustive()
        }
    }

    #[async_trait]
    impl RefreshExchanger for OAuthRefreshExchanger {
        async fn exchange(
            &self,
            account: &AccountId,
            refresh_token: &Secret,
        ) -> Result<RefreshedTokens, ProviderError> {
            tracing::debug!(%account, "executing refresh exchange");

            let response = self
                .client
                .exchange_refresh_token(&RefreshToken::new(refresh_token.expose().to_string()))
                .request_async(async_http_client)
                .await
                .map_err(classify_exchange_error)?;

            let expires_in = response.expires_in().ok_or_else(|| ProviderError::Terminal {
                message: "token response carried no expiry".to_string(),
            })?;
            let access_expires_at = Utc::now()
                + chrono::Duration::from_std(expires_in).map_err(|e| ProviderError::Terminal {
                    message: format!("invalid expiration duration: {}", e),
                })?;

            Ok(RefreshedTokens {
                access_token: Secret::new(response.access_token().secret().clone()),
                access_expires_at,
                refresh_token: response
                    .refresh_token()
                    .map(|t| Secret::new(t.secret().clone())),
                refresh_expires_at: None,
            })
        }
    }

    /// Map an oauth2 request error onto the transient/terminal split.
    ///
    /// A well-formed error response from the provider means it understood the
    /// request and said no; that verdict does not change on retry. Transport
    /// failures and unparseable responses (a gateway's HTML error page, say)
    /// are worth retrying.
    fn classify_exchange_error<RE>(
        err: oauth2::RequestTokenError<RE, oauth2::basic::BasicErrorResponse>,
    ) -> ProviderError
    where
        RE: std::error::Error + 'static,
    {
        match err {
            oauth2::RequestTokenError::ServerResponse(response) => ProviderError::Terminal {
                message: format!("provider rejected refresh: {}", response.error()),
            },
            oauth2::RequestTokenError::Request(e) => ProviderError::Transient {
                message: format!("refresh request failed: {}", e),
            },
            oauth2::RequestTokenError::Parse(e, _) => ProviderError::Transient {
                message: format!("unparseable token response: {}", e),
            },
            oauth2::RequestTokenError::Other(message) => ProviderError::Transient { message },
        }
    }
}
