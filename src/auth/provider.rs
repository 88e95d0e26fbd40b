use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::AuthError;
use crate::config::IdentityConfig;

/// Result of a successful token acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
}

impl TokenGrant {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
        }
    }
}

/// Silent (non-interactive) token acquisition.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// `Ok(None)` means there is no cached session to renew from; the user has
    /// to sign in interactively.
    async fn acquire_silent(
        &self,
        refresh_token: Option<&str>,
    ) -> Result<Option<TokenGrant>, AuthError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth2 refresh-token grant against the tenant's v2 token endpoint.
pub struct OAuthRefreshProvider {
    client: Client,
    identity: IdentityConfig,
}

impl OAuthRefreshProvider {
    pub fn new(identity: IdentityConfig, timeout: Duration) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        Ok(Self { client, identity })
    }
}

#[async_trait]
impl IdentityProvider for OAuthRefreshProvider {
    async fn acquire_silent(
        &self,
        refresh_token: Option<&str>,
    ) -> Result<Option<TokenGrant>, AuthError> {
        let Some(refresh_token) = refresh_token else {
            return Ok(None);
        };
        let scope = self.identity.scopes.join(" ");
        let form = [
            ("client_id", self.identity.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("scope", scope.as_str()),
            ("redirect_uri", self.identity.redirect_uri.as_str()),
        ];
        let resp = self
            .client
            .post(self.identity.token_endpoint())
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let err: TokenErrorResponse = resp.json().await.unwrap_or(TokenErrorResponse {
                error: status.to_string(),
                error_description: None,
            });
            return Err(AuthError::Provider(match err.error_description {
                Some(desc) => format!("{}: {}", err.error, desc),
                None => err.error,
            }));
        }

        let body: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        Ok(Some(TokenGrant {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
        }))
    }
}

/// Hands out a fixed token, or nothing. For scripted runs where the token
/// comes from the environment.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn acquire_silent(
        &self,
        _refresh_token: Option<&str>,
    ) -> Result<Option<TokenGrant>, AuthError> {
        Ok(self.token.clone().map(TokenGrant::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider() {
        let p = StaticTokenProvider::new(Some("t".into()));
        assert_eq!(p.acquire_silent(None).await.unwrap(), Some(TokenGrant::new("t")));
        let empty = StaticTokenProvider::default();
        assert_eq!(empty.acquire_silent(Some("r")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oauth_without_refresh_token_is_a_miss() {
        let cfg = crate::config::AppConfig::for_hostname("localhost");
        let p = OAuthRefreshProvider::new(cfg.identity, cfg.request_timeout).unwrap();
        assert_eq!(p.acquire_silent(None).await.unwrap(), None);
    }
}
