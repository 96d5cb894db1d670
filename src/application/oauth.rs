use crate::domain::models::OAuthToken;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::oauth_client::{
    OAuthCodeExchangeRequest, OAuthHttpClient, OAuthRefreshRequest, OAuthTokenResponse,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use url::Url;

const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub token_endpoint: String,
    pub authorization_endpoint: String,
}

impl OAuthConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes,
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            authorization_endpoint: DEFAULT_AUTHORIZATION_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureTokenResult {
    Existing(OAuthToken),
    Refreshed(OAuthToken),
    ReauthenticationRequired,
}

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct OAuthManager<S, C>
where
    S: CredentialStore + ?Sized,
    C: OAuthHttpClient + ?Sized,
{
    config: OAuthConfig,
    credential_store: Arc<S>,
    oauth_client: Arc<C>,
    now_provider: NowProvider,
}

impl<S, C> OAuthManager<S, C>
where
    S: CredentialStore + ?Sized,
    C: OAuthHttpClient + ?Sized,
{
    pub fn new(config: OAuthConfig, credential_store: Arc<S>, oauth_client: Arc<C>) -> Self {
        Self {
            config,
            credential_store,
            oauth_client,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn is_token_valid(&self, token: &OAuthToken) -> bool {
        token.is_valid_at((self.now_provider)(), 60)
    }

    pub fn build_authorization_url(&self, state: &str) -> Result<String, InfraError> {
        if state.trim().is_empty() {
            return Err(InfraError::OAuth("state must not be empty".to_string()));
        }
        if self.config.scopes.is_empty() {
            return Err(InfraError::OAuth("at least one scope is required".to_string()));
        }

        let mut url = Url::parse(&self.config.authorization_endpoint)
            .map_err(|error| InfraError::OAuth(format!("invalid authorization endpoint: {error}")))?;
        let scope = self.config.scopes.join(" ");

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &scope)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);

        Ok(url.to_string())
    }

    pub async fn authenticate_with_code(&self, authorization_code: &str) -> Result<OAuthToken, InfraError> {
        if authorization_code.trim().is_empty() {
            return Err(InfraError::OAuth("authorization code must not be empty".to_string()));
        }

        let response = self
            .oauth_client
            .exchange_authorization_code(OAuthCodeExchangeRequest {
                token_endpoint: self.config.token_endpoint.clone(),
                client_id: self.config.client_id.clone(),
                client_secret: self.config.client_secret.clone(),
                redirect_uri: self.config.redirect_uri.clone(),
                authorization_code: authorization_code.to_string(),
            })
            .await?;

        let token = self.token_from_response(response, None);
        self.credential_store.save_token(&token)?;
        Ok(token)
    }

    /// Startup check: reuse a still-valid bundle, refresh an expired one, or ask for login.
    pub async fn ensure_access_token(&self) -> Result<EnsureTokenResult, InfraError> {
        let Some(stored_token) = self.credential_store.load_token()? else {
            return Ok(EnsureTokenResult::ReauthenticationRequired);
        };

        if self.is_token_valid(&stored_token) {
            return Ok(EnsureTokenResult::Existing(stored_token));
        }

        match self.refresh(&stored_token).await {
            Ok(token) => {
                self.credential_store.save_token(&token)?;
                Ok(EnsureTokenResult::Refreshed(token))
            }
            Err(InfraError::OAuth(_)) => {
                self.credential_store.delete_token()?;
                Ok(EnsureTokenResult::ReauthenticationRequired)
            }
            Err(error) => Err(error),
        }
    }

    /// Exchanges the bundle's refresh token for a new access token without persisting it.
    pub async fn refresh(&self, token: &OAuthToken) -> Result<OAuthToken, InfraError> {
        let Some(refresh_token) = token
            .refresh_token
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            return Err(InfraError::OAuth(
                "stored credential has no refresh token".to_string(),
            ));
        };

        let response = self
            .oauth_client
            .refresh_access_token(OAuthRefreshRequest {
                token_endpoint: self.config.token_endpoint.clone(),
                client_id: self.config.client_id.clone(),
                client_secret: self.config.client_secret.clone(),
                refresh_token: refresh_token.to_string(),
            })
            .await?;
        Ok(self.token_from_response(response, token.refresh_token.clone()))
    }

    pub fn load_stored_token(&self) -> Result<Option<OAuthToken>, InfraError> {
        self.credential_store.load_token()
    }

    pub fn store_token(&self, token: &OAuthToken) -> Result<(), InfraError> {
        self.credential_store.save_token(token)
    }

    pub fn clear_stored_token(&self) -> Result<(), InfraError> {
        self.credential_store.delete_token()
    }

    fn token_from_response(
        &self,
        response: OAuthTokenResponse,
        fallback_refresh_token: Option<String>,
    ) -> OAuthToken {
        let expires_at = response
            .expires_in
            .map(|seconds| (self.now_provider)() + Duration::seconds(seconds.max(0)));
        OAuthToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(fallback_refresh_token),
            expires_at,
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: response.scope,
        }
    }
}

/// Pulls the authorization code out of the provider redirect, checking `state`.
pub fn authorization_code_from_redirect(
    redirect_url: &str,
    expected_state: &str,
) -> Result<String, InfraError> {
    let url = Url::parse(redirect_url.trim())
        .map_err(|error| InfraError::InvalidInput(format!("invalid redirect url: {error}")))?;

    let mut code = None;
    let mut state = None;
    let mut provider_error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => provider_error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = provider_error {
        return Err(InfraError::OAuth(format!("authorization was denied: {error}")));
    }
    if expected_state.trim().is_empty() || state.as_deref() != Some(expected_state) {
        return Err(InfraError::OAuth(
            "authorization state does not match the pending login".to_string(),
        ));
    }
    code.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| InfraError::OAuth("No code in authorization redirect".to_string()))
}
