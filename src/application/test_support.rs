use crate::application::oauth::OAuthConfig;
use crate::domain::models::OAuthToken;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_sheets_client::{
    spreadsheet_url, CreatedSpreadsheet, SpreadsheetClient,
};
use crate::infrastructure::oauth_client::{
    OAuthCodeExchangeRequest, OAuthHttpClient, OAuthRefreshRequest, OAuthTokenResponse,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub enum FakeTokenResponse {
    Success(OAuthTokenResponse),
    OAuthError(String),
    TransportError(String),
}

impl FakeTokenResponse {
    fn into_result(self) -> Result<OAuthTokenResponse, InfraError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::OAuthError(message) => Err(InfraError::OAuth(message)),
            Self::TransportError(message) => Err(InfraError::Transport(message)),
        }
    }
}

impl Default for FakeTokenResponse {
    fn default() -> Self {
        Self::Success(OAuthTokenResponse {
            access_token: "fake_access".to_string(),
            refresh_token: Some("fake_refresh".to_string()),
            expires_in: Some(3600),
            token_type: Some("Bearer".to_string()),
            scope: Some("https://www.googleapis.com/auth/drive.file".to_string()),
        })
    }
}

#[derive(Debug, Default)]
pub struct FakeOAuthHttpClient {
    exchange_response: Mutex<FakeTokenResponse>,
    refresh_response: Mutex<FakeTokenResponse>,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub last_refresh_token: Mutex<Option<String>>,
}

impl FakeOAuthHttpClient {
    pub fn set_exchange_response(&self, response: FakeTokenResponse) {
        *self.exchange_response.lock().expect("exchange mutex poisoned") = response;
    }

    pub fn set_refresh_response(&self, response: FakeTokenResponse) {
        *self.refresh_response.lock().expect("refresh mutex poisoned") = response;
    }
}

#[async_trait]
impl OAuthHttpClient for FakeOAuthHttpClient {
    async fn exchange_authorization_code(
        &self,
        _request: OAuthCodeExchangeRequest,
    ) -> Result<OAuthTokenResponse, InfraError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.exchange_response
            .lock()
            .expect("exchange mutex poisoned")
            .clone()
            .into_result()
    }

    async fn refresh_access_token(
        &self,
        request: OAuthRefreshRequest,
    ) -> Result<OAuthTokenResponse, InfraError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_token.lock().expect("refresh token mutex poisoned") =
            Some(request.refresh_token);
        self.refresh_response
            .lock()
            .expect("refresh mutex poisoned")
            .clone()
            .into_result()
    }
}

#[derive(Debug, Clone)]
pub enum FakeSheetResponse {
    Ok,
    Unauthorized,
    ServerError,
}

impl FakeSheetResponse {
    fn into_result(self) -> Result<(), InfraError> {
        match self {
            Self::Ok => Ok(()),
            Self::Unauthorized => Err(InfraError::AuthExpired("http 401".to_string())),
            Self::ServerError => Err(InfraError::Transport("http 500".to_string())),
        }
    }
}

/// Scripted spreadsheet client; each create or update call consumes the next
/// queued response (defaulting to success once the queue is empty).
#[derive(Debug, Default)]
pub struct FakeSpreadsheetClient {
    create_responses: Mutex<VecDeque<FakeSheetResponse>>,
    update_responses: Mutex<VecDeque<FakeSheetResponse>>,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub access_tokens: Mutex<Vec<String>>,
    pub last_title: Mutex<Option<String>>,
    pub last_rows: Mutex<Vec<Vec<String>>>,
    pub update_spreadsheet_ids: Mutex<Vec<String>>,
    pub create_delay_ms: u64,
}

impl FakeSpreadsheetClient {
    pub fn with_create_responses(responses: Vec<FakeSheetResponse>) -> Self {
        Self {
            create_responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn with_update_responses(responses: Vec<FakeSheetResponse>) -> Self {
        Self {
            update_responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    pub fn with_create_delay(create_delay_ms: u64) -> Self {
        Self {
            create_delay_ms,
            ..Self::default()
        }
    }

    pub fn delayed(self, create_delay_ms: u64) -> Self {
        Self {
            create_delay_ms,
            ..self
        }
    }

    pub fn total_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst) + self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpreadsheetClient for FakeSpreadsheetClient {
    async fn create_spreadsheet(
        &self,
        access_token: &str,
        title: &str,
        _sheet_name: &str,
    ) -> Result<CreatedSpreadsheet, InfraError> {
        let call = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.access_tokens
            .lock()
            .expect("access token mutex poisoned")
            .push(access_token.to_string());
        *self.last_title.lock().expect("title mutex poisoned") = Some(title.to_string());
        if self.create_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.create_delay_ms)).await;
        }
        let response = self
            .create_responses
            .lock()
            .expect("create responses mutex poisoned")
            .pop_front()
            .unwrap_or(FakeSheetResponse::Ok);
        response.into_result()?;
        let spreadsheet_id = format!("sheet-{call}");
        Ok(CreatedSpreadsheet {
            url: spreadsheet_url(&spreadsheet_id),
            spreadsheet_id,
        })
    }

    async fn update_values(
        &self,
        _access_token: &str,
        spreadsheet_id: &str,
        _range: &str,
        rows: &[Vec<String>],
    ) -> Result<(), InfraError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.update_spreadsheet_ids
            .lock()
            .expect("update ids mutex poisoned")
            .push(spreadsheet_id.to_string());
        *self.last_rows.lock().expect("rows mutex poisoned") = rows.to_vec();
        self.update_responses
            .lock()
            .expect("update responses mutex poisoned")
            .pop_front()
            .unwrap_or(FakeSheetResponse::Ok)
            .into_result()
    }
}

/// Store whose reads succeed while every write and clear fails, as a locked
/// OS vault would.
#[derive(Debug)]
pub struct LockedCredentialStore {
    payload: Option<String>,
}

impl LockedCredentialStore {
    pub fn holding(token: &OAuthToken) -> Self {
        Self {
            payload: Some(serde_json::to_string(token).expect("token serializes")),
        }
    }
}

impl CredentialStore for LockedCredentialStore {
    fn read_slot(&self) -> Result<Option<String>, InfraError> {
        Ok(self.payload.clone())
    }

    fn write_slot(&self, _payload: &str) -> Result<(), InfraError> {
        Err(InfraError::Credential("vault locked".to_string()))
    }

    fn clear_slot(&self) -> Result<(), InfraError> {
        Err(InfraError::Credential("vault locked".to_string()))
    }
}

pub fn test_oauth_config() -> OAuthConfig {
    OAuthConfig::new(
        "client-id",
        "client-secret",
        "http://127.0.0.1:8080/oauth2/callback",
        vec!["https://www.googleapis.com/auth/drive.file".to_string()],
    )
}

pub fn sample_token(access_token: &str) -> OAuthToken {
    OAuthToken {
        access_token: access_token.to_string(),
        refresh_token: Some("refresh-token".to_string()),
        expires_at: Some(Utc::now() + Duration::seconds(3600)),
        token_type: "Bearer".to_string(),
        scope: Some("https://www.googleapis.com/auth/drive.file".to_string()),
    }
}
