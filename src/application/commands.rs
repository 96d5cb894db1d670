use crate::application::bootstrap::bootstrap_workspace;
use crate::application::form_state::FormState;
use crate::application::oauth::{
    authorization_code_from_redirect, EnsureTokenResult, OAuthConfig, OAuthManager,
};
use crate::application::sheet_export::{CreateSheetRequest, CreateSheetResponse, SheetExporter};
use crate::application::submission::{cancellation, CancelHandle, SubmissionFlow, SubmissionState};
use crate::domain::models::{
    Day, DayStatus, IntervalField, IntervalStatus, MonthSelection, OAuthToken,
};
use crate::infrastructure::config::{AppSettings, CredentialBackend};
use crate::infrastructure::credential_store::{
    CredentialStore, FileCredentialStore, InMemoryCredentialStore, KeyringCredentialStore,
};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_sheets_client::{ReqwestGoogleSheetsClient, SpreadsheetClient};
use crate::infrastructure::oauth_client::{OAuthHttpClient, ReqwestOAuthClient};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8080/oauth2/callback";
const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";
const CREDENTIALS_FILE: &str = "credentials.json";

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let sequence = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{}-{sequence}", Utc::now().timestamp_micros())
}

type AppOAuthManager = OAuthManager<dyn CredentialStore, dyn OAuthHttpClient>;
type AppSubmissionFlow = SubmissionFlow<dyn CredentialStore, dyn OAuthHttpClient, dyn SpreadsheetClient>;

/// Google-facing collaborators; absent when no OAuth client is configured.
pub struct GoogleServices {
    pub oauth_config: OAuthConfig,
    pub oauth_client: Arc<dyn OAuthHttpClient>,
    pub sheets_client: Arc<dyn SpreadsheetClient>,
}

impl GoogleServices {
    fn from_env() -> Result<Self, InfraError> {
        Ok(Self {
            oauth_config: load_oauth_config_from_env()?,
            oauth_client: Arc::new(ReqwestOAuthClient::new()),
            sheets_client: Arc::new(ReqwestGoogleSheetsClient::new()),
        })
    }
}

pub struct AppState {
    workspace_root: PathBuf,
    config_dir: PathBuf,
    logs_dir: PathBuf,
    settings: AppSettings,
    credential_store: Arc<dyn CredentialStore>,
    flow: Option<Arc<AppSubmissionFlow>>,
    runtime: Mutex<RuntimeState>,
    log_guard: Mutex<()>,
}

struct RuntimeState {
    form: FormState,
    pending_oauth_state: Option<String>,
    cancel: Option<CancelHandle>,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let services = match GoogleServices::from_env() {
            Ok(services) => Some(services),
            Err(InfraError::InvalidConfig(_)) => None,
            Err(error) => return Err(error),
        };
        Self::with_services(workspace_root, services)
    }

    pub fn with_services(workspace_root: PathBuf, services: Option<GoogleServices>) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let settings = bootstrap.settings;
        let credential_store = credential_store_for(settings.credential_backend, &bootstrap.state_dir);
        let initial_month = initial_month(settings.timezone.as_deref(), Utc::now())?;

        let flow = services.map(|services| {
            let oauth: Arc<AppOAuthManager> = Arc::new(OAuthManager::new(
                services.oauth_config,
                Arc::clone(&credential_store),
                services.oauth_client,
            ));
            let exporter = SheetExporter::new(oauth, services.sheets_client, settings.sheet.clone());
            Arc::new(
                SubmissionFlow::new(exporter)
                    .with_timeout(Duration::from_secs(settings.submission_timeout_seconds)),
            )
        });

        let state = Self {
            workspace_root: bootstrap.workspace_root,
            config_dir: bootstrap.config_dir,
            logs_dir: bootstrap.logs_dir,
            settings,
            credential_store,
            flow,
            runtime: Mutex::new(RuntimeState {
                form: FormState::new(initial_month),
                pending_oauth_state: None,
                cancel: None,
            }),
            log_guard: Mutex::new(()),
        };
        if state.flow.is_none() {
            state.log_info(
                "startup",
                "google oauth client is not configured; submission is disabled",
            );
        }
        Ok(state)
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }

    fn flow(&self) -> Result<&Arc<AppSubmissionFlow>, InfraError> {
        self.flow.as_ref().ok_or_else(|| {
            InfraError::InvalidConfig(
                "google oauth client is not configured (set HOURSHEET_GOOGLE_CLIENT_ID and HOURSHEET_GOOGLE_CLIENT_SECRET)"
                    .to_string(),
            )
        })
    }

    fn oauth(&self) -> Result<&Arc<AppOAuthManager>, InfraError> {
        Ok(self.flow()?.exporter().oauth())
    }
}

fn credential_store_for(backend: CredentialBackend, state_dir: &Path) -> Arc<dyn CredentialStore> {
    match backend {
        CredentialBackend::Keyring => Arc::new(KeyringCredentialStore::default()),
        CredentialBackend::File => Arc::new(FileCredentialStore::new(state_dir.join(CREDENTIALS_FILE))),
        CredentialBackend::Memory => Arc::new(InMemoryCredentialStore::default()),
    }
}

/// The month containing `now` in the configured timezone (UTC when unset).
fn initial_month(timezone: Option<&str>, now: DateTime<Utc>) -> Result<MonthSelection, InfraError> {
    let today = match timezone {
        Some(name) => {
            let tz = name
                .parse::<Tz>()
                .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone {name:?}: {error}")))?;
            now.with_timezone(&tz).date_naive()
        }
        None => now.date_naive(),
    };
    Ok(MonthSelection::containing(today))
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("runtime lock poisoned: {error}")))
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthenticateGoogleResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
}

impl AuthenticateGoogleResponse {
    fn with_token(status: &str, token: &OAuthToken) -> Self {
        Self {
            status: status.to_string(),
            authorization_url: None,
            expires_at: token.expires_at.map(|value| value.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct IntervalResponse {
    #[serde(rename = "in")]
    pub clock_in: String,
    #[serde(rename = "out")]
    pub clock_out: String,
    pub status: IntervalStatus,
    pub worked_minutes: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DayResponse {
    pub index: usize,
    pub date: String,
    pub status: DayStatus,
    pub worked_minutes: u32,
    pub intervals: Vec<IntervalResponse>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FormResponse {
    pub month: String,
    pub days: Vec<DayResponse>,
    pub has_errors: bool,
    pub error_dates: Vec<String>,
    pub total_worked_minutes: u32,
}

fn to_day_response(index: usize, day: &Day) -> DayResponse {
    DayResponse {
        index,
        date: day.date.to_string(),
        status: day.status(),
        worked_minutes: day.worked_minutes(),
        intervals: day
            .intervals
            .iter()
            .map(|interval| IntervalResponse {
                clock_in: interval.clock_in.map(|time| time.to_string()).unwrap_or_default(),
                clock_out: interval.clock_out.map(|time| time.to_string()).unwrap_or_default(),
                status: interval.status(),
                worked_minutes: interval.worked_minutes(),
            })
            .collect(),
    }
}

fn to_form_response(form: &FormState) -> FormResponse {
    FormResponse {
        month: form.selection().to_string(),
        days: form
            .days()
            .iter()
            .enumerate()
            .map(|(index, day)| to_day_response(index, day))
            .collect(),
        has_errors: form.has_errors(),
        error_dates: form.error_dates().iter().map(ToString::to_string).collect(),
        total_worked_minutes: form.total_worked_minutes(),
    }
}

pub async fn authenticate_google_impl(
    state: &AppState,
    authorization_code: Option<String>,
) -> Result<AuthenticateGoogleResponse, InfraError> {
    let manager = state.oauth()?;

    if let Some(raw_code) = authorization_code {
        let code = raw_code.trim();
        if code.is_empty() {
            return Err(InfraError::InvalidInput(
                "authorization_code must not be empty".to_string(),
            ));
        }
        let token = manager.authenticate_with_code(code).await?;
        state.log_info(
            "authenticate_google",
            "exchanged authorization code and stored oauth token",
        );
        return Ok(AuthenticateGoogleResponse::with_token("authenticated", &token));
    }

    match manager.ensure_access_token().await? {
        EnsureTokenResult::Existing(token) => {
            Ok(AuthenticateGoogleResponse::with_token("existing", &token))
        }
        EnsureTokenResult::Refreshed(token) => {
            state.log_info("authenticate_google", "refreshed stored oauth token");
            Ok(AuthenticateGoogleResponse::with_token("refreshed", &token))
        }
        EnsureTokenResult::ReauthenticationRequired => {
            let auth_state = next_id("oauth-state");
            let authorization_url = manager.build_authorization_url(&auth_state)?;
            lock_runtime(state)?.pending_oauth_state = Some(auth_state);
            Ok(AuthenticateGoogleResponse {
                status: "reauthentication_required".to_string(),
                authorization_url: Some(authorization_url),
                expires_at: None,
            })
        }
    }
}

/// Finishes a login started by `authenticate_google` using the provider redirect URL.
pub async fn complete_google_login_impl(
    state: &AppState,
    redirect_url: String,
) -> Result<AuthenticateGoogleResponse, InfraError> {
    let manager = state.oauth()?;
    let expected_state = lock_runtime(state)?.pending_oauth_state.clone().ok_or_else(|| {
        InfraError::OAuth("no google login is pending; call authenticate_google first".to_string())
    })?;

    let code = authorization_code_from_redirect(&redirect_url, &expected_state)?;
    let token = manager.authenticate_with_code(&code).await?;
    lock_runtime(state)?.pending_oauth_state = None;
    state.log_info("complete_google_login", "completed google login");
    Ok(AuthenticateGoogleResponse::with_token("authenticated", &token))
}

pub fn logout_impl(state: &AppState) -> Result<(), InfraError> {
    match &state.flow {
        Some(flow) => flow.logout()?,
        None => state.credential_store.delete_token()?,
    }
    lock_runtime(state)?.pending_oauth_state = None;
    state.log_info("logout", "cleared stored google credential");
    Ok(())
}

pub fn get_form_impl(state: &AppState) -> Result<FormResponse, InfraError> {
    let runtime = lock_runtime(state)?;
    Ok(to_form_response(&runtime.form))
}

pub fn set_month_impl(state: &AppState, month: String) -> Result<FormResponse, InfraError> {
    let selection = month.parse::<MonthSelection>().map_err(InfraError::InvalidInput)?;
    let mut runtime = lock_runtime(state)?;
    runtime.form.set_month(selection);
    state.log_info("set_month", &format!("selected {selection}"));
    Ok(to_form_response(&runtime.form))
}

pub fn update_interval_impl(
    state: &AppState,
    day_index: usize,
    interval_index: usize,
    field: String,
    value: String,
) -> Result<DayResponse, InfraError> {
    let field = field.parse::<IntervalField>().map_err(InfraError::InvalidInput)?;
    let mut runtime = lock_runtime(state)?;
    let day = runtime
        .form
        .update_interval(day_index, interval_index, field, &value)?;
    Ok(to_day_response(day_index, day))
}

pub fn add_interval_impl(state: &AppState, day_index: usize) -> Result<DayResponse, InfraError> {
    let mut runtime = lock_runtime(state)?;
    let day = runtime.form.add_interval(day_index)?;
    Ok(to_day_response(day_index, day))
}

pub fn remove_interval_impl(
    state: &AppState,
    day_index: usize,
    interval_index: usize,
) -> Result<DayResponse, InfraError> {
    let mut runtime = lock_runtime(state)?;
    let day = runtime.form.remove_interval(day_index, interval_index)?;
    Ok(to_day_response(day_index, day))
}

pub async fn submit_month_impl(state: &AppState) -> Result<SubmissionState, InfraError> {
    let flow = Arc::clone(state.flow()?);
    let (month, days, signal) = {
        let mut runtime = lock_runtime(state)?;
        if runtime.cancel.is_some() {
            return Err(InfraError::SubmissionInProgress);
        }
        let (handle, signal) = cancellation();
        runtime.cancel = Some(handle);
        (runtime.form.selection(), runtime.form.snapshot(), signal)
    };

    let result = flow.submit(month, days, signal).await;
    lock_runtime(state)?.cancel = None;

    let outcome = result?;
    if let Some(error) = flow.take_credential_error() {
        state.log_error("submit_month", &format!("stored google credential not updated: {error}"));
    }
    match &outcome {
        SubmissionState::Succeeded { url, .. } => {
            state.log_info("submit_month", &format!("created spreadsheet for {month}: {url}"));
        }
        SubmissionState::NeedsReauth => {
            state.log_info("submit_month", "google credential rejected; login required");
        }
        SubmissionState::Failed { message } => state.log_error("submit_month", message),
        SubmissionState::Idle | SubmissionState::Submitting => {}
    }
    Ok(outcome)
}

pub fn cancel_submission_impl(state: &AppState) -> Result<bool, InfraError> {
    let runtime = lock_runtime(state)?;
    let Some(handle) = runtime.cancel.as_ref() else {
        return Ok(false);
    };
    handle.cancel();
    state.log_info("cancel_submission", "cancellation requested");
    Ok(true)
}

pub fn get_submission_state_impl(state: &AppState) -> Result<SubmissionState, InfraError> {
    Ok(state
        .flow
        .as_ref()
        .map(|flow| flow.state())
        .unwrap_or(SubmissionState::Idle))
}

/// Creates a spreadsheet from a caller-supplied month, days and credential bundle.
pub async fn create_sheet_impl(
    state: &AppState,
    request: CreateSheetRequest,
) -> Result<CreateSheetResponse, InfraError> {
    let month = request.month;
    let response = state.flow()?.exporter().create_sheet(request).await?;
    state.log_info(
        "create_sheet",
        &format!(
            "created spreadsheet {} for {month} (credential refreshed: {})",
            response.spreadsheet_id,
            response.new_tokens.is_some()
        ),
    );
    Ok(response)
}

fn load_oauth_config_from_env() -> Result<OAuthConfig, InfraError> {
    load_oauth_config_from_lookup(|key| std::env::var(key).ok())
}

fn load_oauth_config_from_lookup<F>(lookup: F) -> Result<OAuthConfig, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let client_id = required_lookup_value(
        &lookup,
        &["HOURSHEET_GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_ID"],
        "google client id",
    )?;
    let client_secret = required_lookup_value(
        &lookup,
        &["HOURSHEET_GOOGLE_CLIENT_SECRET", "GOOGLE_CLIENT_SECRET"],
        "google client secret",
    )?;
    let redirect_uri = optional_lookup_value(
        &lookup,
        &["HOURSHEET_GOOGLE_REDIRECT_URI", "GOOGLE_REDIRECT_URI"],
    )
    .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
    let scopes = optional_lookup_value(&lookup, &["HOURSHEET_GOOGLE_SCOPES", "GOOGLE_SCOPES"])
        .map(|raw| parse_scope_list(&raw))
        .filter(|scopes| !scopes.is_empty())
        .unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]);

    Ok(OAuthConfig::new(
        client_id,
        client_secret,
        redirect_uri,
        scopes,
    ))
}

fn required_lookup_value<F>(
    lookup: &F,
    keys: &[&str],
    field_name: &str,
) -> Result<String, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    optional_lookup_value(lookup, keys).ok_or_else(|| {
        InfraError::InvalidConfig(format!(
            "missing {} (set one of: {})",
            field_name,
            keys.join(", ")
        ))
    })
}

fn optional_lookup_value<F>(lookup: &F, keys: &[&str]) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    for key in keys {
        if let Some(value) = lookup(key) {
            let normalized = value.trim();
            if !normalized.is_empty() {
                return Some(normalized.to_string());
            }
        }
    }
    None
}

fn parse_scope_list(raw: &str) -> Vec<String> {
    raw.split([',', ' ', '\n', '\t'])
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
