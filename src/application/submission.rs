use crate::application::sheet_export::{ensure_submittable, CreateSheetRequest, SheetExporter};
use crate::domain::models::{Day, MonthSelection};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_sheets_client::SpreadsheetClient;
use crate::infrastructure::oauth_client::OAuthHttpClient;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

const DEFAULT_SUBMISSION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionState {
    Idle,
    Submitting,
    Succeeded { spreadsheet_id: String, url: String },
    NeedsReauth,
    Failed { message: String },
}

/// Sender half of a cancellation pair; dropping it does not cancel.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    pub async fn cancelled(&mut self) {
        if self.receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (sender, receiver) = watch::channel(false);
    (CancelHandle { sender }, CancelSignal { receiver })
}

struct BusyGuard<'a> {
    busy: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(busy: &'a AtomicBool) -> Result<Self, InfraError> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| InfraError::SubmissionInProgress)?;
        Ok(Self { busy })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Drives one month submission from validation to a terminal state.
pub struct SubmissionFlow<S, C, X>
where
    S: CredentialStore + ?Sized,
    C: OAuthHttpClient + ?Sized,
    X: SpreadsheetClient + ?Sized,
{
    exporter: SheetExporter<S, C, X>,
    state: Mutex<SubmissionState>,
    credential_error: Mutex<Option<InfraError>>,
    busy: AtomicBool,
    timeout: Duration,
}

impl<S, C, X> SubmissionFlow<S, C, X>
where
    S: CredentialStore + ?Sized,
    C: OAuthHttpClient + ?Sized,
    X: SpreadsheetClient + ?Sized,
{
    pub fn new(exporter: SheetExporter<S, C, X>) -> Self {
        Self {
            exporter,
            state: Mutex::new(SubmissionState::Idle),
            credential_error: Mutex::new(None),
            busy: AtomicBool::new(false),
            timeout: DEFAULT_SUBMISSION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn exporter(&self) -> &SheetExporter<S, C, X> {
        &self.exporter
    }

    pub fn state(&self) -> SubmissionState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    fn set_state(&self, next: SubmissionState) {
        match self.state.lock() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Takes the credential store failure left behind by the last attempt.
    /// The attempt's state is published regardless, so a created sheet is
    /// never hidden by a store that refused the refreshed bundle.
    pub fn take_credential_error(&self) -> Option<InfraError> {
        match self.credential_error.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn record_credential_result(&self, result: Result<(), InfraError>) {
        let Err(error) = result else {
            return;
        };
        match self.credential_error.lock() {
            Ok(mut slot) => *slot = Some(error),
            Err(poisoned) => *poisoned.into_inner() = Some(error),
        }
    }

    /// Deletes the stored credential and returns to `Idle`. Refused while a
    /// submission is running, in which case the credential is left in place.
    pub fn logout(&self) -> Result<(), InfraError> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        self.exporter.oauth().clear_stored_token()?;
        self.set_state(SubmissionState::Idle);
        Ok(())
    }

    /// Runs one attempt. Validation problems and a concurrent attempt are
    /// returned as errors; every other outcome is reported through the state.
    pub async fn submit(
        &self,
        month: MonthSelection,
        days: Vec<Day>,
        mut cancel: CancelSignal,
    ) -> Result<SubmissionState, InfraError> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        self.set_state(SubmissionState::Idle);
        self.take_credential_error();

        ensure_submittable(&month, &days)?;

        let oauth = self.exporter.oauth();
        let tokens = match oauth.load_stored_token() {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                self.record_credential_result(oauth.clear_stored_token());
                self.set_state(SubmissionState::NeedsReauth);
                return Ok(SubmissionState::NeedsReauth);
            }
            Err(error) => {
                let next = SubmissionState::Failed {
                    message: format!("stored credential could not be read: {error}"),
                };
                self.set_state(next.clone());
                return Ok(next);
            }
        };

        self.set_state(SubmissionState::Submitting);
        let request = CreateSheetRequest {
            month,
            days,
            tokens,
        };
        let refreshed = Mutex::new(None);

        let outcome = tokio::select! {
            result = tokio::time::timeout(
                self.timeout,
                self.exporter.create_sheet_reporting(request, &refreshed),
            ) => {
                result.unwrap_or_else(|_| {
                    Err(InfraError::Transport(format!(
                        "submission timed out after {}s",
                        self.timeout.as_secs_f64()
                    )))
                })
            }
            _ = cancel.cancelled() => Err(InfraError::Transport("submission was cancelled".to_string())),
        };

        let next = match outcome {
            Ok(response) => {
                if let Some(new_tokens) = &response.new_tokens {
                    self.record_credential_result(oauth.store_token(new_tokens));
                }
                SubmissionState::Succeeded {
                    spreadsheet_id: response.spreadsheet_id,
                    url: response.url,
                }
            }
            Err(InfraError::AuthExpired(_)) => {
                self.record_credential_result(oauth.clear_stored_token());
                SubmissionState::NeedsReauth
            }
            Err(error) => {
                // A refresh that finished before the timeout or cancel still
                // rotated the bundle, so keep it.
                let rotated = match refreshed.lock() {
                    Ok(mut slot) => slot.take(),
                    Err(poisoned) => poisoned.into_inner().take(),
                };
                if let Some(new_tokens) = rotated {
                    self.record_credential_result(oauth.store_token(&new_tokens));
                }
                SubmissionState::Failed {
                    message: error.to_string(),
                }
            }
        };
        self.set_state(next.clone());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::oauth::OAuthManager;
    use crate::application::test_support::{
        sample_token, test_oauth_config, FakeOAuthHttpClient, FakeSheetResponse,
        FakeSpreadsheetClient, FakeTokenResponse, LockedCredentialStore,
    };
    use crate::domain::models::{Interval, TimeOfDay};
    use crate::domain::month::build_month;
    use crate::infrastructure::config::SheetSettings;
    use crate::infrastructure::credential_store::InMemoryCredentialStore;

    type TestFlow = SubmissionFlow<InMemoryCredentialStore, FakeOAuthHttpClient, FakeSpreadsheetClient>;

    struct Harness {
        flow: Arc<TestFlow>,
        store: Arc<InMemoryCredentialStore>,
        oauth_client: Arc<FakeOAuthHttpClient>,
        sheets: Arc<FakeSpreadsheetClient>,
    }

    fn harness(sheets: FakeSpreadsheetClient) -> Harness {
        let store = Arc::new(InMemoryCredentialStore::default());
        let oauth_client = Arc::new(FakeOAuthHttpClient::default());
        let sheets = Arc::new(sheets);
        let oauth = Arc::new(OAuthManager::new(
            test_oauth_config(),
            Arc::clone(&store),
            Arc::clone(&oauth_client),
        ));
        let exporter = SheetExporter::new(oauth, Arc::clone(&sheets), SheetSettings::default());
        Harness {
            flow: Arc::new(SubmissionFlow::new(exporter)),
            store,
            oauth_client,
            sheets,
        }
    }

    fn locked_flow(
        sheets: FakeSpreadsheetClient,
    ) -> SubmissionFlow<LockedCredentialStore, FakeOAuthHttpClient, FakeSpreadsheetClient> {
        let store = Arc::new(LockedCredentialStore::holding(&sample_token("stale-access")));
        let oauth = Arc::new(OAuthManager::new(
            test_oauth_config(),
            store,
            Arc::new(FakeOAuthHttpClient::default()),
        ));
        SubmissionFlow::new(SheetExporter::new(
            oauth,
            Arc::new(sheets),
            SheetSettings::default(),
        ))
    }

    fn time(value: &str) -> Option<TimeOfDay> {
        Some(value.parse().expect("valid time"))
    }

    fn february() -> (MonthSelection, Vec<Day>) {
        let month: MonthSelection = "2026-02".parse().expect("month");
        let mut days = build_month(month);
        days[0].intervals[0] = Interval::new(time("09:00"), time("17:00"));
        (month, days)
    }

    fn no_cancel() -> CancelSignal {
        cancellation().1
    }

    #[tokio::test]
    async fn invalid_day_blocks_submission_without_network() {
        let harness = harness(FakeSpreadsheetClient::default());
        harness.store.save_token(&sample_token("access")).expect("save token");
        let (month, mut days) = february();
        days[0].intervals[0] = Interval::new(time("09:00"), time("08:00"));

        let result = harness.flow.submit(month, days, no_cancel()).await;

        match result {
            Err(InfraError::Validation(message)) => assert!(message.contains("2026-02-01")),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert_eq!(harness.flow.state(), SubmissionState::Idle);
        assert_eq!(harness.sheets.total_calls(), 0);
    }

    #[tokio::test]
    async fn missing_credential_requires_reauthentication() {
        let harness = harness(FakeSpreadsheetClient::default());
        let (month, days) = february();

        let state = harness.flow.submit(month, days, no_cancel()).await.expect("submit");

        assert_eq!(state, SubmissionState::NeedsReauth);
        assert_eq!(harness.flow.state(), SubmissionState::NeedsReauth);
        assert_eq!(harness.sheets.total_calls(), 0);
    }

    #[tokio::test]
    async fn expired_credential_is_refreshed_retried_once_and_persisted() {
        let harness = harness(FakeSpreadsheetClient::with_create_responses(vec![
            FakeSheetResponse::Unauthorized,
        ]));
        harness.store.save_token(&sample_token("stale-access")).expect("save token");
        let (month, days) = february();

        let state = harness.flow.submit(month, days, no_cancel()).await.expect("submit");

        assert_eq!(
            state,
            SubmissionState::Succeeded {
                spreadsheet_id: "sheet-2".to_string(),
                url: "https://docs.google.com/spreadsheets/d/sheet-2".to_string(),
            }
        );
        assert_eq!(harness.sheets.create_calls.load(Ordering::SeqCst), 2);
        assert_eq!(harness.oauth_client.refresh_calls.load(Ordering::SeqCst), 1);
        let stored = harness.store.load_token().expect("load").expect("token kept");
        assert_eq!(stored.access_token, "fake_access");
        assert_eq!(stored.refresh_token.as_deref(), Some("fake_refresh"));
    }

    #[tokio::test]
    async fn refresh_rejection_clears_credential() {
        let harness = harness(FakeSpreadsheetClient::with_create_responses(vec![
            FakeSheetResponse::Unauthorized,
        ]));
        harness
            .oauth_client
            .set_refresh_response(FakeTokenResponse::OAuthError("invalid_grant".to_string()));
        harness.store.save_token(&sample_token("stale-access")).expect("save token");
        let (month, days) = february();

        let state = harness.flow.submit(month, days, no_cancel()).await.expect("submit");

        assert_eq!(state, SubmissionState::NeedsReauth);
        assert_eq!(harness.store.load_token().expect("load"), None);
        assert_eq!(harness.sheets.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn server_error_fails_without_retry() {
        let harness = harness(FakeSpreadsheetClient::with_create_responses(vec![
            FakeSheetResponse::ServerError,
        ]));
        harness.store.save_token(&sample_token("access")).expect("save token");
        let (month, days) = february();

        let state = harness.flow.submit(month, days, no_cancel()).await.expect("submit");

        assert!(matches!(state, SubmissionState::Failed { .. }));
        assert_eq!(harness.sheets.create_calls.load(Ordering::SeqCst), 1);
        assert!(harness.store.load_token().expect("load").is_some());
    }

    #[tokio::test]
    async fn concurrent_submission_is_refused() {
        let harness = harness(FakeSpreadsheetClient::with_create_delay(200));
        harness.store.save_token(&sample_token("access")).expect("save token");
        let (month, days) = february();

        let first = {
            let flow = Arc::clone(&harness.flow);
            let days = days.clone();
            tokio::spawn(async move { flow.submit(month, days, no_cancel()).await })
        };
        while harness.flow.state() != SubmissionState::Submitting {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = harness.flow.submit(month, days, no_cancel()).await;
        assert!(matches!(second, Err(InfraError::SubmissionInProgress)));
        assert_eq!(harness.flow.state(), SubmissionState::Submitting);

        let first = first.await.expect("join").expect("first submission");
        assert!(matches!(first, SubmissionState::Succeeded { .. }));
        assert_eq!(harness.sheets.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn timeout_ends_in_failed() {
        let harness = harness(FakeSpreadsheetClient::with_create_delay(500));
        harness.store.save_token(&sample_token("access")).expect("save token");
        let flow = Arc::try_unwrap(harness.flow)
            .unwrap_or_else(|_| panic!("flow is uniquely owned"))
            .with_timeout(Duration::from_millis(20));
        let (month, days) = february();

        let state = flow.submit(month, days, no_cancel()).await.expect("submit");

        match state {
            SubmissionState::Failed { message } => assert!(message.contains("timed out")),
            other => panic!("expected failed state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_ends_in_failed_and_frees_the_flow() {
        let harness = harness(FakeSpreadsheetClient::with_create_delay(500));
        harness.store.save_token(&sample_token("access")).expect("save token");
        let (month, days) = february();
        let (handle, signal) = cancellation();

        let running = {
            let flow = Arc::clone(&harness.flow);
            let days = days.clone();
            tokio::spawn(async move { flow.submit(month, days, signal).await })
        };
        while harness.flow.state() != SubmissionState::Submitting {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.cancel();

        let state = running.await.expect("join").expect("submit");
        match state {
            SubmissionState::Failed { message } => assert!(message.contains("cancelled")),
            other => panic!("expected failed state, got {other:?}"),
        }
        harness.flow.logout().expect("flow is free again");
        assert_eq!(harness.flow.state(), SubmissionState::Idle);
    }

    #[tokio::test]
    async fn locked_store_still_reports_the_created_sheet() {
        let flow = locked_flow(FakeSpreadsheetClient::with_create_responses(vec![
            FakeSheetResponse::Unauthorized,
        ]));
        let (month, days) = february();

        let state = flow.submit(month, days, no_cancel()).await.expect("submit");

        let expected = SubmissionState::Succeeded {
            spreadsheet_id: "sheet-2".to_string(),
            url: "https://docs.google.com/spreadsheets/d/sheet-2".to_string(),
        };
        assert_eq!(state, expected);
        assert_eq!(flow.state(), expected);
        match flow.take_credential_error() {
            Some(InfraError::Credential(message)) => assert_eq!(message, "vault locked"),
            other => panic!("expected credential error, got {other:?}"),
        }
        assert!(flow.take_credential_error().is_none());
    }

    #[tokio::test]
    async fn locked_store_still_asks_for_reauthentication() {
        let flow = locked_flow(FakeSpreadsheetClient::with_create_responses(vec![
            FakeSheetResponse::Unauthorized,
            FakeSheetResponse::Unauthorized,
        ]));
        let (month, days) = february();

        let state = flow.submit(month, days, no_cancel()).await.expect("submit");

        assert_eq!(state, SubmissionState::NeedsReauth);
        assert_eq!(flow.state(), SubmissionState::NeedsReauth);
        assert!(matches!(
            flow.take_credential_error(),
            Some(InfraError::Credential(_))
        ));
    }

    #[tokio::test]
    async fn refreshed_bundle_survives_a_timeout_during_retry() {
        let harness = harness(
            FakeSpreadsheetClient::with_create_responses(vec![FakeSheetResponse::Unauthorized])
                .delayed(200),
        );
        harness.store.save_token(&sample_token("stale-access")).expect("save token");
        let store = Arc::clone(&harness.store);
        let flow = Arc::try_unwrap(harness.flow)
            .unwrap_or_else(|_| panic!("flow is uniquely owned"))
            .with_timeout(Duration::from_millis(300));
        let (month, days) = february();

        let state = flow.submit(month, days, no_cancel()).await.expect("submit");

        match state {
            SubmissionState::Failed { message } => assert!(message.contains("timed out")),
            other => panic!("expected failed state, got {other:?}"),
        }
        assert_eq!(harness.oauth_client.refresh_calls.load(Ordering::SeqCst), 1);
        let stored = store.load_token().expect("load").expect("token kept");
        assert_eq!(stored.access_token, "fake_access");
        assert_eq!(stored.refresh_token.as_deref(), Some("fake_refresh"));
    }

    #[tokio::test]
    async fn logout_during_submission_keeps_the_credential() {
        let harness = harness(FakeSpreadsheetClient::with_create_delay(200));
        harness.store.save_token(&sample_token("access")).expect("save token");
        let (month, days) = february();

        let running = {
            let flow = Arc::clone(&harness.flow);
            tokio::spawn(async move { flow.submit(month, days, no_cancel()).await })
        };
        while harness.flow.state() != SubmissionState::Submitting {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(matches!(
            harness.flow.logout(),
            Err(InfraError::SubmissionInProgress)
        ));
        assert!(harness.store.load_token().expect("load").is_some());

        let state = running.await.expect("join").expect("submit");
        assert!(matches!(state, SubmissionState::Succeeded { .. }));
        harness.flow.logout().expect("logout after completion");
        assert_eq!(harness.store.load_token().expect("load"), None);
        assert_eq!(harness.flow.state(), SubmissionState::Idle);
    }

    #[tokio::test]
    async fn dropped_cancel_handle_does_not_cancel() {
        let (handle, mut signal) = cancellation();
        drop(handle);
        assert!(!signal.is_cancelled());
        let waited = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(waited.is_err());
    }
}
