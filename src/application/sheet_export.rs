use crate::application::oauth::OAuthManager;
use crate::domain::models::{Day, DayStatus, MonthSelection, OAuthToken};
use crate::infrastructure::config::SheetSettings;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_sheets_client::{CreatedSpreadsheet, SpreadsheetClient};
use crate::infrastructure::oauth_client::OAuthHttpClient;
use crate::infrastructure::sheet_layout::{build_grid, spreadsheet_title, SheetGrid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSheetRequest {
    pub month: MonthSelection,
    pub days: Vec<Day>,
    pub tokens: OAuthToken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSheetResponse {
    pub spreadsheet_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_tokens: Option<OAuthToken>,
}

/// Refuses an empty month, days from another month, repeated dates and any day in `Error`.
pub fn ensure_submittable(month: &MonthSelection, days: &[Day]) -> Result<(), InfraError> {
    if days.is_empty() {
        return Err(InfraError::Validation(format!("no days to export for {month}")));
    }

    let outside = days
        .iter()
        .filter(|day| !month.contains(day.date))
        .map(|day| day.date.to_string())
        .collect::<Vec<_>>();
    if !outside.is_empty() {
        return Err(InfraError::Validation(format!(
            "days outside {month}: {}",
            outside.join(", ")
        )));
    }

    let mut seen = BTreeSet::new();
    let repeated = days
        .iter()
        .filter(|day| !seen.insert(day.date))
        .map(|day| day.date)
        .collect::<BTreeSet<_>>();
    if !repeated.is_empty() {
        let repeated = repeated.iter().map(ToString::to_string).collect::<Vec<_>>();
        return Err(InfraError::Validation(format!(
            "dates appear more than once: {}",
            repeated.join(", ")
        )));
    }

    for day in days {
        day.validate().map_err(InfraError::Validation)?;
    }

    let invalid = days
        .iter()
        .filter(|day| day.status() == DayStatus::Error)
        .map(|day| day.date.to_string())
        .collect::<Vec<_>>();
    if !invalid.is_empty() {
        return Err(InfraError::Validation(format!(
            "fix the highlighted intervals before submitting: {}",
            invalid.join(", ")
        )));
    }
    Ok(())
}

pub struct SheetExporter<S, C, X>
where
    S: CredentialStore + ?Sized,
    C: OAuthHttpClient + ?Sized,
    X: SpreadsheetClient + ?Sized,
{
    oauth: Arc<OAuthManager<S, C>>,
    sheets_client: Arc<X>,
    settings: SheetSettings,
}

impl<S, C, X> SheetExporter<S, C, X>
where
    S: CredentialStore + ?Sized,
    C: OAuthHttpClient + ?Sized,
    X: SpreadsheetClient + ?Sized,
{
    pub fn new(oauth: Arc<OAuthManager<S, C>>, sheets_client: Arc<X>, settings: SheetSettings) -> Self {
        Self {
            oauth,
            sheets_client,
            settings,
        }
    }

    pub fn oauth(&self) -> &Arc<OAuthManager<S, C>> {
        &self.oauth
    }

    /// Creates and fills the month's spreadsheet.
    ///
    /// A credential rejection triggers one refresh and one retry; if either
    /// fails the caller gets `AuthExpired` and must send the user to login.
    pub async fn create_sheet(&self, request: CreateSheetRequest) -> Result<CreateSheetResponse, InfraError> {
        let refreshed_slot = Mutex::new(None);
        self.create_sheet_reporting(request, &refreshed_slot).await
    }

    /// Like `create_sheet`, but a refreshed bundle is also written to
    /// `refreshed_slot` as soon as the refresh succeeds, so it survives the
    /// call being dropped by a timeout or cancellation.
    pub async fn create_sheet_reporting(
        &self,
        request: CreateSheetRequest,
        refreshed_slot: &Mutex<Option<OAuthToken>>,
    ) -> Result<CreateSheetResponse, InfraError> {
        ensure_submittable(&request.month, &request.days)?;
        if request.tokens.access_token.trim().is_empty() {
            return Err(InfraError::CorruptState(
                "credential bundle has no access token".to_string(),
            ));
        }

        let title = spreadsheet_title(&self.settings, &request.month);
        let grid = build_grid(&self.settings, &request.days);
        let mut created = None;

        match self
            .export(&request.tokens.access_token, &title, &grid, &mut created)
            .await
        {
            Ok(spreadsheet) => {
                return Ok(CreateSheetResponse {
                    spreadsheet_id: spreadsheet.spreadsheet_id,
                    url: spreadsheet.url,
                    new_tokens: None,
                });
            }
            Err(InfraError::AuthExpired(_)) => {}
            Err(error) => return Err(error),
        }

        let refreshed = self.oauth.refresh(&request.tokens).await.map_err(|error| {
            InfraError::AuthExpired(format!("credential refresh failed: {error}"))
        })?;
        if let Ok(mut slot) = refreshed_slot.lock() {
            *slot = Some(refreshed.clone());
        }

        let spreadsheet = self
            .export(&refreshed.access_token, &title, &grid, &mut created)
            .await
            .map_err(|error| match error {
                InfraError::AuthExpired(message) => InfraError::AuthExpired(message),
                other => InfraError::AuthExpired(format!("retry after refresh failed: {other}")),
            })?;

        Ok(CreateSheetResponse {
            spreadsheet_id: spreadsheet.spreadsheet_id,
            url: spreadsheet.url,
            new_tokens: Some(refreshed),
        })
    }

    /// A spreadsheet already created by an earlier attempt is reused, so a
    /// retry after a rejected values write does not leave an empty document.
    async fn export(
        &self,
        access_token: &str,
        title: &str,
        grid: &SheetGrid,
        created: &mut Option<CreatedSpreadsheet>,
    ) -> Result<CreatedSpreadsheet, InfraError> {
        let spreadsheet = match created {
            Some(existing) => existing.clone(),
            None => {
                let fresh = self
                    .sheets_client
                    .create_spreadsheet(access_token, title, &self.settings.sheet_name)
                    .await?;
                *created = Some(fresh.clone());
                fresh
            }
        };
        self.sheets_client
            .update_values(access_token, &spreadsheet.spreadsheet_id, &grid.range, &grid.rows)
            .await?;
        Ok(spreadsheet)
    }
}
