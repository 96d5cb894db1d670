use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use url::Url;

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/";
const SPREADSHEET_URL_BASE: &str = "https://docs.google.com/spreadsheets/d/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSpreadsheet {
    pub spreadsheet_id: String,
    pub url: String,
}

#[async_trait]
pub trait SpreadsheetClient: Send + Sync {
    async fn create_spreadsheet(
        &self,
        access_token: &str,
        title: &str,
        sheet_name: &str,
    ) -> Result<CreatedSpreadsheet, InfraError>;

    async fn update_values(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<(), InfraError>;
}

pub fn spreadsheet_url(spreadsheet_id: &str) -> String {
    format!("{SPREADSHEET_URL_BASE}{spreadsheet_id}")
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestGoogleSheetsClient {
    client: Client,
}

impl ReqwestGoogleSheetsClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidInput(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn spreadsheets_endpoint() -> Result<Url, InfraError> {
        Url::parse(SHEETS_API_BASE)
            .and_then(|base| base.join("spreadsheets"))
            .map_err(|error| InfraError::InvalidConfig(format!("invalid sheets api base url: {error}")))
    }

    fn values_endpoint(spreadsheet_id: &str, range: &str) -> Result<Url, InfraError> {
        let mut url = Self::spreadsheets_endpoint()?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("sheets api base URL cannot be a base".to_string())
            })?;
            segments.push(spreadsheet_id);
            segments.push("values");
            segments.push(range);
        }
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED");
        Ok(url)
    }
}

/// 401 means Google rejected the credential; every other failure is transport-level.
fn http_error(operation: &str, status: StatusCode, body: &str) -> InfraError {
    if status == StatusCode::UNAUTHORIZED {
        return InfraError::AuthExpired(format!("google rejected the credential while {operation}"));
    }
    let message = if body.trim().is_empty() {
        format!("google sheets api error while {operation}: http {}", status.as_u16())
    } else {
        format!(
            "google sheets api error while {operation}: http {}; body={body}",
            status.as_u16()
        )
    };
    InfraError::Transport(message)
}

#[derive(Debug, serde::Serialize)]
struct CreateSpreadsheetRequest<'a> {
    properties: SpreadsheetProperties<'a>,
    sheets: Vec<SheetRequest<'a>>,
}

#[derive(Debug, serde::Serialize)]
struct SpreadsheetProperties<'a> {
    title: &'a str,
}

#[derive(Debug, serde::Serialize)]
struct SheetRequest<'a> {
    properties: SheetProperties<'a>,
}

#[derive(Debug, serde::Serialize)]
struct SheetProperties<'a> {
    title: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct SpreadsheetResponse {
    #[serde(rename = "spreadsheetId")]
    spreadsheet_id: Option<String>,
    #[serde(rename = "spreadsheetUrl")]
    spreadsheet_url: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct ValueRangeRequest<'a> {
    range: &'a str,
    #[serde(rename = "majorDimension")]
    major_dimension: &'static str,
    values: &'a [Vec<String>],
}

fn parse_created_spreadsheet(body: &str) -> Result<CreatedSpreadsheet, InfraError> {
    let parsed: SpreadsheetResponse = serde_json::from_str(body).map_err(|error| {
        InfraError::Transport(format!("invalid spreadsheet create payload: {error}; body={body}"))
    })?;
    let spreadsheet_id = parsed
        .spreadsheet_id
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            InfraError::Transport("spreadsheet create response did not include spreadsheetId".to_string())
        })?;
    let url = parsed
        .spreadsheet_url
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| spreadsheet_url(&spreadsheet_id));
    Ok(CreatedSpreadsheet {
        spreadsheet_id,
        url,
    })
}

#[async_trait]
impl SpreadsheetClient for ReqwestGoogleSheetsClient {
    async fn create_spreadsheet(
        &self,
        access_token: &str,
        title: &str,
        sheet_name: &str,
    ) -> Result<CreatedSpreadsheet, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(title, "spreadsheet title")?;
        Self::ensure_non_empty(sheet_name, "sheet name")?;

        let request = CreateSpreadsheetRequest {
            properties: SpreadsheetProperties {
                title: title.trim(),
            },
            sheets: vec![SheetRequest {
                properties: SheetProperties {
                    title: sheet_name.trim(),
                },
            }],
        };

        let response = self
            .client
            .post(Self::spreadsheets_endpoint()?)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                InfraError::Transport(format!("network error while creating spreadsheet: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Transport(format!("failed reading spreadsheet create response: {error}"))
        })?;

        if !status.is_success() {
            return Err(http_error("creating spreadsheet", status, &body));
        }
        parse_created_spreadsheet(&body)
    }

    async fn update_values(
        &self,
        access_token: &str,
        spreadsheet_id: &str,
        range: &str,
        rows: &[Vec<String>],
    ) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(spreadsheet_id, "spreadsheet id")?;
        Self::ensure_non_empty(range, "range")?;

        let request = ValueRangeRequest {
            range,
            major_dimension: "ROWS",
            values: rows,
        };

        let response = self
            .client
            .put(Self::values_endpoint(spreadsheet_id, range)?)
            .bearer_auth(access_token)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                InfraError::Transport(format!("network error while writing values: {error}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Transport(format!("failed reading values update response: {error}"))
        })?;

        if !status.is_success() {
            return Err(http_error("writing values", status, &body));
        }
        Ok(())
    }
}
