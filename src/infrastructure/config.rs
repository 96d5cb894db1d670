use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const SPREADSHEET_JSON: &str = "spreadsheet.json";
const DEFAULT_APP_NAME: &str = "Hours Sheet";
const DEFAULT_TITLE_PREFIX: &str = "Horas";
const DEFAULT_SHEET_NAME: &str = "Hoja 1";
const DEFAULT_TOTAL_LABEL: &str = "TOTAL:";
const DEFAULT_HEADERS: [&str; 4] = ["Fecha", "Hora ingreso", "Hora salida", "Horas trabajadas"];
const DEFAULT_SUBMISSION_TIMEOUT_SECONDS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialBackend {
    Keyring,
    File,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetSettings {
    pub title_prefix: String,
    pub sheet_name: String,
    pub headers: [String; 4],
    pub total_label: String,
}

impl Default for SheetSettings {
    fn default() -> Self {
        Self {
            title_prefix: DEFAULT_TITLE_PREFIX.to_string(),
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
            headers: DEFAULT_HEADERS.map(|header| header.to_string()),
            total_label: DEFAULT_TOTAL_LABEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub app_name: String,
    pub timezone: Option<String>,
    pub credential_backend: CredentialBackend,
    pub sheet: SheetSettings,
    pub submission_timeout_seconds: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            timezone: Some("UTC".to_string()),
            credential_backend: CredentialBackend::Keyring,
            sheet: SheetSettings::default(),
            submission_timeout_seconds: DEFAULT_SUBMISSION_TIMEOUT_SECONDS,
        }
    }
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": DEFAULT_APP_NAME,
                "timezone": "UTC",
                "credentialBackend": "keyring"
            }),
        ),
        (
            SPREADSHEET_JSON,
            serde_json::json!({
                "schema": 1,
                "titlePrefix": DEFAULT_TITLE_PREFIX,
                "sheetName": DEFAULT_SHEET_NAME,
                "headers": DEFAULT_HEADERS,
                "totalLabel": DEFAULT_TOTAL_LABEL,
                "submissionTimeoutSeconds": DEFAULT_SUBMISSION_TIMEOUT_SECONDS
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn read_trimmed_str<'a>(config: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

pub fn read_timezone(config_dir: &Path) -> Result<Option<String>, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(read_trimmed_str(&app, "timezone").map(ToOwned::to_owned))
}

pub fn read_credential_backend(config_dir: &Path) -> Result<CredentialBackend, InfraError> {
    let path = config_dir.join(APP_JSON);
    let app = read_config(&path)?;
    match read_trimmed_str(&app, "credentialBackend") {
        None | Some("keyring") => Ok(CredentialBackend::Keyring),
        Some("file") => Ok(CredentialBackend::File),
        Some("memory") => Ok(CredentialBackend::Memory),
        Some(other) => Err(InfraError::InvalidConfig(format!(
            "unknown credentialBackend {other:?} in {}",
            path.display()
        ))),
    }
}

pub fn read_sheet_settings(config_dir: &Path) -> Result<SheetSettings, InfraError> {
    let path = config_dir.join(SPREADSHEET_JSON);
    let spreadsheet = read_config(&path)?;
    let defaults = SheetSettings::default();

    let headers = match spreadsheet.get("headers") {
        None | Some(serde_json::Value::Null) => defaults.headers,
        Some(value) => {
            let values = value
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(serde_json::Value::as_str)
                        .map(ToOwned::to_owned)
                        .collect::<Vec<_>>()
                })
                .unwrap_or_default();
            <[String; 4]>::try_from(values).map_err(|_| {
                InfraError::InvalidConfig(format!(
                    "headers must be an array of 4 strings in {}",
                    path.display()
                ))
            })?
        }
    };

    Ok(SheetSettings {
        title_prefix: read_trimmed_str(&spreadsheet, "titlePrefix")
            .map(ToOwned::to_owned)
            .unwrap_or(defaults.title_prefix),
        sheet_name: read_trimmed_str(&spreadsheet, "sheetName")
            .map(ToOwned::to_owned)
            .unwrap_or(defaults.sheet_name),
        headers,
        total_label: read_trimmed_str(&spreadsheet, "totalLabel")
            .map(ToOwned::to_owned)
            .unwrap_or(defaults.total_label),
    })
}

pub fn read_submission_timeout_seconds(config_dir: &Path) -> Result<u64, InfraError> {
    let spreadsheet = read_config(&config_dir.join(SPREADSHEET_JSON))?;
    Ok(spreadsheet
        .get("submissionTimeoutSeconds")
        .and_then(serde_json::Value::as_u64)
        .filter(|seconds| *seconds > 0)
        .unwrap_or(DEFAULT_SUBMISSION_TIMEOUT_SECONDS))
}

pub fn load_settings(config_dir: &Path) -> Result<AppSettings, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(AppSettings {
        app_name: read_trimmed_str(&app, "appName")
            .unwrap_or(DEFAULT_APP_NAME)
            .to_string(),
        timezone: read_timezone(config_dir)?,
        credential_backend: read_credential_backend(config_dir)?,
        sheet: read_sheet_settings(config_dir)?,
        submission_timeout_seconds: read_submission_timeout_seconds(config_dir)?,
    })
}
