pub mod application;
pub mod domain;
pub mod infrastructure;

#[cfg(feature = "desktop")]
mod desktop {
    use crate::application::bootstrap::bootstrap_workspace;
    use crate::application::commands::{
        add_interval_impl, authenticate_google_impl, cancel_submission_impl,
        complete_google_login_impl, create_sheet_impl, get_form_impl, get_submission_state_impl,
        logout_impl, remove_interval_impl, set_month_impl, submit_month_impl,
        update_interval_impl, AppState, AuthenticateGoogleResponse, DayResponse, FormResponse,
    };
    use crate::application::sheet_export::{CreateSheetRequest, CreateSheetResponse};
    use crate::application::submission::SubmissionState;
    use serde::Serialize;
    use std::path::PathBuf;

    #[derive(Debug, Serialize)]
    struct BootstrapResponse {
        workspace_root: String,
        config_dir: String,
    }

    #[tauri::command]
    fn bootstrap(root: Option<String>) -> Result<BootstrapResponse, String> {
        let workspace_root = match root {
            Some(path) => PathBuf::from(path),
            None => std::env::current_dir().map_err(|error| error.to_string())?,
        };

        let result = bootstrap_workspace(&workspace_root).map_err(|error| error.to_string())?;
        Ok(BootstrapResponse {
            workspace_root: result.workspace_root.display().to_string(),
            config_dir: result.config_dir.display().to_string(),
        })
    }

    #[tauri::command]
    fn ping() -> &'static str {
        "pong"
    }

    #[tauri::command]
    async fn authenticate_google(
        state: tauri::State<'_, AppState>,
        authorization_code: Option<String>,
    ) -> Result<AuthenticateGoogleResponse, String> {
        authenticate_google_impl(state.inner(), authorization_code)
            .await
            .map_err(|error| state.command_error("authenticate_google", &error))
    }

    #[tauri::command]
    async fn complete_google_login(
        state: tauri::State<'_, AppState>,
        redirect_url: String,
    ) -> Result<AuthenticateGoogleResponse, String> {
        complete_google_login_impl(state.inner(), redirect_url)
            .await
            .map_err(|error| state.command_error("complete_google_login", &error))
    }

    #[tauri::command]
    fn logout(state: tauri::State<'_, AppState>) -> Result<(), String> {
        logout_impl(state.inner()).map_err(|error| state.command_error("logout", &error))
    }

    #[tauri::command]
    fn get_form(state: tauri::State<'_, AppState>) -> Result<FormResponse, String> {
        get_form_impl(state.inner()).map_err(|error| state.command_error("get_form", &error))
    }

    #[tauri::command]
    fn set_month(state: tauri::State<'_, AppState>, month: String) -> Result<FormResponse, String> {
        set_month_impl(state.inner(), month).map_err(|error| state.command_error("set_month", &error))
    }

    #[tauri::command]
    fn update_interval(
        state: tauri::State<'_, AppState>,
        day_index: usize,
        interval_index: usize,
        field: String,
        value: String,
    ) -> Result<DayResponse, String> {
        update_interval_impl(state.inner(), day_index, interval_index, field, value)
            .map_err(|error| state.command_error("update_interval", &error))
    }

    #[tauri::command]
    fn add_interval(state: tauri::State<'_, AppState>, day_index: usize) -> Result<DayResponse, String> {
        add_interval_impl(state.inner(), day_index)
            .map_err(|error| state.command_error("add_interval", &error))
    }

    #[tauri::command]
    fn remove_interval(
        state: tauri::State<'_, AppState>,
        day_index: usize,
        interval_index: usize,
    ) -> Result<DayResponse, String> {
        remove_interval_impl(state.inner(), day_index, interval_index)
            .map_err(|error| state.command_error("remove_interval", &error))
    }

    #[tauri::command]
    async fn submit_month(state: tauri::State<'_, AppState>) -> Result<SubmissionState, String> {
        submit_month_impl(state.inner())
            .await
            .map_err(|error| state.command_error("submit_month", &error))
    }

    #[tauri::command]
    fn cancel_submission(state: tauri::State<'_, AppState>) -> Result<bool, String> {
        cancel_submission_impl(state.inner())
            .map_err(|error| state.command_error("cancel_submission", &error))
    }

    #[tauri::command]
    fn get_submission_state(state: tauri::State<'_, AppState>) -> Result<SubmissionState, String> {
        get_submission_state_impl(state.inner())
            .map_err(|error| state.command_error("get_submission_state", &error))
    }

    #[tauri::command]
    async fn create_sheet(
        state: tauri::State<'_, AppState>,
        request: CreateSheetRequest,
    ) -> Result<CreateSheetResponse, String> {
        create_sheet_impl(state.inner(), request)
            .await
            .map_err(|error| state.command_error("create_sheet", &error))
    }

    pub fn run() {
        let workspace_root = std::env::current_dir().expect("failed to resolve current directory");
        let app_state = AppState::new(workspace_root).expect("failed to initialize app state");

        tauri::Builder::default()
            .manage(app_state)
            .invoke_handler(tauri::generate_handler![
                ping,
                bootstrap,
                authenticate_google,
                complete_google_login,
                logout,
                get_form,
                set_month,
                update_interval,
                add_interval,
                remove_interval,
                submit_month,
                cancel_submission,
                get_submission_state,
                create_sheet
            ])
            .run(tauri::generate_context!())
            .expect("failed to run tauri app");
    }
}

#[cfg(feature = "desktop")]
pub use desktop::run;
