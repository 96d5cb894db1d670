pub mod config;
pub mod credential_store;
pub mod error;
pub mod google_sheets_client;
pub mod oauth_client;
pub mod sheet_layout;
