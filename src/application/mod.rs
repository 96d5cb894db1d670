pub mod bootstrap;
pub mod commands;
pub mod form_state;
pub mod oauth;
pub mod sheet_export;
pub mod submission;

#[cfg(test)]
pub(crate) mod test_support;
