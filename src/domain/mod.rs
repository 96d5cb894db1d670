pub mod models;
pub mod month;
