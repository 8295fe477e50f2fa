pub mod connection;
pub mod models;
pub mod report;
pub mod settings;
