pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod hierarchy;
pub mod output;
pub mod params;
pub mod store;
pub mod walker;
