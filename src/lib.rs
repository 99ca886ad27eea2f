pub mod config;
pub mod constants;
pub mod error;
pub mod export;
pub mod extract;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod query;
pub mod storage;
pub mod transform;
pub mod types;

// Ports and their adapters
pub mod app;
pub mod infra;
