pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod utils;
