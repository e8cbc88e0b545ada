pub mod config;
pub mod constants;
pub mod error;
pub mod observability;
pub mod pipeline;
pub mod server;
pub mod types;
