// Core modules
pub mod config;
pub mod execution;
pub mod feed;
pub mod indicators;
pub mod models;
pub mod venue;

// Re-export commonly used types
pub use models::*;
pub use venue::ExecutionVenue;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
