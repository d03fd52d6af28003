pub mod analytics;
pub mod config;
pub mod error;
pub mod funnel;
pub mod plan;
pub mod schema;

pub use error::FunnelError;
