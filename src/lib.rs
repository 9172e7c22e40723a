pub mod assessment;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod import;
pub mod models;
pub mod progress;
pub mod recommend;
pub mod report;
pub mod store;

pub use dashboard::Dashboard;
pub use error::{EngineError, StoreError};
