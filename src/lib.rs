pub mod api;
pub mod config;
pub mod content;
pub mod engine;
pub mod history;
pub mod report;
pub mod types;

pub use api::{ApiError, ApiGateway, BlockingTransport, HttpTransport};
pub use config::Config;
pub use content::{ContentAnalyzer, ContentError};
pub use engine::{EligibilityEngine, ScoreInputs, ScoreResult};
pub use history::HistoryScanner;
