//! Batch product-page extraction: retrying fetches, fallback selector chains,
//! and a merged event log across items.

pub mod archiver;
pub mod batch;
pub mod config;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod models;
pub mod parser;
pub mod retry;
pub mod telemetry;

pub use batch::{BatchContext, BatchOutcome, FailureRegistry, extract_all, join_rows, process};
pub use config::{EngineConfig, RequiredFields};
pub use error::{BatchError, ConfigError};
pub use fetcher::{FetchOutcome, Fetcher, HttpFetcher};
pub use models::{EnrichedRow, ExtractionResult, LogEvent, Severity};
pub use retry::RetryController;
