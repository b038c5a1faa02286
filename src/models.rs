use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const TITLE_SENTINEL: &str = "Product information not available";
pub const PRICE_SENTINEL: &str = "N/A";
pub const DESCRIPTION_SENTINEL: &str = "No description available";
pub const RATING_SENTINEL: &str = "N/A";
pub const SKIPPED_ERROR: &str = "Processing skipped";

static PRICE_NUMBER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+|\d+").ok());

/// Product fields scraped from one page. Unextracted fields hold their sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFields {
    pub title: String,
    pub price: String,
    pub image_url: String,
    pub description: String,
    pub rating: String,
}

impl Default for ProductFields {
    fn default() -> Self {
        Self {
            title: TITLE_SENTINEL.into(),
            price: PRICE_SENTINEL.into(),
            image_url: String::new(),
            description: DESCRIPTION_SENTINEL.into(),
            rating: RATING_SENTINEL.into(),
        }
    }
}

impl ProductFields {
    pub fn has_title(&self) -> bool {
        self.title != TITLE_SENTINEL
    }

    pub fn has_image(&self) -> bool {
        !self.image_url.is_empty()
    }

    pub fn has_price(&self) -> bool {
        self.price != PRICE_SENTINEL
    }
}

/// Outcome of extracting one identifier, across all of its attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    identifier: String,
    pub fields: ProductFields,
    pub success: bool,
    pub attempt_count: u32,
    pub error: Option<String>,
}

impl ExtractionResult {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            fields: ProductFields::default(),
            success: false,
            attempt_count: 0,
            error: None,
        }
    }

    /// Placeholder for an identifier that was never processed.
    pub fn skipped(identifier: impl Into<String>) -> Self {
        let mut result = Self::new(identifier);
        result.error = Some(SKIPPED_ERROR.into());
        result
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// First number in the price text. Thousands separators are not joined,
    /// so `"$1,299.99"` reads as `1.0`.
    pub fn price_value(&self) -> Option<f64> {
        if !self.fields.has_price() {
            return None;
        }
        let re = PRICE_NUMBER.as_ref()?;
        re.find(&self.fields.price)?.as_str().parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Success => "success",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

/// One input row joined with the result for its identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedRow<R> {
    pub row: R,
    pub identifier: String,
    pub title: String,
    pub price: String,
    pub image_url: String,
    pub description: String,
    pub rating: String,
    pub success: bool,
    pub product_link: String,
    pub error: Option<String>,
}

impl<R> EnrichedRow<R> {
    pub fn new(row: R, result: &ExtractionResult, product_link: String) -> Self {
        Self {
            row,
            identifier: result.identifier().to_string(),
            title: result.fields.title.clone(),
            price: result.fields.price.clone(),
            image_url: result.fields.image_url.clone(),
            description: result.fields.description.clone(),
            rating: result.fields.rating.clone(),
            success: result.success,
            product_link,
            error: result.error.clone(),
        }
    }
}
