//! Error types for the two halves of the pipeline.
//!
//! - `LoadError`: anything that stops the ratings table from loading. Always
//!   caught at the loader boundary and turned into "no table".
//! - `FetchError`: a single page fetch that failed. Fatal for the listing
//!   page, isolated for detail pages. Redirects leaving the allowed domains
//!   count as failures too.

use thiserror::Error;

/// Failures while loading the ratings worksheet.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Key file missing, unreadable or malformed
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Neither a spreadsheet id nor a recognisable sheet URL
    #[error("Invalid spreadsheet reference: {0}")]
    InvalidSpreadsheet(String),

    /// Token exchange rejected, or the API refused our token
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Transport-level failure talking to Google
    #[error("Network error: {0}")]
    Network(String),

    #[error("Worksheet index {0} not found")]
    WorksheetNotFound(usize),

    /// Required header missing from the worksheet
    #[error("The worksheet must contain a '{column}' column")]
    Schema { column: &'static str },

    #[error("The worksheet has no data rows")]
    Empty,
}

impl LoadError {
    pub fn network(err: impl std::fmt::Display) -> Self {
        Self::Network(err.to_string())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }
}

/// Failures while fetching a crawl page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {message}")]
    Network { url: String, message: String },

    /// Redirected to a host outside the crawl scope
    #[error("{url} redirected offsite to {target}")]
    Offsite { url: String, target: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to read body of {url}: {message}")]
    Body { url: String, message: String },
}
