pub mod auth;
pub mod table;

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info};
use url::Url;

use crate::error::LoadError;
use auth::ServiceAccountKey;
pub use table::{Cell, Ratings, RatingsTable};

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";

static SHEET_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/spreadsheets/d/([a-zA-Z0-9_-]+)").unwrap());
static SHEET_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{10,}$").unwrap());

/// Where to read the ratings from.
#[derive(Debug, Clone)]
pub struct SheetConfig {
    pub credentials: PathBuf,
    /// Spreadsheet id or full sheet URL
    pub spreadsheet: String,
    pub worksheet: usize,
    pub api_base: String,
    pub token_uri: Option<String>,
}

/// Accepts a bare id or a docs.google.com URL.
pub fn spreadsheet_id(reference: &str) -> Result<String, LoadError> {
    let reference = reference.trim();
    if let Some(caps) = SHEET_URL_RE.captures(reference) {
        return Ok(caps[1].to_string());
    }
    if SHEET_ID_RE.is_match(reference) {
        return Ok(reference.to_string());
    }
    Err(LoadError::InvalidSpreadsheet(reference.to_string()))
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// One-shot loader for the ratings worksheet.
pub struct SheetLoader {
    client: reqwest::Client,
    config: SheetConfig,
}

impl SheetLoader {
    pub fn new(client: reqwest::Client, config: SheetConfig) -> Self {
        Self { client, config }
    }

    /// Authenticate, fetch every row of the worksheet and build the table.
    pub async fn load(&self) -> Result<RatingsTable, LoadError> {
        let id = spreadsheet_id(&self.config.spreadsheet)?;
        let key = ServiceAccountKey::from_file(&self.config.credentials)?;
        let token =
            auth::fetch_access_token(&self.client, &key, self.config.token_uri.as_deref()).await?;

        let title = self.worksheet_title(&id, &token).await?;
        info!("Fetching worksheet '{}' of {}", title, id);
        let values = self.worksheet_values(&id, &title, &token).await?;
        RatingsTable::from_values(values)
    }

    /// Like `load`, but any failure is logged and reported as no table.
    pub async fn load_or_warn(&self) -> Option<RatingsTable> {
        match self.load().await {
            Ok(table) => {
                info!("Ratings sheet loaded with {} companies", table.len());
                Some(table)
            }
            Err(e) => {
                error!("Error fetching ratings sheet: {}", e);
                None
            }
        }
    }

    async fn worksheet_title(&self, id: &str, token: &str) -> Result<String, LoadError> {
        let mut url = self.endpoint(&["v4", "spreadsheets", id])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties(title,index)");

        let meta: SpreadsheetMeta = self.get_json(url, token).await?;
        let index = self.config.worksheet;
        meta.sheets
            .into_iter()
            .map(|s| s.properties)
            .find(|p| p.index == index)
            .map(|p| p.title)
            .ok_or(LoadError::WorksheetNotFound(index))
    }

    async fn worksheet_values(
        &self,
        id: &str,
        title: &str,
        token: &str,
    ) -> Result<Vec<Vec<Value>>, LoadError> {
        let range = format!("'{}'", title.replace('\'', "''"));
        let mut url = self.endpoint(&["v4", "spreadsheets", id, "values", &range])?;
        url.query_pairs_mut()
            .append_pair("majorDimension", "ROWS")
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE");

        let range: ValueRange = self.get_json(url, token).await?;
        Ok(range.values)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, LoadError> {
        let mut url = Url::parse(&self.config.api_base)
            .map_err(|e| LoadError::network(format!("bad API base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| LoadError::network("API base cannot hold a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        token: &str,
    ) -> Result<T, LoadError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(LoadError::network)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LoadError::auth(format!("Sheets API returned {}", status)));
        }
        if !status.is_success() {
            return Err(LoadError::network(format!("Sheets API returned {}", status)));
        }
        response.json().await.map_err(LoadError::network)
    }
}
