pub mod engine;
pub mod extract;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::sheets::{Cell, Ratings, RatingsTable};

pub const NO_REVIEW: &str = "No review available";

/// Crawl scope: where to start and which hosts may be fetched.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub start_urls: Vec<Url>,
    pub allowed_domains: Vec<String>,
}

impl CrawlConfig {
    /// True when `url`'s host is an allowed domain or a subdomain of one.
    pub fn allows(&self, url: &Url) -> bool {
        host_allowed(&self.allowed_domains, url)
    }
}

pub fn host_allowed(domains: &[String], url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    let host = host.to_ascii_lowercase();
    domains.iter().any(|d| {
        let d = d.trim().trim_start_matches('.').to_ascii_lowercase();
        host == d || host.ends_with(&format!(".{}", d))
    })
}

/// A fetched page.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub body: String,
}

/// A detail page to fetch, with the company name it was discovered under.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowRequest {
    pub url: Url,
    pub company: String,
}

/// One merged row: sheet ratings plus the scraped review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Customer Rating (Google Sheets)")]
    pub customer_rating: Cell,
    #[serde(rename = "Employee Rating (Google Sheets)")]
    pub employee_rating: Cell,
    #[serde(rename = "Review (Scraped)")]
    pub review: String,
}

/// Listing → detail crawl definition joined against the ratings table.
///
/// Two phases: a listing page fans out into follow-requests, and each
/// detail page ends in exactly one record.
pub struct CrawlPipeline {
    config: CrawlConfig,
    table: Option<Arc<RatingsTable>>,
}

impl CrawlPipeline {
    /// `table` is `None` when the sheet could not be loaded; every record
    /// then carries the "N/A" ratings.
    pub fn new(config: CrawlConfig, table: Option<Arc<RatingsTable>>) -> Self {
        Self { config, table }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    pub fn has_table(&self) -> bool {
        self.table.is_some()
    }

    /// Follow-requests for every company row on a listing page.
    pub fn on_listing_page(&self, page: &Page) -> impl Iterator<Item = FollowRequest> {
        let links = extract::company_links(&page.body, &page.url);
        debug!("Found {} company links on {}", links.len(), page.url);
        links.into_iter().map(|link| FollowRequest {
            url: link.url,
            company: link.name,
        })
    }

    /// Exactly one record for a fetched detail page.
    pub fn on_detail_page(&self, page: &Page, company: &str) -> OutputRecord {
        let Ratings { customer, employee } = self
            .table
            .as_deref()
            .map(|t| t.ratings_for(company))
            .unwrap_or_else(Ratings::not_available);

        let review = extract::review_text(&page.body).unwrap_or_else(|| NO_REVIEW.to_string());

        OutputRecord {
            company: company.to_string(),
            customer_rating: customer,
            employee_rating: employee,
            review,
        }
    }
}
