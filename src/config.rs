use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use url::Url;

use crate::crawl::engine::{EngineSettings, DEFAULT_USER_AGENT};
use crate::crawl::CrawlConfig;
use crate::sheets::{SheetConfig, SHEETS_API_BASE};

const DEFAULT_SPREADSHEET: &str =
    "https://docs.google.com/spreadsheets/d/1GGeM-lU_3qvwUhVL4CJiFFog9V94KQGd/edit#gid=1599458649";
const DEFAULT_START_URL: &str = "https://www.customerservicescoreboard.com/";
const DEFAULT_DOMAIN: &str = "customerservicescoreboard.com";

#[derive(Debug, Clone, Args)]
pub struct SheetArgs {
    /// Service-account key file
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS", default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Spreadsheet id or URL
    #[arg(long, env = "SPREADSHEET", default_value = DEFAULT_SPREADSHEET)]
    pub spreadsheet: String,

    /// Worksheet index (0 = first sheet)
    #[arg(long, default_value_t = 0)]
    pub worksheet: usize,

    #[arg(long, hide = true, default_value = SHEETS_API_BASE)]
    pub sheets_api: String,

    #[arg(long, hide = true)]
    pub token_uri: Option<String>,
}

impl SheetArgs {
    pub fn to_config(&self) -> SheetConfig {
        SheetConfig {
            credentials: self.credentials.clone(),
            spreadsheet: self.spreadsheet.clone(),
            worksheet: self.worksheet,
            api_base: self.sheets_api.clone(),
            token_uri: self.token_uri.clone(),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct CrawlArgs {
    /// Listing page(s) to start from
    #[arg(long = "start-url", default_value = DEFAULT_START_URL)]
    pub start_urls: Vec<String>,

    /// Domains the crawl may fetch from (subdomains included)
    #[arg(long = "allowed-domain", default_value = DEFAULT_DOMAIN)]
    pub allowed_domains: Vec<String>,

    /// Max detail pages in flight
    #[arg(short = 'c', long, default_value_t = crate::crawl::engine::DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Pause before each detail request
    #[arg(long, default_value_t = 0)]
    pub delay_ms: u64,

    #[arg(long, default_value_t = crate::crawl::engine::DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

impl CrawlArgs {
    pub fn to_config(&self) -> Result<CrawlConfig> {
        let start_urls = self
            .start_urls
            .iter()
            .map(|u| Url::parse(u).with_context(|| format!("Invalid start URL: {}", u)))
            .collect::<Result<Vec<_>>>()?;

        let config = CrawlConfig {
            start_urls,
            allowed_domains: self.allowed_domains.clone(),
        };
        if let Some(offsite) = config.start_urls.iter().find(|u| !config.allows(u)) {
            anyhow::bail!("Start URL {} is outside the allowed domains", offsite);
        }
        Ok(config)
    }

    pub fn to_settings(&self, progress: bool) -> EngineSettings {
        EngineSettings {
            concurrency: self.concurrency.max(1),
            delay: Duration::from_millis(self.delay_ms),
            timeout: Duration::from_secs(self.timeout_secs),
            user_agent: self.user_agent.clone(),
            progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        sheet: SheetArgs,
        #[command(flatten)]
        crawl: CrawlArgs,
    }

    #[test]
    fn defaults_point_at_scoreboard() {
        let cli = TestCli::try_parse_from(["test"]).unwrap();
        let crawl = cli.crawl.to_config().unwrap();
        assert_eq!(crawl.start_urls[0].as_str(), DEFAULT_START_URL);
        assert_eq!(crawl.allowed_domains, vec![DEFAULT_DOMAIN.to_string()]);
        assert_eq!(cli.sheet.to_config().worksheet, 0);
    }

    #[test]
    fn offsite_start_url_is_rejected() {
        let cli = TestCli::try_parse_from(["test", "--start-url", "https://example.com/"]).unwrap();
        assert!(cli.crawl.to_config().is_err());
    }

    #[test]
    fn repeated_flags_collect() {
        let cli = TestCli::try_parse_from([
            "test",
            "--start-url",
            "https://a.example/",
            "--start-url",
            "https://b.example/list",
            "--allowed-domain",
            "example",
            "-c",
            "0",
        ])
        .unwrap();
        let crawl = cli.crawl.to_config().unwrap();
        assert_eq!(crawl.start_urls.len(), 2);
        assert_eq!(cli.crawl.to_settings(false).concurrency, 1);
    }
}
