mod config;
mod crawl;
mod db;
mod error;
mod output;
mod sheets;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use config::{CrawlArgs, SheetArgs};
use crawl::engine::{self, Fetcher};
use crawl::CrawlPipeline;
use output::{OutputFormat, Sink};
use sheets::SheetLoader;

#[derive(Parser)]
#[command(
    name = "review_scraper",
    about = "Join spreadsheet ratings with reviews scraped from customerservicescoreboard.com"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load ratings, crawl the listing and emit one record per company
    Run {
        #[command(flatten)]
        sheet: SheetArgs,
        #[command(flatten)]
        crawl: CrawlArgs,
        /// Output file (stdout for jsonl/json/csv when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Jsonl)]
        format: OutputFormat,
        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,
    },
    /// Load the ratings sheet and print its first rows
    Sheet {
        #[command(flatten)]
        sheet: SheetArgs,
        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,
    },
    /// Fetch the listing page(s) and print the companies found
    Links {
        #[command(flatten)]
        crawl: CrawlArgs,
    },
    /// Show records stored by the sqlite output
    Show {
        #[arg(short, long, default_value = db::DB_PATH)]
        db: PathBuf,
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            sheet,
            crawl,
            out,
            format,
            quiet,
        } => {
            let crawl_config = crawl.to_config()?;
            let settings = crawl.to_settings(!quiet);
            let fetcher = Fetcher::new(&settings, &crawl_config.allowed_domains)?;

            // Loaded once, read-only for the rest of the run
            let loader = SheetLoader::new(reqwest::Client::new(), sheet.to_config());
            let table = loader.load_or_warn().await.map(Arc::new);
            let pipeline = Arc::new(CrawlPipeline::new(crawl_config, table));
            if !pipeline.has_table() {
                tracing::warn!("Continuing without ratings; every rating will be N/A");
            }

            let mut sink = Sink::open(format, out.as_deref())?;
            let stats = engine::run(pipeline, fetcher, &settings, |record| sink.write(&record)).await?;
            sink.finish()?;

            eprintln!(
                "Done: {} records ({} companies found, {} fetch errors, {} skipped).",
                stats.records, stats.discovered, stats.errors, stats.skipped
            );
            Ok(())
        }
        Commands::Sheet { sheet, limit } => {
            let client = reqwest::Client::new();
            let loader = SheetLoader::new(client, sheet.to_config());
            let table = loader.load().await.context("Failed to fetch ratings sheet")?;

            println!("{}", table.columns().join(" | "));
            println!("{}", "-".repeat(60));
            for row in table.rows().iter().take(limit) {
                let cells: Vec<String> = row.cells.iter().map(|c| c.to_string()).collect();
                println!("{}", cells.join(" | "));
            }
            println!("\n{} rows", table.len());
            Ok(())
        }
        Commands::Links { crawl } => {
            let crawl_config = crawl.to_config()?;
            let settings = crawl.to_settings(false);
            let fetcher = Fetcher::new(&settings, &crawl_config.allowed_domains)?;
            let pipeline = CrawlPipeline::new(crawl_config, None);

            let mut total = 0usize;
            for start in &pipeline.config().start_urls {
                let page = fetcher
                    .fetch(start)
                    .await
                    .with_context(|| format!("Failed to fetch listing page {}", start))?;
                for req in pipeline.on_listing_page(&page) {
                    let marker = if pipeline.config().allows(&req.url) { "" } else { "  (offsite)" };
                    println!("{:<40} {}{}", truncate(&req.company, 40), req.url, marker);
                    total += 1;
                }
            }
            println!("\n{} companies", total);
            Ok(())
        }
        Commands::Show { db: path, limit } => {
            let conn = db::connect(&path)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_reviews(&conn, limit)?;
            if rows.is_empty() {
                println!("No records. Run 'run --format sqlite' first.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<28} | {:>8} | {:>8} | {:<50}",
                "#", "Company", "Customer", "Employee", "Review"
            );
            println!("{}", "-".repeat(110));
            for (i, r) in rows.iter().enumerate() {
                println!(
                    "{:>3} | {:<28} | {:>8} | {:>8} | {:<50}",
                    i + 1,
                    truncate(&r.company, 28),
                    truncate(&r.customer_rating, 8),
                    truncate(&r.employee_rating, 8),
                    truncate(&r.review, 50)
                );
            }

            let s = db::get_stats(&conn)?;
            let last = rows.first().map(|r| r.scraped_at.as_str()).unwrap_or("-");
            println!(
                "\n{} stored | {} with ratings | {} with review | last scraped {}",
                s.total, s.with_ratings, s.with_review, last
            );
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_width() {
        assert_eq!(truncate("Acme", 8), "Acme");
        assert_eq!(truncate("Gamma Telecom Holdings", 8), "Gamma...");
        assert_eq!(truncate("Gamma Telecom Holdings", 8).chars().count(), 8);
    }

    #[test]
    fn durations() {
        use std::time::Duration;
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn cli_parses_run() {
        let cli = Cli::try_parse_from(["review_scraper", "run", "--format", "csv", "-o", "out.csv"]).unwrap();
        match cli.command {
            Commands::Run { format, out, .. } => {
                assert_eq!(format, OutputFormat::Csv);
                assert_eq!(out, Some(PathBuf::from("out.csv")));
            }
            _ => panic!("expected run"),
        }
    }
}
