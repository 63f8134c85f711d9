use std::path::Path;

use anyhow::Result;
use rusqlite::Connection;

use crate::crawl::OutputRecord;

pub const DB_PATH: &str = "data/reviews.sqlite";

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS reviews (
            id              INTEGER PRIMARY KEY,
            company         TEXT NOT NULL,
            customer_rating TEXT NOT NULL,
            employee_rating TEXT NOT NULL,
            review          TEXT NOT NULL,
            scraped_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_reviews_company ON reviews(company);
        ",
    )?;
    Ok(())
}

pub fn save_record(conn: &Connection, record: &OutputRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO reviews (company, customer_rating, employee_rating, review)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            record.company,
            record.customer_rating.to_string(),
            record.employee_rating.to_string(),
            record.review,
        ],
    )?;
    Ok(())
}

pub struct ReviewRow {
    pub company: String,
    pub customer_rating: String,
    pub employee_rating: String,
    pub review: String,
    pub scraped_at: String,
}

/// Most recent rows first.
pub fn fetch_reviews(conn: &Connection, limit: usize) -> Result<Vec<ReviewRow>> {
    let mut stmt = conn.prepare(
        "SELECT company, customer_rating, employee_rating, review, scraped_at
         FROM reviews ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit as i64], |row| {
            Ok(ReviewRow {
                company: row.get(0)?,
                customer_rating: row.get(1)?,
                employee_rating: row.get(2)?,
                review: row.get(3)?,
                scraped_at: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub struct Stats {
    pub total: i64,
    pub with_ratings: i64,
    pub with_review: i64,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let stats = conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(customer_rating != 'N/A' OR employee_rating != 'N/A'), 0),
            COALESCE(SUM(review != 'No review available'), 0)
         FROM reviews",
        [],
        |row| {
            Ok(Stats {
                total: row.get(0)?,
                with_ratings: row.get(1)?,
                with_review: row.get(2)?,
            })
        },
    )?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::Cell;

    fn memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn
    }

    fn record(company: &str, rating: Cell, review: &str) -> OutputRecord {
        OutputRecord {
            company: company.into(),
            customer_rating: rating.clone(),
            employee_rating: rating,
            review: review.into(),
        }
    }

    #[test]
    fn saves_and_fetches_newest_first() {
        let conn = memory();
        save_record(&conn, &record("Acme", Cell::Number(serde_json::Number::from_f64(4.2).unwrap()), "Good.")).unwrap();
        save_record(&conn, &record("Beta Corp", Cell::not_available(), "No review available")).unwrap();

        let rows = fetch_reviews(&conn, 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].company, "Beta Corp");
        assert_eq!(rows[1].customer_rating, "4.2");
        assert!(!rows[1].scraped_at.is_empty());

        assert_eq!(fetch_reviews(&conn, 1).unwrap().len(), 1);
    }

    #[test]
    fn stats_count_sentinels() {
        let conn = memory();
        save_record(&conn, &record("Acme", Cell::Number(serde_json::Number::from_f64(4.2).unwrap()), "Good.")).unwrap();
        save_record(&conn, &record("Beta Corp", Cell::not_available(), "No review available")).unwrap();

        let s = get_stats(&conn).unwrap();
        assert_eq!(s.total, 2);
        assert_eq!(s.with_ratings, 1);
        assert_eq!(s.with_review, 1);
    }

    #[test]
    fn connect_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/reviews.sqlite");
        let conn = connect(&path).unwrap();
        init_schema(&conn).unwrap();
        assert!(path.exists());
    }
}
