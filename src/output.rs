use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use rusqlite::Connection;

use crate::crawl::OutputRecord;
use crate::db;

const CSV_HEADER: [&str; 4] = [
    "Company",
    "Customer Rating (Google Sheets)",
    "Employee Rating (Google Sheets)",
    "Review (Scraped)",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line
    Jsonl,
    /// A single JSON array
    Json,
    Csv,
    /// Append to a SQLite `reviews` table
    Sqlite,
}

/// Destination for emitted records.
pub enum Sink {
    Lines(Box<dyn Write>),
    JsonArray { out: Box<dyn Write>, count: usize },
    Csv(Box<dyn Write>),
    Sqlite(Connection),
}

impl Sink {
    /// Open `path` (stdout when `None`, except for sqlite which defaults to `db::DB_PATH`).
    pub fn open(format: OutputFormat, path: Option<&Path>) -> Result<Self> {
        let sink = match format {
            OutputFormat::Jsonl => Sink::Lines(writer(path)?),
            OutputFormat::Json => {
                let mut out = writer(path)?;
                out.write_all(b"[")?;
                Sink::JsonArray { out, count: 0 }
            }
            OutputFormat::Csv => {
                let mut out = writer(path)?;
                let header: Vec<String> = CSV_HEADER.iter().map(|h| h.to_string()).collect();
                write_csv_row(&mut out, &header)?;
                Sink::Csv(out)
            }
            OutputFormat::Sqlite => {
                let path = path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(db::DB_PATH));
                let conn = db::connect(&path)?;
                db::init_schema(&conn)?;
                Sink::Sqlite(conn)
            }
        };
        Ok(sink)
    }

    pub fn write(&mut self, record: &OutputRecord) -> Result<()> {
        match self {
            Sink::Lines(out) => {
                serde_json::to_writer(&mut *out, record)?;
                out.write_all(b"\n")?;
            }
            Sink::JsonArray { out, count } => {
                if *count > 0 {
                    out.write_all(b",")?;
                }
                out.write_all(b"\n  ")?;
                serde_json::to_writer(&mut *out, record)?;
                *count += 1;
            }
            Sink::Csv(out) => {
                let row = [
                    record.company.clone(),
                    record.customer_rating.to_string(),
                    record.employee_rating.to_string(),
                    record.review.clone(),
                ];
                write_csv_row(out, &row)?;
            }
            Sink::Sqlite(conn) => db::save_record(conn, record)?,
        }
        Ok(())
    }

    pub fn finish(self) -> Result<()> {
        match self {
            Sink::Lines(mut out) | Sink::Csv(mut out) => out.flush()?,
            Sink::JsonArray { mut out, count } => {
                if count > 0 {
                    out.write_all(b"\n")?;
                }
                out.write_all(b"]\n")?;
                out.flush()?;
            }
            Sink::Sqlite(_) => {}
        }
        Ok(())
    }
}

fn writer(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(p) => {
            if let Some(dir) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)?;
            }
            let file = File::create(p).with_context(|| format!("Failed to create {}", p.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(BufWriter::new(io::stdout()))),
    }
}

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write one CSV row, quoting only where needed.
pub fn write_csv_row<W: Write + ?Sized>(w: &mut W, row: &[String]) -> io::Result<()> {
    let mut first = true;
    for cell in row {
        if !first {
            w.write_all(b",")?;
        }
        first = false;
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheets::Cell;

    fn record(company: &str, review: &str) -> OutputRecord {
        OutputRecord {
            company: company.into(),
            customer_rating: Cell::Number(serde_json::Number::from_f64(4.2).unwrap()),
            employee_rating: Cell::not_available(),
            review: review.into(),
        }
    }

    #[test]
    fn csv_quotes_special_fields() {
        let mut buf = Vec::new();
        let row = vec![
            "Acme, Inc.".to_string(),
            "plain".to_string(),
            "say \"hi\"".to_string(),
            "two\nlines".to_string(),
        ];
        write_csv_row(&mut buf, &row).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "\"Acme, Inc.\",plain,\"say \"\"hi\"\"\",\"two\nlines\"\r\n"
        );
    }

    #[test]
    fn csv_file_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = Sink::open(OutputFormat::Csv, Some(&path)).unwrap();
        sink.write(&record("Acme", "Good.")).unwrap();
        sink.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "Company,Customer Rating (Google Sheets),Employee Rating (Google Sheets),Review (Scraped)"
        );
        assert_eq!(lines[1], "Acme,4.2,N/A,Good.");
    }

    #[test]
    fn json_array_is_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let mut sink = Sink::open(OutputFormat::Json, Some(&path)).unwrap();
        sink.write(&record("Acme", "Good.")).unwrap();
        sink.write(&record("Beta Corp", "No review available")).unwrap();
        sink.finish().unwrap();

        let parsed: Vec<OutputRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].company, "Beta Corp");
    }

    #[test]
    fn empty_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        Sink::open(OutputFormat::Json, Some(&path)).unwrap().finish().unwrap();
        let parsed: Vec<OutputRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn jsonl_one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let mut sink = Sink::open(OutputFormat::Jsonl, Some(&path)).unwrap();
        sink.write(&record("Acme", "Good.")).unwrap();
        sink.write(&record("Beta Corp", "Fine.")).unwrap();
        sink.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["Company"], "Acme");
        assert_eq!(first["Customer Rating (Google Sheets)"], 4.2);
    }

    #[test]
    fn sqlite_sink_appends_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.sqlite");
        let mut sink = Sink::open(OutputFormat::Sqlite, Some(&path)).unwrap();
        sink.write(&record("Acme", "Good.")).unwrap();
        sink.finish().unwrap();

        let conn = db::connect(&path).unwrap();
        let rows = db::fetch_reviews(&conn, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].employee_rating, "N/A");
    }
}
