use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::LoadError;

pub const COMPANY_COLUMN: &str = "Company";
pub const CUSTOMER_RATING_COLUMN: &str = "Customer Rating";
pub const EMPLOYEE_RATING_COLUMN: &str = "Employee Rating";

/// Placeholder for a rating we could not find.
pub const NOT_AVAILABLE: &str = "N/A";

/// One worksheet cell, passed through uninterpreted.
///
/// Numbers keep the exact form the API returned them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(Number),
    Bool(bool),
    Text(String),
    Empty,
}

impl Cell {
    pub fn not_available() -> Self {
        Cell::Text(NOT_AVAILABLE.to_string())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(t) => t.is_empty(),
            _ => false,
        }
    }

    fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Cell::Empty,
            Value::Bool(b) => Cell::Bool(b),
            Value::Number(n) => Cell::Number(n),
            Value::String(s) => Cell::Text(s),
            other => Cell::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(n) => write!(f, "{}", n),
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Text(t) => f.write_str(t),
            Cell::Empty => Ok(()),
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RatingsRow {
    /// Trimmed company name
    pub company: String,
    pub cells: Vec<Cell>,
}

/// Ratings looked up for one company, sentinels already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Ratings {
    pub customer: Cell,
    pub employee: Cell,
}

impl Ratings {
    pub fn not_available() -> Self {
        Self {
            customer: Cell::not_available(),
            employee: Cell::not_available(),
        }
    }
}

/// Read-only join source built from a worksheet snapshot.
#[derive(Debug, Clone)]
pub struct RatingsTable {
    columns: Vec<String>,
    rows: Vec<RatingsRow>,
    customer_idx: Option<usize>,
    employee_idx: Option<usize>,
}

impl RatingsTable {
    /// Build from raw worksheet values: first row is the header.
    pub fn from_values(values: Vec<Vec<Value>>) -> Result<Self, LoadError> {
        let mut iter = values.into_iter();
        let columns: Vec<String> = iter
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|v| Cell::from_json(v).to_string().trim().to_string())
            .collect();

        let company_idx = column_index(&columns, COMPANY_COLUMN).ok_or(LoadError::Schema {
            column: COMPANY_COLUMN,
        })?;

        let rows: Vec<RatingsRow> = iter
            .filter_map(|raw| {
                let mut cells: Vec<Cell> = raw.into_iter().map(Cell::from_json).collect();
                if cells.iter().all(Cell::is_empty) {
                    return None;
                }
                // The API drops trailing blanks
                cells.resize(columns.len().max(cells.len()), Cell::Empty);
                let company = cells[company_idx].to_string().trim().to_string();
                Some(RatingsRow { company, cells })
            })
            .collect();

        if rows.is_empty() {
            return Err(LoadError::Empty);
        }

        Ok(Self {
            customer_idx: column_index(&columns, CUSTOMER_RATING_COLUMN),
            employee_idx: column_index(&columns, EMPLOYEE_RATING_COLUMN),
            columns,
            rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[RatingsRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// First row whose key equals `company` exactly.
    pub fn lookup(&self, company: &str) -> Option<&RatingsRow> {
        self.rows.iter().find(|r| r.company == company)
    }

    pub fn ratings_for(&self, company: &str) -> Ratings {
        let Some(row) = self.lookup(company) else {
            return Ratings::not_available();
        };
        let pick = |idx: Option<usize>| {
            idx.and_then(|i| row.cells.get(i))
                .cloned()
                .unwrap_or_else(Cell::not_available)
        };
        Ratings {
            customer: pick(self.customer_idx),
            employee: pick(self.employee_idx),
        }
    }
}

fn column_index(columns: &[String], name: &str) -> Option<usize> {
    columns.iter().position(|c| c == name)
}
