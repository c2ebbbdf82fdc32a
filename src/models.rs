//! Data models for the reporting pipeline.
//!
//! This module contains the in-memory tabular representation produced by the
//! loader, the typed rows of each derived table, and the run report.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Primitive type inferred for a loaded column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Date,
    Text,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Integer => write!(f, "integer"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Date => write!(f, "date"),
            ColumnType::Text => write!(f, "text"),
        }
    }
}

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    Text(String),
}

/// Column name and inferred type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

/// A parsed delimited file, ready to persist.
#[derive(Debug, Clone)]
pub struct Table {
    /// Logical table name in the store.
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// One row of `customer_sales`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSales {
    pub customer_id: String,
    pub customer_name: String,
    pub total_spent: f64,
    pub num_transactions: i64,
}

/// One row of `top_products`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRevenue {
    pub product_id: String,
    pub product_name: String,
    pub total_revenue: f64,
    pub num_transactions: i64,
}

/// One row of `monthly_sales`. `month` is formatted `YYYY-MM`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySales {
    pub month: String,
    pub total_sales: f64,
}

/// One row of `top_customers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCustomer {
    pub customer_id: String,
    pub customer_name: String,
    pub total_spent: f64,
}

/// One row of `category_sales`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySales {
    pub category: String,
    pub total_sales: f64,
}

/// Sales for one (month, category) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyCategorySales {
    pub month: String,
    pub category: String,
    pub total_sales: f64,
}

/// Result of loading one source file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedTable {
    pub table: String,
    pub source: String,
    pub rows: usize,
    pub columns: Vec<Column>,
}

/// Row count of one derived table after the aggregation batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedTableSummary {
    pub table: String,
    pub rows: i64,
}

/// Outcome of rendering one chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartOutcome {
    pub chart: String,
    pub path: String,
    pub rendered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChartOutcome {
    pub fn rendered(chart: &str, path: &str) -> Self {
        Self {
            chart: chart.to_string(),
            path: path.to_string(),
            rendered: true,
            error: None,
        }
    }

    pub fn failed(chart: &str, path: &str, error: String) -> Self {
        Self {
            chart: chart.to_string(),
            path: path.to_string(),
            rendered: false,
            error: Some(error),
        }
    }
}

/// Share of total sales held by one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub category: String,
    pub total_sales: f64,
    pub percent: f64,
}

/// Metadata about a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_date: DateTime<Utc>,
    pub backend: String,
    pub output_dir: String,
    pub duration_seconds: f64,
}

/// Everything a run produced, for the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub loaded: Vec<LoadedTable>,
    pub derived: Vec<DerivedTableSummary>,
    pub charts: Vec<ChartOutcome>,
    pub top_customers: Vec<TopCustomer>,
    pub category_shares: Vec<CategoryShare>,
}

impl RunReport {
    /// Number of charts that failed to render.
    pub fn failed_charts(&self) -> usize {
        self.charts.iter().filter(|c| !c.rendered).count()
    }
}
