//! Run report generation.
//!
//! Summarizes a pipeline run (what was loaded, what was derived, which
//! charts were written) as Markdown or JSON.

use crate::models::{
    CategoryShare, ChartOutcome, DerivedTableSummary, LoadedTable, RunMetadata, RunReport,
    TopCustomer,
};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Generate a complete Markdown run report.
pub fn generate_markdown_report(report: &RunReport) -> String {
    let mut output = String::new();

    output.push_str("# Retail Pipeline Run Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata, report));
    output.push_str(&generate_loaded_section(&report.loaded));
    output.push_str(&generate_derived_section(&report.derived));
    output.push_str(&generate_charts_section(&report.charts));
    output.push_str(&generate_top_customers_section(&report.top_customers));
    output.push_str(&generate_category_section(&report.category_shares));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(metadata: &RunMetadata, report: &RunReport) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Run Date:** {}\n",
        metadata.run_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Backend:** `{}`\n", metadata.backend));
    section.push_str(&format!("- **Output Directory:** `{}`\n", metadata.output_dir));
    section.push_str(&format!(
        "- **Charts Rendered:** {}/{}\n",
        report.charts.len() - report.failed_charts(),
        report.charts.len()
    ));
    section.push_str(&format!("- **Duration:** {:.1}s\n", metadata.duration_seconds));
    section.push('\n');

    section
}

fn generate_loaded_section(loaded: &[LoadedTable]) -> String {
    let mut section = String::new();

    section.push_str("## Loaded Tables\n\n");
    if loaded.is_empty() {
        section.push_str("No tables were loaded.\n\n");
        return section;
    }

    section.push_str("| Table | Source | Rows | Columns |\n");
    section.push_str("|:---|:---|---:|:---|\n");
    for table in loaded {
        let columns = table
            .columns
            .iter()
            .map(|c| format!("{} ({})", c.name, c.column_type))
            .collect::<Vec<_>>()
            .join(", ");
        section.push_str(&format!(
            "| {} | `{}` | {} | {} |\n",
            table.table, table.source, table.rows, columns
        ));
    }
    section.push('\n');

    section
}

fn generate_derived_section(derived: &[DerivedTableSummary]) -> String {
    let mut section = String::new();

    section.push_str("## Derived Tables\n\n");
    section.push_str("| Table | Rows |\n");
    section.push_str("|:---|---:|\n");
    for table in derived {
        section.push_str(&format!("| {} | {} |\n", table.table, table.rows));
    }
    section.push('\n');

    section
}

fn generate_charts_section(charts: &[ChartOutcome]) -> String {
    let mut section = String::new();

    section.push_str("## Charts\n\n");
    section.push_str("| Chart | Status | File |\n");
    section.push_str("|:---|:---:|:---|\n");
    for chart in charts {
        let status = if chart.rendered {
            "✅ rendered".to_string()
        } else {
            format!("❌ {}", chart.error.as_deref().unwrap_or("failed"))
        };
        section.push_str(&format!("| {} | {} | `{}` |\n", chart.chart, status, chart.path));
    }
    section.push('\n');

    section
}

fn generate_top_customers_section(customers: &[TopCustomer]) -> String {
    if customers.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Top Customers\n\n");
    section.push_str("| # | Customer | Total Spent |\n");
    section.push_str("|:---:|:---|---:|\n");
    for (i, customer) in customers.iter().enumerate() {
        section.push_str(&format!(
            "| {} | {} (#{}) | {:.2} |\n",
            i + 1,
            customer.customer_name,
            customer.customer_id,
            customer.total_spent
        ));
    }
    section.push('\n');

    section
}

fn generate_category_section(shares: &[CategoryShare]) -> String {
    if shares.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Sales by Category\n\n");
    section.push_str("| Category | Total Sales | Share |\n");
    section.push_str("|:---|---:|---:|\n");
    for share in shares {
        section.push_str(&format!(
            "| {} | {:.2} | {:.1}% |\n",
            share.category, share.total_sales, share.percent
        ));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    format!(
        "---\n\n*Generated by retail-pipeline v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

/// Generate a JSON run report.
pub fn generate_json_report(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write the report into `dir` as `file_name`, returning the written path.
pub fn write_report(content: &str, dir: &Path, file_name: &str) -> Result<PathBuf> {
    let path = dir.join(file_name);
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write run report to {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, ColumnType};
    use chrono::Utc;
    use tempfile::TempDir;

    fn create_test_report() -> RunReport {
        RunReport {
            metadata: RunMetadata {
                run_date: Utc::now(),
                backend: "sqlite".to_string(),
                output_dir: "charts".to_string(),
                duration_seconds: 1.5,
            },
            loaded: vec![LoadedTable {
                table: "customers".to_string(),
                source: "data/raw/customers.csv".to_string(),
                rows: 3,
                columns: vec![Column {
                    name: "customer_id".to_string(),
                    column_type: ColumnType::Integer,
                }],
            }],
            derived: vec![DerivedTableSummary {
                table: "top_customers".to_string(),
                rows: 2,
            }],
            charts: vec![
                ChartOutcome::rendered("top_products", "charts/top_products.png"),
                ChartOutcome::failed(
                    "monthly_sales",
                    "charts/monthly_sales.png",
                    "Chart 'monthly_sales' not rendered: no data to plot".to_string(),
                ),
            ],
            top_customers: vec![TopCustomer {
                customer_id: "2".to_string(),
                customer_name: "Alan Turing".to_string(),
                total_spent: 275.0,
            }],
            category_shares: vec![CategoryShare {
                category: "Electronics".to_string(),
                total_sales: 325.5,
                percent: 72.25,
            }],
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = create_test_report();
        let markdown = generate_markdown_report(&report);

        assert!(markdown.contains("# Retail Pipeline Run Report"));
        assert!(markdown.contains("## Loaded Tables"));
        assert!(markdown.contains("customer_id (integer)"));
        assert!(markdown.contains("## Derived Tables"));
        assert!(markdown.contains("| top_customers | 2 |"));
        assert!(markdown.contains("Alan Turing (#2)"));
        assert!(markdown.contains("72.2%") || markdown.contains("72.3%"));
    }

    #[test]
    fn test_metadata_counts_rendered_charts() {
        let report = create_test_report();
        let section = generate_metadata_section(&report.metadata, &report);

        assert!(section.contains("sqlite"));
        assert!(section.contains("Charts Rendered:** 1/2"));
        assert!(section.contains("1.5s"));
    }

    #[test]
    fn test_charts_section_shows_failures() {
        let report = create_test_report();
        let section = generate_charts_section(&report.charts);

        assert!(section.contains("✅ rendered"));
        assert!(section.contains("❌ Chart 'monthly_sales' not rendered: no data to plot"));
    }

    #[test]
    fn test_empty_sections_are_omitted() {
        assert!(generate_top_customers_section(&[]).is_empty());
        assert!(generate_category_section(&[]).is_empty());
    }

    #[test]
    fn test_generate_json_report() {
        let report = create_test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"metadata\""));
        assert!(json.contains("\"charts\""));
        assert!(json.contains("\"top_customers\""));
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["charts"][0]["rendered"], true);
        assert!(parsed["charts"][0].get("error").is_none());
    }

    #[test]
    fn test_write_report() {
        let dir = TempDir::new().unwrap();
        let path = write_report("# report\n", dir.path(), "run_report.md").unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "# report\n");
    }
}
