//! Chart rendering.
//!
//! Every chart's data is read from the store first; the charts are then
//! drawn in parallel on blocking tasks. A chart that fails (empty data, a
//! drawing error) is reported in its [`ChartOutcome`] and never stops the
//! others.

pub mod charts;

use crate::analysis::{
    category_order, category_shares, fetch_category_sales, fetch_customer_sales,
    fetch_monthly_sales, fetch_top_customers, fetch_top_products, monthly_category_breakdown,
};
use crate::config::ChartConfig;
use crate::error::{PipelineError, Result};
use crate::models::{ChartOutcome, MonthlyCategorySales};
use crate::store::Store;
use charts::{BarColor, Labels};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The charts produced by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    TopProducts,
    TopCustomers,
    CategoryShare,
    MonthlyTrend,
    RevenueByCategory,
    CustomerSales,
}

impl ChartKind {
    pub const ALL: [ChartKind; 6] = [
        ChartKind::TopProducts,
        ChartKind::TopCustomers,
        ChartKind::CategoryShare,
        ChartKind::MonthlyTrend,
        ChartKind::RevenueByCategory,
        ChartKind::CustomerSales,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ChartKind::TopProducts => "top_products",
            ChartKind::TopCustomers => "top_customers",
            ChartKind::CategoryShare => "category_sales",
            ChartKind::MonthlyTrend => "monthly_sales",
            ChartKind::RevenueByCategory => "revenue_by_category",
            ChartKind::CustomerSales => "customer_sales",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.png", self.name())
    }

    fn labels(&self) -> Labels<'static> {
        let (title, x_desc, y_desc) = match self {
            ChartKind::TopProducts => ("Top Products by Revenue", "Product", "Total Revenue"),
            ChartKind::TopCustomers => ("Top 5 Customers by Spending", "Customer", "Total Spent"),
            ChartKind::CategoryShare => ("Sales by Product Category", "", ""),
            ChartKind::MonthlyTrend => ("Monthly Sales Trend", "Month", "Total Sales"),
            ChartKind::RevenueByCategory => ("Revenue by Category per Month", "Month", "Total Sales"),
            ChartKind::CustomerSales => ("Customer Sales (Total Spent)", "Customer", "Total Spent"),
        };
        Labels {
            title,
            x_desc,
            y_desc,
        }
    }
}

/// Month x category sales matrix for the stacked chart.
#[derive(Debug, Clone, PartialEq)]
pub struct StackedBars {
    /// Chronological.
    pub months: Vec<String>,
    /// Ordered by total sales, which also fixes each category's colour.
    pub categories: Vec<String>,
    /// `values[category][month]`; a missing pair is zero.
    pub values: Vec<Vec<f64>>,
}

impl StackedBars {
    pub fn from_breakdown(breakdown: &[MonthlyCategorySales]) -> Self {
        let categories = category_order(breakdown);
        let mut months: Vec<String> = breakdown.iter().map(|b| b.month.clone()).collect();
        months.sort();
        months.dedup();

        let mut values = vec![vec![0.0; months.len()]; categories.len()];
        for entry in breakdown {
            let c = categories.iter().position(|name| *name == entry.category);
            let m = months.binary_search(&entry.month).ok();
            if let (Some(c), Some(m)) = (c, m) {
                values[c][m] += entry.total_sales;
            }
        }

        Self {
            months,
            categories,
            values,
        }
    }

    /// Height at which category `category`'s segment starts in month `month`.
    pub fn base_of(&self, category: usize, month: usize) -> f64 {
        self.values[..category].iter().map(|row| row[month]).sum()
    }

    pub fn month_total(&self, month: usize) -> f64 {
        self.values.iter().map(|row| row[month]).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty() || self.categories.is_empty()
    }
}

/// Chart-ready data, detached from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ChartData {
    Bars {
        labels: Vec<String>,
        values: Vec<f64>,
        color: BarColor,
    },
    Line {
        labels: Vec<String>,
        values: Vec<f64>,
    },
    Pie {
        labels: Vec<String>,
        values: Vec<f64>,
    },
    Stacked(StackedBars),
}

impl ChartData {
    fn is_empty(&self) -> bool {
        match self {
            ChartData::Bars { values, .. }
            | ChartData::Line { values, .. }
            | ChartData::Pie { values, .. } => values.is_empty(),
            ChartData::Stacked(stacked) => stacked.is_empty(),
        }
    }
}

/// Options for the render stage.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub output_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    pub show_progress: bool,
}

impl RenderOptions {
    pub fn new(output_dir: &Path, charts: &ChartConfig) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            width: charts.width,
            height: charts.height,
            show_progress: false,
        }
    }
}

/// Render every chart, returning one outcome per chart in [`ChartKind::ALL`] order.
pub async fn render_all(store: &Store, options: &RenderOptions) -> Vec<ChartOutcome> {
    if let Err(e) = std::fs::create_dir_all(&options.output_dir) {
        warn!(
            "Cannot create output directory {}: {}",
            options.output_dir.display(),
            e
        );
        return ChartKind::ALL
            .iter()
            .map(|kind| {
                let path = options.output_dir.join(kind.file_name());
                ChartOutcome::failed(
                    kind.name(),
                    &path.display().to_string(),
                    format!("cannot create output directory: {}", e),
                )
            })
            .collect();
    }

    let mut prepared = Vec::with_capacity(ChartKind::ALL.len());
    for kind in ChartKind::ALL {
        let data = fetch_chart_data(store, kind).await.and_then(|data| {
            if data.is_empty() {
                Err(PipelineError::render(kind.name(), "no data to plot"))
            } else {
                Ok(data)
            }
        });
        prepared.push((kind, data));
    }

    let progress = if options.show_progress {
        let pb = ProgressBar::new(prepared.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let size = (options.width, options.height);
    let tasks = prepared.into_iter().map(|(kind, data)| {
        let path = options.output_dir.join(kind.file_name());
        let progress = progress.clone();
        async move {
            let result = match data {
                Ok(data) => draw_in_background(kind, data, path.clone(), size).await,
                Err(e) => Err(e),
            };
            if let Some(pb) = progress {
                pb.set_message(kind.name());
                pb.inc(1);
            }
            outcome(kind, &path, result)
        }
    });
    let outcomes = join_all(tasks).await;

    if let Some(pb) = progress {
        let rendered = outcomes.iter().filter(|o| o.rendered).count();
        pb.finish_with_message(format!("{} of {} charts rendered", rendered, outcomes.len()));
    }

    outcomes
}

fn outcome(kind: ChartKind, path: &Path, result: Result<()>) -> ChartOutcome {
    let shown = path.display().to_string();
    match result {
        Ok(()) => {
            info!("Saved {}", shown);
            ChartOutcome::rendered(kind.name(), &shown)
        }
        Err(e) => {
            warn!("{}", e);
            ChartOutcome::failed(kind.name(), &shown, e.to_string())
        }
    }
}

async fn draw_in_background(
    kind: ChartKind,
    data: ChartData,
    path: PathBuf,
    size: (u32, u32),
) -> Result<()> {
    tokio::task::spawn_blocking(move || draw(kind, &data, &path, size))
        .await
        .map_err(|e| PipelineError::render(kind.name(), format!("drawing task failed: {}", e)))?
}

fn draw(kind: ChartKind, data: &ChartData, path: &Path, size: (u32, u32)) -> Result<()> {
    debug!("Drawing {} to {}", kind.name(), path.display());
    let text = kind.labels();
    let drawn = match data {
        ChartData::Bars {
            labels,
            values,
            color,
        } => charts::draw_bar_chart(path, size, text, labels, values, *color),
        ChartData::Line { labels, values } => charts::draw_line_chart(path, size, text, labels, values),
        ChartData::Pie { labels, values } => {
            charts::draw_pie_chart(path, size, text.title, labels, values)
        }
        ChartData::Stacked(stacked) => charts::draw_stacked_chart(path, size, text, stacked),
    };
    drawn.map_err(|e| PipelineError::render(kind.name(), e))
}

/// Read and shape the data behind one chart.
pub async fn fetch_chart_data(store: &Store, kind: ChartKind) -> Result<ChartData> {
    let data = match kind {
        ChartKind::TopProducts => {
            let rows = fetch_top_products(store).await?;
            ChartData::Bars {
                labels: rows.iter().map(|r| r.product_name.clone()).collect(),
                values: rows.iter().map(|r| r.total_revenue).collect(),
                color: BarColor::SkyBlue,
            }
        }
        ChartKind::TopCustomers => {
            let rows = fetch_top_customers(store).await?;
            ChartData::Bars {
                labels: rows.iter().map(|r| r.customer_name.clone()).collect(),
                values: rows.iter().map(|r| r.total_spent).collect(),
                color: BarColor::Orange,
            }
        }
        ChartKind::CategoryShare => pie_data(&fetch_category_sales(store).await?)?,
        ChartKind::MonthlyTrend => {
            let rows = fetch_monthly_sales(store).await?;
            ChartData::Line {
                labels: rows.iter().map(|r| r.month.clone()).collect(),
                values: rows.iter().map(|r| r.total_sales).collect(),
            }
        }
        ChartKind::RevenueByCategory => {
            ChartData::Stacked(StackedBars::from_breakdown(&monthly_category_breakdown(store).await?))
        }
        ChartKind::CustomerSales => {
            let rows = fetch_customer_sales(store).await?;
            ChartData::Bars {
                labels: rows.iter().map(|r| r.customer_name.clone()).collect(),
                values: rows.iter().map(|r| r.total_spent).collect(),
                color: BarColor::Orange,
            }
        }
    };
    Ok(data)
}

/// Pie slices labelled with their share, e.g. `Electronics (72.3%)`.
fn pie_data(categories: &[crate::models::CategorySales]) -> Result<ChartData> {
    let shares = category_shares(categories);
    if !shares.is_empty() && shares.iter().all(|s| s.percent == 0.0) {
        return Err(PipelineError::render(
            ChartKind::CategoryShare.name(),
            "total sales is zero",
        ));
    }
    Ok(ChartData::Pie {
        labels: shares
            .iter()
            .map(|s| format!("{} ({:.1}%)", s.category, s.percent))
            .collect(),
        values: shares.iter().map(|s| s.total_sales).collect(),
    })
}
