//! Derived reporting tables.
//!
//! The five summary tables are rebuilt from the loaded source tables in one
//! transaction. Joins are inner joins: customers and products without
//! transactions never appear, and transactions whose customer or product is
//! unknown are left out of the tables grouped by that entity (they are
//! counted and reported as orphans). This module also owns every read of the
//! derived data, so charts and reports never aggregate on their own.

use crate::error::{PipelineError, Result, Stage};
use crate::models::{
    CategoryShare, CategorySales, CustomerSales, DerivedTableSummary, MonthlyCategorySales,
    MonthlySales, ProductRevenue, TopCustomer,
};
use crate::store::schema::{self, Customers, Products, Transactions};
use crate::store::{Backend, Store};
use sea_query::{Alias, Expr, Func, Iden, Order, Query, SelectStatement, SimpleExpr};
use sqlx::any::AnyRow;
use sqlx::{Any, Row, Transaction};
use tracing::{debug, info, warn};

/// Tables the aggregation reads from.
pub const SOURCE_TABLES: [&str; 3] = ["customers", "products", "transactions"];

/// Maximum rows kept in `top_customers`.
pub const TOP_CUSTOMER_LIMIT: usize = 5;

/// A table rebuilt from the source tables on every run.
#[derive(Debug, Clone, Copy)]
pub struct DerivedTable {
    pub name: &'static str,
    select: fn(Backend) -> SelectStatement,
}

impl DerivedTable {
    /// The `SELECT` the table is created from.
    pub fn query(&self, backend: Backend) -> SelectStatement {
        (self.select)(backend)
    }
}

/// The derived tables, in creation order.
pub const DERIVED_TABLES: [DerivedTable; 5] = [
    DerivedTable {
        name: "customer_sales",
        select: customer_sales_query,
    },
    DerivedTable {
        name: "top_products",
        select: top_products_query,
    },
    DerivedTable {
        name: "monthly_sales",
        select: monthly_sales_query,
    },
    DerivedTable {
        name: "top_customers",
        select: top_customers_query,
    },
    DerivedTable {
        name: "category_sales",
        select: category_sales_query,
    },
];

/// `SUM(total_amount)` as a float on both backends.
fn total_amount() -> SimpleExpr {
    Func::cast_as(
        Func::sum(Expr::col((Transactions::Table, Transactions::TotalAmount))),
        Alias::new("DOUBLE PRECISION"),
    )
    .into()
}

fn customer_name() -> SimpleExpr {
    Expr::cust("customers.first_name || ' ' || customers.last_name")
}

fn transaction_month(backend: Backend) -> SimpleExpr {
    backend.month_of(&format!(
        "{}.{}",
        Transactions::Table.to_string(),
        Transactions::TransactionDate.to_string()
    ))
}

fn transaction_count() -> SimpleExpr {
    Expr::col((Transactions::Table, Transactions::TransactionId)).count()
}

fn as_text(column: SimpleExpr) -> SimpleExpr {
    Func::cast_as(column, Alias::new("TEXT")).into()
}

fn customer_totals() -> SelectStatement {
    Query::select()
        .column((Customers::Table, Customers::CustomerId))
        .expr_as(customer_name(), schema::CustomerSales::CustomerName)
        .expr_as(total_amount(), schema::CustomerSales::TotalSpent)
        .from(Customers::Table)
        .inner_join(
            Transactions::Table,
            Expr::col((Customers::Table, Customers::CustomerId))
                .equals((Transactions::Table, Transactions::CustomerId)),
        )
        .group_by_col((Customers::Table, Customers::CustomerId))
        .group_by_col((Customers::Table, Customers::FirstName))
        .group_by_col((Customers::Table, Customers::LastName))
        .to_owned()
}

fn customer_sales_query(_: Backend) -> SelectStatement {
    customer_totals()
        .expr_as(transaction_count(), schema::CustomerSales::NumTransactions)
        .order_by((Customers::Table, Customers::CustomerId), Order::Asc)
        .to_owned()
}

fn top_products_query(_: Backend) -> SelectStatement {
    Query::select()
        .column((Products::Table, Products::ProductId))
        .column((Products::Table, Products::ProductName))
        .expr_as(total_amount(), schema::TopProducts::TotalRevenue)
        .expr_as(transaction_count(), schema::TopProducts::NumTransactions)
        .from(Products::Table)
        .inner_join(
            Transactions::Table,
            Expr::col((Products::Table, Products::ProductId))
                .equals((Transactions::Table, Transactions::ProductId)),
        )
        .group_by_col((Products::Table, Products::ProductId))
        .group_by_col((Products::Table, Products::ProductName))
        .order_by(schema::TopProducts::TotalRevenue, Order::Desc)
        .order_by((Products::Table, Products::ProductId), Order::Asc)
        .to_owned()
}

fn monthly_sales_query(backend: Backend) -> SelectStatement {
    let month = transaction_month(backend);
    Query::select()
        .expr_as(month.clone(), schema::MonthlySales::Month)
        .expr_as(total_amount(), schema::MonthlySales::TotalSales)
        .from(Transactions::Table)
        .add_group_by([month.clone()])
        .order_by_expr(month, Order::Asc)
        .to_owned()
}

fn top_customers_query(_: Backend) -> SelectStatement {
    customer_totals()
        .order_by(schema::TopCustomers::TotalSpent, Order::Desc)
        .order_by((Customers::Table, Customers::CustomerId), Order::Asc)
        .limit(TOP_CUSTOMER_LIMIT as u64)
        .to_owned()
}

fn category_sales_query(_: Backend) -> SelectStatement {
    Query::select()
        .column((Products::Table, Products::Category))
        .expr_as(total_amount(), schema::CategorySales::TotalSales)
        .from(Products::Table)
        .inner_join(
            Transactions::Table,
            Expr::col((Products::Table, Products::ProductId))
                .equals((Transactions::Table, Transactions::ProductId)),
        )
        .group_by_col((Products::Table, Products::Category))
        .order_by(schema::CategorySales::TotalSales, Order::Desc)
        .order_by((Products::Table, Products::Category), Order::Asc)
        .to_owned()
}

/// Transactions left out of a grouping because their reference has no match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrphanCounts {
    pub without_customer: i64,
    pub without_product: i64,
}

/// Rebuild every derived table in one transaction.
///
/// Fails without changing any derived table if a source table is missing or
/// any statement fails.
pub async fn run_aggregations(store: &Store) -> Result<Vec<DerivedTableSummary>> {
    let mut tx = store.begin(Stage::Aggregate).await?;

    match rebuild_all(&mut tx, store.backend()).await {
        Ok(summaries) => {
            tx.commit()
                .await
                .map_err(PipelineError::query(Stage::Aggregate, "commit aggregation batch"))?;
            Ok(summaries)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!("Rollback of aggregation batch failed: {}", rollback);
            }
            Err(e)
        }
    }
}

async fn rebuild_all(
    tx: &mut Transaction<'static, Any>,
    backend: Backend,
) -> Result<Vec<DerivedTableSummary>> {
    for table in SOURCE_TABLES {
        let exists = scalar(tx, &backend.table_exists(table), "check source tables").await?;
        if exists == 0 {
            return Err(PipelineError::MissingSource {
                table: table.to_string(),
            });
        }
    }

    let orphans = count_orphans(tx, backend).await?;
    if orphans.without_customer > 0 {
        warn!(
            "{} transactions reference unknown customers; excluded from customer tables",
            orphans.without_customer
        );
    }
    if orphans.without_product > 0 {
        warn!(
            "{} transactions reference unknown products; excluded from product and category tables",
            orphans.without_product
        );
    }

    let mut summaries = Vec::with_capacity(DERIVED_TABLES.len());
    for table in &DERIVED_TABLES {
        info!("Creating table {}...", table.name);
        rebuild(tx, backend, table).await?;

        let rows = scalar(tx, &backend.count_rows(table.name), table.name).await?;
        debug!("{} has {} rows", table.name, rows);
        summaries.push(DerivedTableSummary {
            table: table.name.to_string(),
            rows,
        });
    }

    Ok(summaries)
}

async fn rebuild(
    tx: &mut Transaction<'static, Any>,
    backend: Backend,
    table: &DerivedTable,
) -> Result<()> {
    let drop_op = format!("drop {}", table.name);
    sqlx::query(&backend.drop_table(table.name))
        .execute(&mut **tx)
        .await
        .map_err(PipelineError::query(Stage::Aggregate, &drop_op))?;

    let create_op = format!("create {}", table.name);
    let create = backend.create_table_as(table.name, &table.query(backend));
    sqlx::query(&create)
        .execute(&mut **tx)
        .await
        .map_err(PipelineError::query(Stage::Aggregate, &create_op))?;

    Ok(())
}

async fn count_orphans(
    tx: &mut Transaction<'static, Any>,
    backend: Backend,
) -> Result<OrphanCounts> {
    let without_customer = Query::select()
        .expr_as(Expr::cust("COUNT(*)"), Alias::new("n"))
        .from(Transactions::Table)
        .left_join(
            Customers::Table,
            Expr::col((Customers::Table, Customers::CustomerId))
                .equals((Transactions::Table, Transactions::CustomerId)),
        )
        .and_where(Expr::col((Customers::Table, Customers::CustomerId)).is_null())
        .to_owned();
    let without_product = Query::select()
        .expr_as(Expr::cust("COUNT(*)"), Alias::new("n"))
        .from(Transactions::Table)
        .left_join(
            Products::Table,
            Expr::col((Products::Table, Products::ProductId))
                .equals((Transactions::Table, Transactions::ProductId)),
        )
        .and_where(Expr::col((Products::Table, Products::ProductId)).is_null())
        .to_owned();

    let operation = "count orphaned transactions";
    Ok(OrphanCounts {
        without_customer: scalar(tx, &backend.build_query(&without_customer), operation).await?,
        without_product: scalar(tx, &backend.build_query(&without_product), operation).await?,
    })
}

/// Run a query returning a single integer column `n`.
async fn scalar(tx: &mut Transaction<'static, Any>, sql: &str, operation: &str) -> Result<i64> {
    let row = sqlx::query(sql)
        .fetch_one(&mut **tx)
        .await
        .map_err(PipelineError::query(Stage::Aggregate, operation))?;
    row.try_get::<i64, _>("n")
        .map_err(PipelineError::query(Stage::Aggregate, operation))
}

async fn read(store: &Store, operation: &str, stmt: &SelectStatement) -> Result<Vec<AnyRow>> {
    let sql = store.backend().build_query(stmt);
    store.fetch_all(Stage::Render, operation, &sql).await
}

/// Decode every row with `decode`, tagging failures with `operation`.
fn decode_rows<T>(
    rows: Vec<AnyRow>,
    operation: &str,
    decode: impl Fn(&AnyRow) -> std::result::Result<T, sqlx::Error>,
) -> Result<Vec<T>> {
    rows.iter()
        .map(|row| decode(row).map_err(PipelineError::query(Stage::Render, operation)))
        .collect()
}

fn text(row: &AnyRow, column: &str) -> std::result::Result<String, sqlx::Error> {
    Ok(row.try_get::<Option<String>, _>(column)?.unwrap_or_default())
}

fn amount(row: &AnyRow, column: &str) -> std::result::Result<f64, sqlx::Error> {
    Ok(row.try_get::<Option<f64>, _>(column)?.unwrap_or(0.0))
}

/// All rows of `customer_sales`, highest spend first.
pub async fn fetch_customer_sales(store: &Store) -> Result<Vec<CustomerSales>> {
    use schema::CustomerSales as Cs;
    let operation = "read customer_sales";
    let stmt = Query::select()
        .expr_as(as_text(Expr::col((Cs::Table, Cs::CustomerId)).into()), Cs::CustomerId)
        .columns([Cs::CustomerName, Cs::TotalSpent, Cs::NumTransactions])
        .from(Cs::Table)
        .order_by((Cs::Table, Cs::TotalSpent), Order::Desc)
        .order_by((Cs::Table, Cs::CustomerId), Order::Asc)
        .to_owned();
    let rows = read(store, operation, &stmt).await?;
    decode_rows(rows, operation, |row| {
        Ok(CustomerSales {
            customer_id: text(row, "customer_id")?,
            customer_name: text(row, "customer_name")?,
            total_spent: amount(row, "total_spent")?,
            num_transactions: row.try_get("num_transactions")?,
        })
    })
}

/// All rows of `top_products`, highest revenue first.
pub async fn fetch_top_products(store: &Store) -> Result<Vec<ProductRevenue>> {
    use schema::TopProducts as Tp;
    let operation = "read top_products";
    let stmt = Query::select()
        .expr_as(as_text(Expr::col((Tp::Table, Tp::ProductId)).into()), Tp::ProductId)
        .columns([Tp::ProductName, Tp::TotalRevenue, Tp::NumTransactions])
        .from(Tp::Table)
        .order_by((Tp::Table, Tp::TotalRevenue), Order::Desc)
        .order_by((Tp::Table, Tp::ProductId), Order::Asc)
        .to_owned();
    let rows = read(store, operation, &stmt).await?;
    decode_rows(rows, operation, |row| {
        Ok(ProductRevenue {
            product_id: text(row, "product_id")?,
            product_name: text(row, "product_name")?,
            total_revenue: amount(row, "total_revenue")?,
            num_transactions: row.try_get("num_transactions")?,
        })
    })
}

/// All rows of `monthly_sales`, oldest month first.
pub async fn fetch_monthly_sales(store: &Store) -> Result<Vec<MonthlySales>> {
    use schema::MonthlySales as Ms;
    let operation = "read monthly_sales";
    let stmt = Query::select()
        .columns([Ms::Month, Ms::TotalSales])
        .from(Ms::Table)
        .order_by(Ms::Month, Order::Asc)
        .to_owned();
    let rows = read(store, operation, &stmt).await?;
    decode_rows(rows, operation, |row| {
        Ok(MonthlySales {
            month: text(row, "month")?,
            total_sales: amount(row, "total_sales")?,
        })
    })
}

/// All rows of `top_customers`, highest spend first.
pub async fn fetch_top_customers(store: &Store) -> Result<Vec<TopCustomer>> {
    use schema::TopCustomers as Tc;
    let operation = "read top_customers";
    let stmt = Query::select()
        .expr_as(as_text(Expr::col((Tc::Table, Tc::CustomerId)).into()), Tc::CustomerId)
        .columns([Tc::CustomerName, Tc::TotalSpent])
        .from(Tc::Table)
        .order_by((Tc::Table, Tc::TotalSpent), Order::Desc)
        .order_by((Tc::Table, Tc::CustomerId), Order::Asc)
        .to_owned();
    let rows = read(store, operation, &stmt).await?;
    decode_rows(rows, operation, |row| {
        Ok(TopCustomer {
            customer_id: text(row, "customer_id")?,
            customer_name: text(row, "customer_name")?,
            total_spent: amount(row, "total_spent")?,
        })
    })
}

/// All rows of `category_sales`, highest sales first.
pub async fn fetch_category_sales(store: &Store) -> Result<Vec<CategorySales>> {
    use schema::CategorySales as Cs;
    let operation = "read category_sales";
    let stmt = Query::select()
        .columns([Cs::Category, Cs::TotalSales])
        .from(Cs::Table)
        .order_by(Cs::TotalSales, Order::Desc)
        .order_by(Cs::Category, Order::Asc)
        .to_owned();
    let rows = read(store, operation, &stmt).await?;
    decode_rows(rows, operation, |row| {
        Ok(CategorySales {
            category: text(row, "category")?,
            total_sales: amount(row, "total_sales")?,
        })
    })
}

/// Sales per (month, category), computed on read and never materialized.
pub async fn monthly_category_breakdown(store: &Store) -> Result<Vec<MonthlyCategorySales>> {
    let operation = "read monthly category breakdown";
    let month = transaction_month(store.backend());
    let category = Expr::col((Products::Table, Products::Category));
    let stmt = Query::select()
        .expr_as(month.clone(), schema::MonthlySales::Month)
        .column((Products::Table, Products::Category))
        .expr_as(total_amount(), schema::MonthlySales::TotalSales)
        .from(Transactions::Table)
        .inner_join(
            Products::Table,
            Expr::col((Transactions::Table, Transactions::ProductId))
                .equals((Products::Table, Products::ProductId)),
        )
        .add_group_by([month.clone(), category.clone().into()])
        .order_by_expr(month, Order::Asc)
        .order_by_expr(category.into(), Order::Asc)
        .to_owned();
    let rows = read(store, operation, &stmt).await?;
    decode_rows(rows, operation, |row| {
        Ok(MonthlyCategorySales {
            month: text(row, "month")?,
            category: text(row, "category")?,
            total_sales: amount(row, "total_sales")?,
        })
    })
}

/// Each category's percentage of total sales, in input order.
///
/// Percentages sum to 100 whenever the total is positive; with a zero total
/// every share is zero.
pub fn category_shares(categories: &[CategorySales]) -> Vec<CategoryShare> {
    let total: f64 = categories.iter().map(|c| c.total_sales).sum();
    categories
        .iter()
        .map(|c| CategoryShare {
            category: c.category.clone(),
            total_sales: c.total_sales,
            percent: if total > 0.0 {
                c.total_sales / total * 100.0
            } else {
                0.0
            },
        })
        .collect()
}

/// Categories ordered by total sales (descending, ties by name).
///
/// Used to give every category a stable position and colour across months.
pub fn category_order(breakdown: &[MonthlyCategorySales]) -> Vec<String> {
    let mut totals: Vec<(String, f64)> = Vec::new();
    for entry in breakdown {
        match totals.iter_mut().find(|(name, _)| *name == entry.category) {
            Some((_, total)) => *total += entry.total_sales,
            None => totals.push((entry.category.clone(), entry.total_sales)),
        }
    }
    totals.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    totals.into_iter().map(|(name, _)| name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::tests::{sqlite_store, write_sources, CUSTOMERS, PRODUCTS, TRANSACTIONS};
    use crate::loader::{load_sources, LoadOptions};
    use std::path::Path;
    use tempfile::TempDir;

    async fn loaded_store(dir: &Path, customers: &str, products: &str, transactions: &str) -> Store {
        let sources = write_sources(dir, customers, products, transactions);
        let store = sqlite_store(dir).await;
        load_sources(&store, &sources, &LoadOptions::default())
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_customer_sales_scenario() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(
            dir.path(),
            "customer_id,first_name,last_name\n1,A,X\n2,B,Y\n",
            "product_id,product_name,category\n1,Thing,Misc\n",
            "transaction_id,customer_id,product_id,transaction_date,total_amount\n\
             1,1,1,2024-01-01,100\n\
             2,1,1,2024-01-02,50\n\
             3,2,1,2024-02-01,200\n",
        )
        .await;

        run_aggregations(&store).await.unwrap();
        let mut sales = fetch_customer_sales(&store).await.unwrap();
        sales.sort_by(|a, b| a.customer_id.cmp(&b.customer_id));

        assert_eq!(
            sales,
            vec![
                CustomerSales {
                    customer_id: "1".to_string(),
                    customer_name: "A X".to_string(),
                    total_spent: 150.0,
                    num_transactions: 2,
                },
                CustomerSales {
                    customer_id: "2".to_string(),
                    customer_name: "B Y".to_string(),
                    total_spent: 200.0,
                    num_transactions: 1,
                },
            ]
        );
        store.close().await;
    }

    #[tokio::test]
    async fn test_all_derived_tables_built() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(dir.path(), CUSTOMERS, PRODUCTS, TRANSACTIONS).await;

        let summaries = run_aggregations(&store).await.unwrap();
        let names: Vec<&str> = summaries.iter().map(|s| s.table.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "customer_sales",
                "top_products",
                "monthly_sales",
                "top_customers",
                "category_sales"
            ]
        );

        let customer_total: f64 = fetch_customer_sales(&store)
            .await
            .unwrap()
            .iter()
            .map(|c| c.total_spent)
            .sum();
        assert!((customer_total - 450.5).abs() < 1e-9);

        let months = fetch_monthly_sales(&store).await.unwrap();
        let labels: Vec<&str> = months.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(labels, vec!["2024-01", "2024-02", "2024-03"]);
        assert!((months[0].total_sales - 150.0).abs() < 1e-9);

        let categories = fetch_category_sales(&store).await.unwrap();
        assert_eq!(categories[0].category, "Electronics");
        assert!((categories[0].total_sales - 325.5).abs() < 1e-9);
        assert_eq!(categories[1].category, "Furniture");
        store.close().await;
    }

    #[tokio::test]
    async fn test_product_without_sales_is_excluded() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(dir.path(), CUSTOMERS, PRODUCTS, TRANSACTIONS).await;
        run_aggregations(&store).await.unwrap();

        let products = fetch_top_products(&store).await.unwrap();
        assert_eq!(products.len(), 3);
        assert!(products.iter().all(|p| p.product_name != "Lamp"));
        assert_eq!(products[0].product_name, "Laptop");
        assert!((products[0].total_revenue - 300.0).abs() < 1e-9);
        assert_eq!(products[0].num_transactions, 2);
        assert!(products
            .windows(2)
            .all(|w| w[0].total_revenue >= w[1].total_revenue));
        store.close().await;
    }

    #[tokio::test]
    async fn test_top_customers_limit_and_ties() {
        let dir = TempDir::new().unwrap();
        let customers = "customer_id,first_name,last_name\n\
            1,C,One\n2,C,Two\n3,C,Three\n4,C,Four\n5,C,Five\n6,C,Six\n7,C,Seven\n";
        let transactions = "transaction_id,customer_id,product_id,transaction_date,total_amount\n\
            1,7,10,2024-01-01,10\n\
            2,6,10,2024-01-01,10\n\
            3,5,10,2024-01-01,10\n\
            4,4,10,2024-01-01,90\n\
            5,3,10,2024-01-01,10\n\
            6,2,10,2024-01-01,10\n\
            7,1,10,2024-01-01,10\n";
        let store = loaded_store(dir.path(), customers, PRODUCTS, transactions).await;
        run_aggregations(&store).await.unwrap();

        let top = fetch_top_customers(&store).await.unwrap();
        let ids: Vec<&str> = top.iter().map(|c| c.customer_id.as_str()).collect();
        assert_eq!(ids, vec!["4", "1", "2", "3", "5"]);
        assert_eq!(top.len(), TOP_CUSTOMER_LIMIT);
        store.close().await;
    }

    #[tokio::test]
    async fn test_orphans_excluded_from_customer_tables() {
        let dir = TempDir::new().unwrap();
        let transactions = "transaction_id,customer_id,product_id,transaction_date,total_amount\n\
            1,1,10,2024-01-05,100\n\
            2,99,10,2024-01-06,40\n";
        let store = loaded_store(dir.path(), CUSTOMERS, PRODUCTS, transactions).await;

        let mut tx = store.begin(Stage::Aggregate).await.unwrap();
        let orphans = count_orphans(&mut tx, store.backend()).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(
            orphans,
            OrphanCounts {
                without_customer: 1,
                without_product: 0
            }
        );

        run_aggregations(&store).await.unwrap();
        let customers = fetch_customer_sales(&store).await.unwrap();
        assert_eq!(customers.len(), 1);
        assert!((customers[0].total_spent - 100.0).abs() < 1e-9);

        let months = fetch_monthly_sales(&store).await.unwrap();
        assert!((months[0].total_sales - 140.0).abs() < 1e-9);
        store.close().await;
    }

    #[tokio::test]
    async fn test_missing_source_table() {
        let dir = TempDir::new().unwrap();
        let store = sqlite_store(dir.path()).await;

        let err = run_aggregations(&store).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingSource { ref table } if table == "customers"));
        store.close().await;
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(dir.path(), CUSTOMERS, PRODUCTS, TRANSACTIONS).await;
        run_aggregations(&store).await.unwrap();
        let before = fetch_customer_sales(&store).await.unwrap();

        // Reload products without the category column: category_sales fails
        // after customer_sales and top_products were already rebuilt.
        let sources = write_sources(
            dir.path(),
            "customer_id,first_name,last_name\n1,Ada,Lovelace\n",
            "product_id,product_name\n10,Laptop\n",
            TRANSACTIONS,
        );
        load_sources(&store, &sources, &LoadOptions::default())
            .await
            .unwrap();

        let err = run_aggregations(&store).await.unwrap_err();
        assert!(
            matches!(err, PipelineError::Query { ref operation, .. } if operation == "create category_sales")
        );

        let after = fetch_customer_sales(&store).await.unwrap();
        assert_eq!(before, after);
        store.close().await;
    }

    #[tokio::test]
    async fn test_rerun_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(dir.path(), CUSTOMERS, PRODUCTS, TRANSACTIONS).await;

        run_aggregations(&store).await.unwrap();
        let first = (
            fetch_customer_sales(&store).await.unwrap(),
            fetch_top_products(&store).await.unwrap(),
            fetch_monthly_sales(&store).await.unwrap(),
            fetch_top_customers(&store).await.unwrap(),
            fetch_category_sales(&store).await.unwrap(),
        );
        run_aggregations(&store).await.unwrap();
        let second = (
            fetch_customer_sales(&store).await.unwrap(),
            fetch_top_products(&store).await.unwrap(),
            fetch_monthly_sales(&store).await.unwrap(),
            fetch_top_customers(&store).await.unwrap(),
            fetch_category_sales(&store).await.unwrap(),
        );
        assert_eq!(first, second);
        store.close().await;
    }

    #[tokio::test]
    async fn test_monthly_category_breakdown() {
        let dir = TempDir::new().unwrap();
        let store = loaded_store(dir.path(), CUSTOMERS, PRODUCTS, TRANSACTIONS).await;

        let breakdown = monthly_category_breakdown(&store).await.unwrap();
        assert_eq!(breakdown.len(), 4);
        assert_eq!(breakdown[0].month, "2024-01");
        assert_eq!(breakdown[0].category, "Electronics");
        assert!((breakdown[0].total_sales - 100.0).abs() < 1e-9);
        assert_eq!(
            category_order(&breakdown),
            vec!["Electronics".to_string(), "Furniture".to_string()]
        );
        store.close().await;
    }

    #[test]
    fn test_category_shares_sum_to_100() {
        let categories = vec![
            CategorySales {
                category: "Electronics".to_string(),
                total_sales: 325.5,
            },
            CategorySales {
                category: "Furniture".to_string(),
                total_sales: 125.0,
            },
            CategorySales {
                category: "Garden".to_string(),
                total_sales: 0.1,
            },
        ];
        let shares = category_shares(&categories);
        let total: f64 = shares.iter().map(|s| s.percent).sum();
        assert!((total - 100.0).abs() < 1e-9);
        assert_eq!(shares[0].category, "Electronics");
    }

    #[test]
    fn test_category_shares_zero_total() {
        let shares = category_shares(&[CategorySales {
            category: "Empty".to_string(),
            total_sales: 0.0,
        }]);
        assert_eq!(shares[0].percent, 0.0);
    }

    #[test]
    fn test_derived_sql_uses_inner_joins() {
        let select_sql =
            |table: &DerivedTable, backend: Backend| backend.build_query(&table.query(backend));
        for table in &DERIVED_TABLES {
            let sql = select_sql(table, Backend::Sqlite);
            assert!(!sql.contains("LEFT JOIN"), "{} should use inner joins", table.name);
        }
        assert!(select_sql(&DERIVED_TABLES[3], Backend::Postgres).contains("LIMIT 5"));
        assert!(select_sql(&DERIVED_TABLES[0], Backend::Postgres)
            .contains("CAST(SUM(\"transactions\".\"total_amount\") AS DOUBLE PRECISION)"));
        assert!(select_sql(&DERIVED_TABLES[0], Backend::Sqlite).contains("INNER JOIN"));
    }
}
