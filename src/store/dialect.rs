//! SQL rendering for the supported backends.
//!
//! Statements are built with sea-query, rendered to plain SQL with inlined
//! values and sent through the `Any` driver, so the same code path serves
//! PostgreSQL and SQLite.

use crate::models::{Cell, ColumnType, Table};
use sea_query::{
    Alias, ColumnDef, Expr, Iden, Keyword, PostgresQueryBuilder, Query, QueryStatementWriter,
    QuotedBuilder, SchemaStatementBuilder, SelectStatement, SimpleExpr, SqliteQueryBuilder,
};
use std::fmt;

/// Database engine behind a [`Store`](super::Store).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Postgres => write!(f, "postgres"),
            Backend::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl Backend {
    /// Detect the backend from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Some(Backend::Postgres),
            "sqlite" => Some(Backend::Sqlite),
            _ => None,
        }
    }

    /// Render a schema statement for this backend.
    pub fn build_schema<T: SchemaStatementBuilder>(&self, stmt: &T) -> String {
        match self {
            Backend::Postgres => stmt.to_string(PostgresQueryBuilder),
            Backend::Sqlite => stmt.to_string(SqliteQueryBuilder),
        }
    }

    /// Render a query statement for this backend.
    pub fn build_query<T: QueryStatementWriter>(&self, stmt: &T) -> String {
        match self {
            Backend::Postgres => stmt.to_string(PostgresQueryBuilder),
            Backend::Sqlite => stmt.to_string(SqliteQueryBuilder),
        }
    }

    /// `DROP TABLE IF EXISTS`, cascading to dependent views on PostgreSQL.
    pub fn drop_table(&self, table: &str) -> String {
        let mut stmt = sea_query::Table::drop();
        stmt.table(Alias::new(table)).if_exists();
        if *self == Backend::Postgres {
            stmt.cascade();
        }
        self.build_schema(&stmt)
    }

    /// `CREATE TABLE` with one column per loaded column.
    pub fn create_table(&self, table: &Table) -> String {
        let mut stmt = sea_query::Table::create();
        stmt.table(Alias::new(&table.name));
        for column in &table.columns {
            let mut def = ColumnDef::new(Alias::new(&column.name));
            match column.column_type {
                ColumnType::Integer => def.big_integer(),
                ColumnType::Float => def.double(),
                ColumnType::Date => def.date(),
                ColumnType::Text => def.text(),
            };
            stmt.col(&mut def);
        }
        self.build_schema(&stmt)
    }

    /// Multi-row `INSERT` of `rows` into `table`.
    ///
    /// Fails when a row does not have one cell per column.
    pub fn insert_rows(
        &self,
        table: &Table,
        rows: &[Vec<Cell>],
    ) -> Result<String, sea_query::error::Error> {
        let mut stmt = Query::insert();
        stmt.into_table(Alias::new(&table.name))
            .columns(table.columns.iter().map(|c| Alias::new(&c.name)));
        for row in rows {
            stmt.values(row.iter().map(cell_value))?;
        }
        Ok(self.build_query(&stmt))
    }

    /// `CREATE TABLE ... AS SELECT ...`, which sea-query has no builder for.
    pub fn create_table_as(&self, table: &str, select: &SelectStatement) -> String {
        let quote = match self {
            Backend::Postgres => PostgresQueryBuilder.quote(),
            Backend::Sqlite => SqliteQueryBuilder.quote(),
        };
        format!(
            "CREATE TABLE {} AS {}",
            Alias::new(table).quoted(quote),
            self.build_query(select)
        )
    }

    /// Query returning `n`, the number of rows in `table`.
    pub fn count_rows(&self, table: &str) -> String {
        let stmt = Query::select()
            .expr_as(Expr::cust("COUNT(*)"), Alias::new("n"))
            .from(Alias::new(table))
            .to_owned();
        self.build_query(&stmt)
    }

    /// Query returning `n > 0` when `table` exists in the current schema.
    pub fn table_exists(&self, table: &str) -> String {
        let mut stmt = Query::select();
        stmt.expr_as(Expr::cust("COUNT(*)"), Alias::new("n"));
        match self {
            Backend::Postgres => stmt
                .from((Alias::new("information_schema"), Alias::new("tables")))
                .and_where(Expr::col(Alias::new("table_schema")).eq(Expr::cust("current_schema()")))
                .and_where(Expr::col(Alias::new("table_name")).eq(table)),
            Backend::Sqlite => stmt
                .from(Alias::new("sqlite_master"))
                .and_where(Expr::col(Alias::new("type")).eq("table"))
                .and_where(Expr::col(Alias::new("name")).eq(table)),
        };
        self.build_query(&stmt)
    }

    /// Expression truncating a date column to its `YYYY-MM` month.
    pub fn month_of(&self, column: &str) -> SimpleExpr {
        match self {
            Backend::Postgres => Expr::cust(format!("to_char(CAST({} AS DATE), 'YYYY-MM')", column)),
            Backend::Sqlite => Expr::cust(format!("strftime('%Y-%m', {})", column)),
        }
    }
}

/// A loaded cell as an inline value.
fn cell_value(cell: &Cell) -> SimpleExpr {
    match cell {
        Cell::Null => SimpleExpr::Keyword(Keyword::Null),
        Cell::Integer(v) => SimpleExpr::Value((*v).into()),
        Cell::Float(v) => SimpleExpr::Value((*v).into()),
        Cell::Date(d) => SimpleExpr::Value((*d).into()),
        Cell::Text(s) => SimpleExpr::Value(s.as_str().into()),
    }
}
