//! Pipeline error taxonomy.
//!
//! Every stage reports failures through [`PipelineError`], carrying the
//! table, chart, or operation that failed alongside the underlying cause.

use std::fmt;
use std::path::PathBuf;

/// Pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Load,
    Aggregate,
    Render,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Connect => write!(f, "connect"),
            Stage::Load => write!(f, "load"),
            Stage::Aggregate => write!(f, "aggregate"),
            Stage::Render => write!(f, "render"),
        }
    }
}

/// Errors raised by the pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Failed to read {table} from {}: {source}", path.display())]
    Io {
        table: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed input for {table}: {reason}")]
    Schema { table: String, reason: String },

    #[error("Query failed during {stage} ({operation}): {source}")]
    Query {
        stage: Stage,
        operation: String,
        #[source]
        source: sqlx::Error,
    },

    /// Query-stage failure for a source table that does not exist.
    #[error("Query failed during aggregate: missing source table '{table}' (did the load stage complete?)")]
    MissingSource { table: String },

    #[error("Chart '{chart}' not rendered: {reason}")]
    Render { chart: String, reason: String },

    #[error("Cannot connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl PipelineError {
    /// Stage the error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Io { .. } | PipelineError::Schema { .. } => Stage::Load,
            PipelineError::Query { stage, .. } => *stage,
            PipelineError::MissingSource { .. } => Stage::Aggregate,
            PipelineError::Render { .. } => Stage::Render,
            PipelineError::Connection { .. } | PipelineError::Config(_) => Stage::Connect,
        }
    }

    pub(crate) fn schema(table: &str, reason: impl Into<String>) -> Self {
        PipelineError::Schema {
            table: table.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn render(chart: &str, reason: impl fmt::Display) -> Self {
        PipelineError::Render {
            chart: chart.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns a closure wrapping a store error with its stage and operation.
    pub(crate) fn query(stage: Stage, operation: &str) -> impl FnOnce(sqlx::Error) -> Self + '_ {
        move |source| PipelineError::Query {
            stage,
            operation: operation.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_mapping() {
        assert_eq!(PipelineError::schema("customers", "bad").stage(), Stage::Load);
        assert_eq!(
            PipelineError::render("top_products", "empty").stage(),
            Stage::Render
        );
        assert_eq!(
            PipelineError::MissingSource {
                table: "transactions".to_string()
            }
            .stage(),
            Stage::Aggregate
        );
        let err = PipelineError::query(Stage::Render, "fetch top_products")(sqlx::Error::RowNotFound);
        assert_eq!(err.stage(), Stage::Render);
    }

    #[test]
    fn test_messages_carry_context() {
        let err = PipelineError::Io {
            table: "products".to_string(),
            path: PathBuf::from("data/raw/products.csv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        let msg = err.to_string();
        assert!(msg.contains("products"));
        assert!(msg.contains("data/raw/products.csv"));

        let err = PipelineError::query(Stage::Aggregate, "create customer_sales")(
            sqlx::Error::RowNotFound,
        );
        assert!(err.to_string().contains("create customer_sales"));
        assert!(err.to_string().contains("aggregate"));
    }
}
