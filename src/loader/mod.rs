//! Bulk loading of delimited source files into the store.
//!
//! Files are parsed in parallel; the tables are then replaced
//! (drop + create + insert) inside one transaction, so a bad file leaves the
//! store untouched.

pub mod reader;

pub use reader::read_table;

use crate::error::{PipelineError, Result, Stage};
use crate::models::{LoadedTable, Table};
use crate::store::{Backend, Store};
use futures::future::try_join_all;
use indicatif::{ProgressBar, ProgressStyle};
use sqlx::{Any, Transaction};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Options for the load stage.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub delimiter: u8,
    /// Rows per INSERT statement.
    pub batch_size: usize,
    pub show_progress: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            batch_size: 500,
            show_progress: false,
        }
    }
}

impl From<&crate::config::LoaderConfig> for LoadOptions {
    fn from(config: &crate::config::LoaderConfig) -> Self {
        Self {
            delimiter: config.delimiter as u8,
            batch_size: config.batch_size.max(1),
            show_progress: false,
        }
    }
}

/// Load every `(table, path)` source, replacing existing tables.
pub async fn load_sources(
    store: &Store,
    sources: &BTreeMap<String, PathBuf>,
    options: &LoadOptions,
) -> Result<Vec<LoadedTable>> {
    let spinner = if options.show_progress {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap(),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Parsing {} files...", sources.len()));
        Some(pb)
    } else {
        None
    };

    let parses = sources.iter().map(|(table, path)| {
        let table = table.clone();
        let path = path.clone();
        let delimiter = options.delimiter;
        async move {
            tokio::task::spawn_blocking(move || read_table(&table, &path, delimiter))
                .await
                .map_err(|e| PipelineError::schema("loader", format!("parse task failed: {}", e)))?
        }
    });
    let tables = try_join_all(parses).await?;

    if let Some(ref pb) = spinner {
        pb.set_message("Writing tables...");
    }

    let mut tx = store.begin(Stage::Load).await?;
    let mut loaded = Vec::with_capacity(tables.len());
    for table in &tables {
        if let Err(e) = replace_table(&mut tx, store.backend(), table, options.batch_size).await {
            if let Err(rollback) = tx.rollback().await {
                warn!("Rollback of load batch failed: {}", rollback);
            }
            return Err(e);
        }
        let source = sources
            .get(&table.name)
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        loaded.push(LoadedTable {
            table: table.name.clone(),
            source,
            rows: table.row_count(),
            columns: table.columns.clone(),
        });
    }
    tx.commit()
        .await
        .map_err(PipelineError::query(Stage::Load, "commit load batch"))?;

    for table in &loaded {
        let persisted = store.count_rows(Stage::Load, &table.table).await?;
        if persisted != table.rows as i64 {
            warn!(
                "{} holds {} rows but {} were parsed from {}",
                table.table, persisted, table.rows, table.source
            );
        }
        info!("Loaded {} rows into {}", persisted, table.table);
    }

    if let Some(pb) = spinner {
        pb.finish_with_message(format!("Loaded {} tables", loaded.len()));
    }

    Ok(loaded)
}

/// Drop and recreate `table.name`, then insert every row.
pub async fn replace_table(
    tx: &mut Transaction<'static, Any>,
    backend: Backend,
    table: &Table,
    batch_size: usize,
) -> Result<()> {
    let drop_op = format!("drop {}", table.name);
    sqlx::query(&backend.drop_table(&table.name))
        .execute(&mut **tx)
        .await
        .map_err(PipelineError::query(Stage::Load, &drop_op))?;

    let create_op = format!("create {}", table.name);
    sqlx::query(&backend.create_table(table))
        .execute(&mut **tx)
        .await
        .map_err(PipelineError::query(Stage::Load, &create_op))?;

    let insert_op = format!("insert into {}", table.name);
    for chunk in table.rows.chunks(batch_size.max(1)) {
        let sql = backend
            .insert_rows(table, chunk)
            .map_err(|e| PipelineError::schema(&table.name, e.to_string()))?;
        sqlx::query(&sql)
            .execute(&mut **tx)
            .await
            .map_err(PipelineError::query(Stage::Load, &insert_op))?;
    }

    debug!("Replaced table {} ({} rows)", table.name, table.row_count());
    Ok(())
}
