use tracing::{debug, info};

use crate::db::{Connection, Schema};
use crate::error::LoadError;

/// What the pre-load step did to the target table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreparedTable {
    /// `CREATE TABLE IF NOT EXISTS` was issued
    pub create_issued: bool,
    /// An existing table was emptied
    pub cleared: bool,
}

/// Create and/or empty the target table in a transaction of its own
///
/// Runs once before the first batch. A missing table is not an error when
/// truncating; nothing is cleared in that case.
pub async fn prepare_table(
    conn: &mut Connection,
    table_name: &str,
    schema: &Schema,
    truncate: bool,
    create_if_missing: bool,
) -> Result<PreparedTable, LoadError> {
    let to_error = |source: sqlx::Error| LoadError::TablePreparation {
        table: table_name.to_string(),
        source,
    };

    if !truncate && !create_if_missing {
        debug!(table = table_name, "Table preparation skipped");
        return Ok(PreparedTable::default());
    }

    let dialect = conn.dialect();
    let mut tx = conn.begin().await.map_err(to_error)?;
    let mut prepared = PreparedTable::default();

    if create_if_missing {
        let ddl = schema.generate_ddl(table_name, dialect);
        debug!(table = table_name, "Executing DDL: {}", ddl);
        tx.execute(&ddl).await.map_err(to_error)?;
        prepared.create_issued = true;
    }

    if truncate {
        prepared.cleared = tx.clear_table_if_exists(table_name).await.map_err(to_error)?;
        if !prepared.cleared {
            info!(table = table_name, "Target table does not exist, nothing to truncate");
        }
    }

    // An error above drops the transaction, which rolls it back
    tx.commit().await.map_err(to_error)?;

    info!(
        table = table_name,
        created = prepared.create_issued,
        cleared = prepared.cleared,
        "Target table prepared"
    );
    Ok(prepared)
}
