use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::db::{Connection, InsertStatement};
use crate::error::{InsertError, LoadError};
use crate::normalize::NormalizedBatch;

/// Result of loading one batch; the run loop commits to its next state on it
#[derive(Debug)]
pub enum BatchOutcome {
    Committed { rows: u64, duration: Duration },
    RolledBack { error: LoadError },
}

/// Insert one batch inside its own transaction
///
/// Commits when every statement succeeds. Any failure rolls the whole batch
/// back, so the table never holds part of a batch.
pub async fn load_batch(
    conn: &mut Connection,
    statement: &InsertStatement,
    batch: &NormalizedBatch,
) -> BatchOutcome {
    let start = Instant::now();
    let to_error = |source: InsertError| LoadError::Insertion {
        batch: batch.index,
        source,
    };

    let mut tx = match conn.begin().await {
        Ok(tx) => tx,
        Err(e) => {
            return BatchOutcome::RolledBack {
                error: to_error(e.into()),
            };
        }
    };

    match tx.insert(statement, &batch.rows).await {
        Ok(rows) => match tx.commit().await {
            Ok(()) => {
                let duration = start.elapsed();
                debug!(
                    batch = batch.index,
                    rows,
                    duration_ms = duration.as_millis() as u64,
                    "Batch committed"
                );
                BatchOutcome::Committed { rows, duration }
            }
            Err(e) => BatchOutcome::RolledBack {
                error: to_error(e.into()),
            },
        },
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(batch = batch.index, "Rollback failed: {:#}", rollback_err);
            }
            BatchOutcome::RolledBack { error: to_error(e) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Column, ConnectionTarget, Schema, SemanticType, connect};
    use crate::normalize::{Row, Value};
    use tempfile::TempDir;

    fn schema() -> Schema {
        Schema::new(vec![
            Column {
                name: "year",
                semantic_type: SemanticType::Integer,
            },
            Column {
                name: "origin",
                semantic_type: SemanticType::Text,
            },
        ])
    }

    fn row(year: Option<i64>, origin: &str) -> Row {
        Row::new(vec![
            Value::Integer(year),
            Value::Text(Some(origin.to_string())),
        ])
    }

    async fn setup(dir: &TempDir) -> Connection {
        let mut conn = connect(&ConnectionTarget::Sqlite {
            path: dir.path().join("batch.db"),
        })
        .await
        .unwrap();
        let mut tx = conn.begin().await.unwrap();
        tx.execute("CREATE TABLE flights (year INTEGER NOT NULL, origin TEXT)")
            .await
            .unwrap();
        tx.commit().await.unwrap();
        conn
    }

    #[tokio::test]
    async fn test_batch_commits_all_rows() {
        let dir = TempDir::new().unwrap();
        let mut conn = setup(&dir).await;
        let statement = InsertStatement::new(conn.dialect(), "flights", &schema());

        let batch = NormalizedBatch {
            index: 1,
            rows: (0..20_000).map(|i| row(Some(2000 + i % 25), "JFK")).collect(),
        };
        // More rows than fit in one statement
        assert!(batch.len() > statement.rows_per_statement());

        match load_batch(&mut conn, &statement, &batch).await {
            BatchOutcome::Committed { rows, .. } => assert_eq!(rows, 20_000),
            BatchOutcome::RolledBack { error } => panic!("unexpected rollback: {error}"),
        }
        assert_eq!(conn.count_rows("flights").await.unwrap(), 20_000);
        conn.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let mut conn = setup(&dir).await;
        let statement = InsertStatement::new(conn.dialect(), "flights", &schema());

        // The violating row sits in a later statement than the first chunk
        let mut rows: Vec<Row> = (0..17_000).map(|_| row(Some(2024), "LAX")).collect();
        rows.push(row(None, "ORD"));
        let batch = NormalizedBatch { index: 4, rows };

        match load_batch(&mut conn, &statement, &batch).await {
            BatchOutcome::RolledBack {
                error: LoadError::Insertion { batch, .. },
            } => assert_eq!(batch, 4),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(conn.count_rows("flights").await.unwrap(), 0);
        conn.close().await.unwrap();
    }
}
