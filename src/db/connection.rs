//! Single-connection adapter over the sqlx Postgres and SQLite drivers.
use sqlx::postgres::{PgConnectOptions, PgConnection, PgSslMode};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection as _};
use std::fmt;
use std::path::PathBuf;

use super::insert::{InsertStatement, bind_row};
use crate::config::{
    CONNECT_TIMEOUT, INSERT_TIMEOUT, POSTGRES_MAX_BIND_PARAMS, SQLITE_MAX_BIND_PARAMS,
};
use crate::error::{InsertError, LoadError};
use crate::normalize::Row;

/// SQL flavour spoken by the target store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Quote an identifier, doubling any embedded quote characters
    pub fn quote_identifier(self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quote a table name, optionally schema-qualified as `schema.table`
    ///
    /// Each dot-separated part is quoted on its own, so table names themselves
    /// cannot contain a dot.
    pub fn quote_table(self, name: &str) -> String {
        name.split('.')
            .map(|part| self.quote_identifier(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Positional placeholder for the 1-based parameter index
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::Sqlite => "?".to_string(),
        }
    }

    pub fn max_bind_params(self) -> usize {
        match self {
            Dialect::Postgres => POSTGRES_MAX_BIND_PARAMS,
            Dialect::Sqlite => SQLITE_MAX_BIND_PARAMS,
        }
    }

    /// Statement that empties an existing table
    fn clear_table_sql(self, quoted_table: &str) -> String {
        match self {
            Dialect::Postgres => format!("TRUNCATE TABLE {}", quoted_table),
            Dialect::Sqlite => format!("DELETE FROM {}", quoted_table),
        }
    }
}

/// How the loader authenticates against a PostgreSQL server
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// No password; relies on server-side trust/peer auth as the ambient user
    Trusted,
    Credentials { username: String, password: String },
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Trusted => f.write_str("Trusted"),
            AuthMode::Credentials { username, .. } => f
                .debug_struct("Credentials")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Where the target table lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Postgres {
        host: String,
        port: u16,
        database: String,
        auth: AuthMode,
    },
    Sqlite {
        path: PathBuf,
    },
}

impl ConnectionTarget {
    pub fn dialect(&self) -> Dialect {
        match self {
            ConnectionTarget::Postgres { .. } => Dialect::Postgres,
            ConnectionTarget::Sqlite { .. } => Dialect::Sqlite,
        }
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionTarget::Postgres {
                host,
                port,
                database,
                auth,
            } => {
                let mode = match auth {
                    AuthMode::Trusted => "trusted",
                    AuthMode::Credentials { .. } => "credentialed",
                };
                write!(f, "postgres://{}:{}/{} ({})", host, port, database, mode)
            }
            ConnectionTarget::Sqlite { path } => write!(f, "sqlite:{}", path.display()),
        }
    }
}

/// The one open connection owned by a load run
pub enum Connection {
    Postgres(PgConnection),
    Sqlite(SqliteConnection),
}

/// Open a connection to the target store
pub async fn connect(target: &ConnectionTarget) -> Result<Connection, LoadError> {
    let attempt = match target {
        ConnectionTarget::Postgres {
            host,
            port,
            database,
            auth,
        } => {
            let mut options = PgConnectOptions::new()
                .host(host)
                .port(*port)
                .database(database)
                .ssl_mode(PgSslMode::Prefer);
            if let AuthMode::Credentials { username, password } = auth {
                options = options.username(username).password(password);
            }
            tokio::time::timeout(CONNECT_TIMEOUT, options.connect())
                .await
                .map(|result| result.map(Connection::Postgres))
        }
        ConnectionTarget::Sqlite { path } => {
            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);
            tokio::time::timeout(CONNECT_TIMEOUT, options.connect())
                .await
                .map(|result| result.map(Connection::Sqlite))
        }
    };

    match attempt {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(source)) => Err(LoadError::Connection {
            target: target.to_string(),
            source,
        }),
        Err(_) => Err(LoadError::ConnectTimeout {
            target: target.to_string(),
            after: CONNECT_TIMEOUT,
        }),
    }
}

impl Connection {
    pub fn dialect(&self) -> Dialect {
        match self {
            Connection::Postgres(_) => Dialect::Postgres,
            Connection::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Begin an explicit transaction; it is rolled back if dropped unfinished
    pub async fn begin(&mut self) -> Result<DbTransaction<'_>, sqlx::Error> {
        Ok(match self {
            Connection::Postgres(conn) => DbTransaction::Postgres(conn.begin().await?),
            Connection::Sqlite(conn) => DbTransaction::Sqlite(conn.begin().await?),
        })
    }

    /// Number of rows currently stored in the table
    pub async fn count_rows(&mut self, table_name: &str) -> Result<i64, sqlx::Error> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}",
            self.dialect().quote_table(table_name)
        );
        match self {
            Connection::Postgres(conn) => sqlx::query_scalar(&sql).fetch_one(conn).await,
            Connection::Sqlite(conn) => sqlx::query_scalar(&sql).fetch_one(conn).await,
        }
    }

    /// Close the connection gracefully
    pub async fn close(self) -> Result<(), sqlx::Error> {
        match self {
            Connection::Postgres(conn) => conn.close().await,
            Connection::Sqlite(conn) => conn.close().await,
        }
    }
}

/// An open transaction on either backend
pub enum DbTransaction<'c> {
    Postgres(sqlx::Transaction<'c, sqlx::Postgres>),
    Sqlite(sqlx::Transaction<'c, sqlx::Sqlite>),
}

impl DbTransaction<'_> {
    fn dialect(&self) -> Dialect {
        match self {
            DbTransaction::Postgres(_) => Dialect::Postgres,
            DbTransaction::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Execute a statement without parameters (DDL)
    pub async fn execute(&mut self, sql: &str) -> Result<(), sqlx::Error> {
        match self {
            DbTransaction::Postgres(tx) => {
                sqlx::query(sql).execute(&mut **tx).await?;
            }
            DbTransaction::Sqlite(tx) => {
                sqlx::query(sql).execute(&mut **tx).await?;
            }
        }
        Ok(())
    }

    /// Check whether a table exists in the connected database
    pub async fn table_exists(&mut self, table_name: &str) -> Result<bool, sqlx::Error> {
        match self {
            DbTransaction::Postgres(tx) => {
                // to_regclass resolves against the search_path and yields NULL when absent
                let quoted = Dialect::Postgres.quote_table(table_name);
                sqlx::query_scalar::<_, bool>("SELECT to_regclass($1) IS NOT NULL")
                    .bind(quoted)
                    .fetch_one(&mut **tx)
                    .await
            }
            DbTransaction::Sqlite(tx) => {
                // Qualified names look up the catalog of the attached database
                let (catalog, name) = match table_name.rsplit_once('.') {
                    Some((database, name)) => (
                        format!("{}.sqlite_master", Dialect::Sqlite.quote_identifier(database)),
                        name,
                    ),
                    None => ("sqlite_master".to_string(), table_name),
                };
                let sql = format!(
                    "SELECT COUNT(*) FROM {} WHERE type = 'table' AND name = ?",
                    catalog
                );
                let count: i64 = sqlx::query_scalar::<sqlx::Sqlite, i64>(&sql)
                    .bind(name)
                    .fetch_one(&mut **tx)
                    .await?;
                Ok(count > 0)
            }
        }
    }

    /// Empty the table if it exists. Returns false when there was no table to clear.
    pub async fn clear_table_if_exists(&mut self, table_name: &str) -> Result<bool, sqlx::Error> {
        if !self.table_exists(table_name).await? {
            return Ok(false);
        }
        let dialect = self.dialect();
        let sql = dialect.clear_table_sql(&dialect.quote_table(table_name));
        self.execute(&sql).await?;
        Ok(true)
    }

    /// Insert rows with as few multi-row statements as the bind limit allows
    ///
    /// Every statement runs inside this transaction, so a failure part-way
    /// through leaves nothing behind once the caller rolls back.
    pub async fn insert(
        &mut self,
        statement: &InsertStatement,
        rows: &[Row],
    ) -> Result<u64, InsertError> {
        let mut rows_affected = 0u64;

        for chunk in rows.chunks(statement.rows_per_statement()) {
            let sql = statement.sql_for(chunk.len());

            let executed = match self {
                DbTransaction::Postgres(tx) => {
                    let mut query = sqlx::query::<sqlx::Postgres>(&sql);
                    for row in chunk {
                        query = bind_row(query, row);
                    }
                    tokio::time::timeout(INSERT_TIMEOUT, query.execute(&mut **tx))
                        .await
                        .map(|result| result.map(|r| r.rows_affected()))
                }
                DbTransaction::Sqlite(tx) => {
                    let mut query = sqlx::query::<sqlx::Sqlite>(&sql);
                    for row in chunk {
                        query = bind_row(query, row);
                    }
                    tokio::time::timeout(INSERT_TIMEOUT, query.execute(&mut **tx))
                        .await
                        .map(|result| result.map(|r| r.rows_affected()))
                }
            };

            match executed {
                Ok(Ok(count)) => rows_affected += count,
                Ok(Err(e)) => return Err(InsertError::Database(e)),
                Err(_) => return Err(InsertError::TimedOut(INSERT_TIMEOUT)),
            }
        }

        Ok(rows_affected)
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        match self {
            DbTransaction::Postgres(tx) => tx.commit().await,
            DbTransaction::Sqlite(tx) => tx.commit().await,
        }
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        match self {
            DbTransaction::Postgres(tx) => tx.rollback().await,
            DbTransaction::Sqlite(tx) => tx.rollback().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(1), "$1");
        assert_eq!(Dialect::Postgres.placeholder(35), "$35");
        assert_eq!(Dialect::Sqlite.placeholder(7), "?");
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(Dialect::Postgres.quote_identifier("flights"), "\"flights\"");
        assert_eq!(Dialect::Sqlite.quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_table_splits_schema() {
        assert_eq!(Dialect::Postgres.quote_table("flights"), "\"flights\"");
        assert_eq!(
            Dialect::Postgres.quote_table("public.flights"),
            "\"public\".\"flights\""
        );
        assert_eq!(Dialect::Sqlite.quote_table("main.we\"ird"), "\"main\".\"we\"\"ird\"");
    }

    #[test]
    fn test_target_display_hides_password() {
        let target = ConnectionTarget::Postgres {
            host: "db.local".to_string(),
            port: 5432,
            database: "FlightAnalytics2024".to_string(),
            auth: AuthMode::Credentials {
                username: "loader".to_string(),
                password: "hunter2".to_string(),
            },
        };

        let shown = target.to_string();
        assert_eq!(shown, "postgres://db.local:5432/FlightAnalytics2024 (credentialed)");
        assert!(!format!("{:?}", target).contains("hunter2"));
        assert_eq!(target.dialect(), Dialect::Postgres);
    }

    #[tokio::test]
    async fn test_sqlite_clear_missing_table_is_noop() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = ConnectionTarget::Sqlite {
            path: dir.path().join("prep.db"),
        };
        let mut conn = connect(&target).await.unwrap();

        let mut tx = conn.begin().await.unwrap();
        assert!(!tx.clear_table_if_exists("absent").await.unwrap());
        tx.execute("CREATE TABLE present (id INTEGER)").await.unwrap();
        tx.execute("INSERT INTO present VALUES (1), (2)").await.unwrap();
        assert!(tx.clear_table_if_exists("present").await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(conn.count_rows("present").await.unwrap(), 0);
        conn.close().await.unwrap();
    }
}
