use chrono::NaiveDate;
use sqlx::query::Query;
use sqlx::{Database, Encode, Type};

use super::connection::Dialect;
use super::schema::Schema;
use crate::normalize::{Row, Value};

/// Multi-row parameterized INSERT for the target table
///
/// Builds `INSERT INTO t (c1, .., cn) VALUES (?, .., ?), (?, .., ?), ...` with one
/// positional placeholder per column per row, capped so a single statement never
/// exceeds the backend's bind parameter limit.
#[derive(Debug, Clone)]
pub struct InsertStatement {
    dialect: Dialect,
    prefix: String,
    column_count: usize,
    rows_per_statement: usize,
    full_sql: String,
}

impl InsertStatement {
    pub fn new(dialect: Dialect, table_name: &str, schema: &Schema) -> Self {
        let prefix = format!(
            "INSERT INTO {} ({}) VALUES ",
            dialect.quote_table(table_name),
            schema.column_list(dialect)
        );
        let column_count = schema.len().max(1);
        let rows_per_statement = (dialect.max_bind_params() / column_count).max(1);

        let mut statement = Self {
            dialect,
            prefix,
            column_count,
            rows_per_statement,
            full_sql: String::new(),
        };
        statement.full_sql = statement.build(rows_per_statement);
        statement
    }

    /// Maximum rows bound into one statement
    pub fn rows_per_statement(&self) -> usize {
        self.rows_per_statement
    }

    /// SQL text for a statement inserting `row_count` rows
    pub fn sql_for(&self, row_count: usize) -> String {
        if row_count == self.rows_per_statement {
            self.full_sql.clone()
        } else {
            self.build(row_count)
        }
    }

    fn build(&self, row_count: usize) -> String {
        let mut value_groups = Vec::with_capacity(row_count);
        let mut param_idx = 1;

        for _ in 0..row_count {
            let placeholders: Vec<String> = (0..self.column_count)
                .map(|_| {
                    let placeholder = self.dialect.placeholder(param_idx);
                    param_idx += 1;
                    placeholder
                })
                .collect();
            value_groups.push(format!("({})", placeholders.join(", ")));
        }

        format!("{}{}", self.prefix, value_groups.join(", "))
    }
}

/// Bind every value of a normalized row, in schema order, with its typed NULL
pub fn bind_row<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    row: &Row,
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    i16: Encode<'q, DB> + Type<DB>,
    Option<i64>: Encode<'q, DB> + Type<DB>,
    Option<f64>: Encode<'q, DB> + Type<DB>,
    Option<String>: Encode<'q, DB> + Type<DB>,
    Option<NaiveDate>: Encode<'q, DB> + Type<DB>,
{
    for value in row.values() {
        query = match value {
            Value::Integer(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Bit(v) => query.bind(i16::from(*v)),
            Value::Text(v) => query.bind(v.clone()),
            Value::Date(v) => query.bind(*v),
        };
    }
    query
}
