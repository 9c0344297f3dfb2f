use super::connection::Dialect;
use SemanticType::{Bit, Date, Float, Integer, Text};

/// Logical type a column holds after normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Integer,
    Float,
    Bit,
    Text,
    Date,
}

impl SemanticType {
    /// Column type used when the loader creates the target table
    pub fn sql_type(self, dialect: Dialect) -> &'static str {
        match (self, dialect) {
            (SemanticType::Integer, Dialect::Postgres) => "BIGINT",
            (SemanticType::Float, Dialect::Postgres) => "DOUBLE PRECISION",
            (SemanticType::Bit, Dialect::Postgres) => "SMALLINT",
            (SemanticType::Text, Dialect::Postgres) => "TEXT",
            (SemanticType::Date, Dialect::Postgres) => "DATE",
            (SemanticType::Integer, Dialect::Sqlite) => "INTEGER",
            (SemanticType::Float, Dialect::Sqlite) => "REAL",
            (SemanticType::Bit, Dialect::Sqlite) => "INTEGER",
            (SemanticType::Text, Dialect::Sqlite) => "TEXT",
            (SemanticType::Date, Dialect::Sqlite) => "DATE",
        }
    }
}

/// A column of the target table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub semantic_type: SemanticType,
}

const fn col(name: &'static str, semantic_type: SemanticType) -> Column {
    Column {
        name,
        semantic_type,
    }
}

/// Column order of the flight table; must match the target table exactly
const FLIGHT_COLUMNS: &[Column] = &[
    col("year", Integer),
    col("month", Integer),
    col("day_of_month", Integer),
    col("day_of_week", Integer),
    col("fl_date", Date),
    col("op_unique_carrier", Text),
    col("op_carrier_fl_num", Integer),
    col("origin", Text),
    col("origin_city_name", Text),
    col("origin_state_nm", Text),
    col("dest", Text),
    col("dest_city_name", Text),
    col("dest_state_nm", Text),
    col("crs_dep_time", Float),
    col("dep_time", Float),
    col("dep_delay", Float),
    col("taxi_out", Float),
    col("wheels_off", Float),
    col("wheels_on", Float),
    col("taxi_in", Float),
    col("crs_arr_time", Float),
    col("arr_time", Float),
    col("arr_delay", Float),
    col("cancelled", Bit),
    col("cancellation_code", Text),
    col("diverted", Bit),
    col("crs_elapsed_time", Float),
    col("actual_elapsed_time", Float),
    col("air_time", Float),
    col("distance", Float),
    col("carrier_delay", Float),
    col("weather_delay", Float),
    col("nas_delay", Float),
    col("security_delay", Float),
    col("late_aircraft_delay", Float),
];

/// Ordered column list of the target table (the schema descriptor)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// The 35-column flight data table
    pub fn flight_data() -> Self {
        Self::new(FLIGHT_COLUMNS.to_vec())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Indices of the columns with the given semantic type, in schema order
    pub fn indices_of(&self, semantic_type: SemanticType) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.semantic_type == semantic_type)
            .map(|(i, _)| i)
            .collect()
    }

    /// Quoted, comma-separated column list in schema order
    pub fn column_list(&self, dialect: Dialect) -> String {
        self.columns
            .iter()
            .map(|c| dialect.quote_identifier(c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Generate the DDL statement that creates the target table if absent
    pub fn generate_ddl(&self, table_name: &str, dialect: Dialect) -> String {
        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (\n",
            dialect.quote_table(table_name)
        );

        let column_defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                format!(
                    "  {} {}",
                    dialect.quote_identifier(c.name),
                    c.semantic_type.sql_type(dialect)
                )
            })
            .collect();

        ddl.push_str(&column_defs.join(",\n"));
        ddl.push_str("\n)");

        ddl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flight_schema_shape() {
        let schema = Schema::flight_data();

        assert_eq!(schema.len(), 35);
        assert_eq!(schema.columns()[0].name, "year");
        assert_eq!(schema.columns()[4].name, "fl_date");
        assert_eq!(schema.columns()[34].name, "late_aircraft_delay");
        assert_eq!(schema.indices_of(SemanticType::Date), vec![4]);
        assert_eq!(schema.indices_of(SemanticType::Bit), vec![23, 25]);
        assert_eq!(schema.columns()[6].name, "op_carrier_fl_num");
        assert_eq!(schema.columns()[6].semantic_type, SemanticType::Integer);
        assert_eq!(schema.columns()[24].name, "cancellation_code");
        assert_eq!(schema.columns()[24].semantic_type, SemanticType::Text);
    }

    #[test]
    fn test_column_names_are_unique() {
        let schema = Schema::flight_data();
        let mut names: Vec<_> = schema.columns().iter().map(|c| c.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), schema.len());
    }

    #[test]
    fn test_generate_ddl() {
        let schema = Schema::new(vec![
            col("year", SemanticType::Integer),
            col("fl_date", SemanticType::Date),
            col("cancelled", SemanticType::Bit),
            col("distance", SemanticType::Float),
        ]);

        let ddl = schema.generate_ddl("flights", Dialect::Postgres);
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"flights\""));
        // Integers normalize to i64, so the created column must hold 64 bits
        assert!(ddl.contains("\"year\" BIGINT"));
        assert!(ddl.contains("\"fl_date\" DATE"));
        assert!(ddl.contains("\"cancelled\" SMALLINT"));
        assert!(ddl.contains("\"distance\" DOUBLE PRECISION"));

        let ddl = schema.generate_ddl("flights", Dialect::Sqlite);
        assert!(ddl.contains("\"distance\" REAL"));
        assert!(ddl.contains("\"cancelled\" INTEGER"));
        assert!(ddl.contains("\"year\" INTEGER"));

        let ddl = schema.generate_ddl("analytics.flights", Dialect::Postgres);
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"analytics\".\"flights\""));
    }

    #[test]
    fn test_column_list_preserves_order() {
        let schema = Schema::flight_data();
        let list = schema.column_list(Dialect::Sqlite);
        assert!(list.starts_with("\"year\", \"month\", \"day_of_month\""));
        assert!(list.ends_with("\"late_aircraft_delay\""));
    }
}
