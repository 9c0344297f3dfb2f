//! Per-batch type normalization
//!
//! Coerces the raw text cells of a source batch into typed, nullable values in
//! schema order. A cell that does not parse as its column's semantic type becomes
//! NULL (bit columns become 0); only a column missing from the batch header is an
//! error.

use chrono::NaiveDate;

use crate::config::NULL_MARKERS;
use crate::db::schema::{Schema, SemanticType};
use crate::error::LoadError;
use crate::formats::{Cell, SourceBatch, parse_date};

/// A typed, nullable value; the variant is the semantic type of its column
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(Option<i64>),
    Float(Option<f64>),
    /// Always 0 or 1
    Bit(u8),
    Text(Option<String>),
    Date(Option<NaiveDate>),
}

impl Value {
    #[cfg(test)]
    pub fn semantic_type(&self) -> SemanticType {
        match self {
            Value::Integer(_) => SemanticType::Integer,
            Value::Float(_) => SemanticType::Float,
            Value::Bit(_) => SemanticType::Bit,
            Value::Text(_) => SemanticType::Text,
            Value::Date(_) => SemanticType::Date,
        }
    }
}

/// One normalized row, values in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }
}

/// A batch ready for insertion
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    /// 1-based position of the batch in the file
    pub index: usize,
    pub rows: Vec<Row>,
}

impl NormalizedBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Project a source batch onto the schema and coerce every cell
pub fn normalize_batch(batch: SourceBatch, schema: &Schema) -> Result<NormalizedBatch, LoadError> {
    // Resolve source positions once per batch; any missing column is a contract violation
    let positions = schema
        .columns()
        .iter()
        .map(|column| {
            batch
                .header
                .position(column.name)
                .ok_or_else(|| LoadError::SchemaMismatch {
                    batch: batch.index,
                    column: column.name.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let rows = batch
        .records
        .iter()
        .map(|record| {
            let values = schema
                .columns()
                .iter()
                .zip(&positions)
                .map(|(column, &pos)| normalize_cell(record.cell(pos), column.semantic_type))
                .collect();
            Row::new(values)
        })
        .collect();

    Ok(NormalizedBatch {
        index: batch.index,
        rows,
    })
}

fn normalize_cell(cell: Option<&Cell>, semantic_type: SemanticType) -> Value {
    match (cell, semantic_type) {
        (Some(Cell::Date(date)), SemanticType::Date) => Value::Date(*date),
        (Some(Cell::Date(_)), other) => null_of(other),
        (Some(Cell::Raw(raw)), SemanticType::Integer) => Value::Integer(parse_integer(raw)),
        (Some(Cell::Raw(raw)), SemanticType::Float) => Value::Float(parse_float(raw)),
        (Some(Cell::Raw(raw)), SemanticType::Bit) => Value::Bit(parse_bit(raw)),
        (Some(Cell::Raw(raw)), SemanticType::Text) => Value::Text(parse_text(raw)),
        (Some(Cell::Raw(raw)), SemanticType::Date) => Value::Date(parse_date(raw)),
        (None, semantic_type) => null_of(semantic_type),
    }
}

/// The value an absent cell takes for a column type
fn null_of(semantic_type: SemanticType) -> Value {
    match semantic_type {
        SemanticType::Integer => Value::Integer(None),
        SemanticType::Float => Value::Float(None),
        SemanticType::Bit => Value::Bit(0),
        SemanticType::Text => Value::Text(None),
        SemanticType::Date => Value::Date(None),
    }
}

pub fn is_null_marker(value: &str) -> bool {
    NULL_MARKERS.contains(&value)
}

/// Parse a finite number; markers, garbage, NaN and infinities yield None
pub fn parse_float(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if is_null_marker(trimmed) {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a whole number; an integral decimal such as `2024.0` is accepted,
/// a fractional one is not
pub fn parse_integer(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(v) = trimmed.parse::<i64>() {
        return Some(v);
    }

    let v = parse_float(trimmed)?;
    // i64::MAX as f64 rounds up to 2^63, which is itself out of range
    if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

/// 1 iff the value parses to exactly one; everything else is 0
pub fn parse_bit(raw: &str) -> u8 {
    match parse_float(raw) {
        Some(v) if v == 1.0 => 1,
        _ => 0,
    }
}

/// Trimmed text; blank and missing-value markers become None
pub fn parse_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if is_null_marker(trimmed) {
        None
    } else {
        Some(trimmed.to_string())
    }
}
