//! Delimited source file reading

pub mod reader;

pub use reader::{Cell, DelimitedConfig, Header, SourceBatch, SourceReader, SourceRecord, parse_date};
