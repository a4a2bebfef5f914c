mod duckdb;

pub use duckdb::*;
