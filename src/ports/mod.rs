pub mod row_source;
