pub mod connection_manager;
pub mod extraction_adapter;
pub mod sql;
