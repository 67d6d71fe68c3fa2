//! Store bundle ingestion pipeline.

pub mod coordinator;
pub mod fetch;
pub mod image;
pub mod unpack;
