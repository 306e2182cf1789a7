pub mod db;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod query;
