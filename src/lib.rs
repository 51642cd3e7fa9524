pub mod config;
pub mod db;
pub mod indexer;
pub mod pipeline;
pub mod watermark;
