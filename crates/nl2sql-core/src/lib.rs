pub mod cache;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod fewshot;
pub mod generator;
pub mod insights;
pub mod metrics_api;
pub mod model;
pub mod on_error;
pub mod providers;
pub mod report;
pub mod retry;
pub mod sql;
pub mod storage;
pub mod table;
