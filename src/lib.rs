pub mod aggregator;
pub mod alert;
pub mod app;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod query;
pub mod redis;
pub mod scheduler;
pub mod scoring;
pub mod store;
pub mod stream;
