pub mod app;
pub mod bundle;
pub mod cache;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod geo;
pub mod markers;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod results;
pub mod selection;
pub mod stats;
pub mod store;
pub mod table;
pub mod vector;
