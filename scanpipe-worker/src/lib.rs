//! scanpipe-worker library - page processing process
//!
//! Watches the request store's upload directory and runs each new request
//! through load → layout analysis → caption enrichment → persistence,
//! collapsing every failure mode to the single error marker.

pub mod captions;
pub mod engine;
pub mod jpeg;
pub mod loader;
pub mod music;
pub mod processor;
pub mod watcher;
