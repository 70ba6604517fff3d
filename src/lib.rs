//! Import and export of feed subscriptions.
//!
//! OPML documents and the reader service's subscription and starred-item
//! exports are resolved against a local SQLite store of canonical feeds,
//! per-user subscriptions and per-user folder trees.

pub mod config;
pub mod feed;
pub mod import;
pub mod reader;
pub mod storage;
pub mod util;
