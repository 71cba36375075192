//! Ingest clinical trial report pages (and related web pages) into a
//! similarity-searchable chunk store.
//!
//! The pipeline runs fetch, extract, normalize, chunk, embed, and store in
//! sequence per source. Each page gets a stable source key, and re-ingesting
//! a page atomically replaces its stored chunks, so runs are idempotent.
//! Retrieval embeds the query text and ranks stored chunks by cosine
//! similarity.

pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod search;
pub mod store;
