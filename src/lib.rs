//! Vehicle registry service: enriches submitted registration numbers via an
//! external lookup, persists vehicles with their owners, and serves filtered
//! listings, sparse patches and deletes over HTTP.

pub mod config;
pub mod db;
pub mod http;
pub mod ingest;
pub mod lookup;
pub mod model;
