//! Utilities module aggregator exposing HTTP client and path helpers.

pub mod http;
pub mod path;
