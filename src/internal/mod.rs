//! Internal layer exports for the object store, commit builders, configuration, deploy notifier, artifact service, and transcript rendering.

pub mod builder;
pub mod config;
pub mod notify;
pub mod service;
pub mod store;
pub mod transcript;
