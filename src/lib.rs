//! layerconf: layered, periodically refreshed configuration (library crate).
//!
//! Values come from locations (files, `classpath:` resources, HTTP URLs)
//! and SQL queries. Each source polls on its own fixed-delay schedule;
//! sources are stacked in a composite where the first added wins, and the
//! result is installed exactly once per [`store::StoreCell`].
//!
//! Re-exports public modules for integration tests and external use.

pub mod config;
pub mod constants;
pub mod descriptor;
pub mod engine;
pub mod env;
pub mod logging;
pub mod placeholder;
pub mod policy;
pub mod schedule;
pub mod source;
pub mod store;

pub use engine::{AggregationError, Aggregator, DescriptorInput};
pub use store::{ActiveConfiguration, AlreadyConfigured, StoreCell};
