//! Scrape engine for the OpenLDAP Prometheus exporter.
//!
//! One [`Scraper`] owns the directory connection seam, the fixed query
//! catalog, and the per-tick error-aggregation policy. Every tick opens one
//! connection, runs the catalog in order, and folds the outcome into the
//! scrape-result counter; nothing here ever propagates an error to the
//! scheduler.

#![deny(missing_docs)]

mod catalog;
mod client;
mod scraper;

pub use catalog::{MonitorQuery, QueryCatalog, MONITOR_BASE_DN, OPERATIONS_BASE_DN};
pub use client::DirectoryEntry;
pub use scraper::{ScrapeFailure, ScrapeFailures, Scraper};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = ldap_exporter_core::Result<T>;
