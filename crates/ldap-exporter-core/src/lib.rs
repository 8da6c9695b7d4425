//! # ldap-exporter-core
//!
//! Core types for the OpenLDAP Prometheus exporter.
//!
//! This crate provides the pieces shared by the scraper and the HTTP surface:
//!
//! - [`error`] - Error taxonomy and result alias
//! - [`addr`] - Directory address resolution (`ldap://`, `ldaps://`, `ldapi://`)
//! - [`config`] - Connection configuration and CA trust loading
//! - [`metrics`] - The exported metric families and their registry

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod addr;
pub mod config;
pub mod error;
pub mod metrics;

// Re-export commonly used types
pub use error::{Error, Result};
