//! The exported metric families.
//!
//! One explicitly constructed [`LdapMetrics`] instance is shared between the
//! scraper (which writes it) and the HTTP surface (which reads a snapshot);
//! the registry serializes concurrent access internally.

use crate::Result;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

const SUBSYSTEM: &str = "ldap";

/// Scrape-result counter label for a fully successful tick.
pub const RESULT_OK: &str = "ok";
/// Scrape-result counter label for a failed tick.
pub const RESULT_FAIL: &str = "fail";
/// Scrape-result counter label for a tick that hit the server time limit.
pub const RESULT_TIMEOUT: &str = "timeout";

/// Registry and metric families exported by the scraper.
#[derive(Clone)]
pub struct LdapMetrics {
    registry: Registry,
    monitored_object: GaugeVec,
    monitor_counter_object: GaugeVec,
    monitor_operation: GaugeVec,
    posix_account_count: GaugeVec,
    posix_account_query_duration: GaugeVec,
    scrape: IntCounterVec,
}

impl LdapMetrics {
    /// Creates the registry and registers every exported family.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Metrics`] if a family fails to register.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let monitored_object = GaugeVec::new(
            Opts::new(
                "monitored_object",
                "cn=Monitor (objectClass=monitoredObject) monitoredInfo",
            )
            .subsystem(SUBSYSTEM),
            &["dn"],
        )?;
        let monitor_counter_object = GaugeVec::new(
            Opts::new(
                "monitor_counter_object",
                "cn=Monitor (objectClass=monitorCounterObject) monitorCounter",
            )
            .subsystem(SUBSYSTEM),
            &["dn"],
        )?;
        let monitor_operation = GaugeVec::new(
            Opts::new(
                "monitor_operation",
                "cn=Operations,cn=Monitor (objectClass=monitorOperation) monitorOpCompleted",
            )
            .subsystem(SUBSYSTEM),
            &["dn"],
        )?;
        let posix_account_count = GaugeVec::new(
            Opts::new("posix_account_count", "(objectClass=posixAccount) count")
                .subsystem(SUBSYSTEM),
            &["dn"],
        )?;
        let posix_account_query_duration = GaugeVec::new(
            Opts::new(
                "posix_account_query_duration",
                "(objectClass=posixAccount) query duration in nanoseconds",
            )
            .subsystem(SUBSYSTEM),
            &["dn"],
        )?;
        let scrape = IntCounterVec::new(
            Opts::new("scrape", "successful vs unsuccessful ldap scrape attempts")
                .subsystem(SUBSYSTEM),
            &["result"],
        )?;

        registry.register(Box::new(monitored_object.clone()))?;
        registry.register(Box::new(monitor_counter_object.clone()))?;
        registry.register(Box::new(monitor_operation.clone()))?;
        registry.register(Box::new(posix_account_count.clone()))?;
        registry.register(Box::new(posix_account_query_duration.clone()))?;
        registry.register(Box::new(scrape.clone()))?;

        Ok(Self {
            registry,
            monitored_object,
            monitor_counter_object,
            monitor_operation,
            posix_account_count,
            posix_account_query_duration,
            scrape,
        })
    }

    /// Per-entry gauge for `monitoredObject` entries, labeled by DN.
    #[must_use]
    pub const fn monitored_object(&self) -> &GaugeVec {
        &self.monitored_object
    }

    /// Per-entry gauge for `monitorCounterObject` entries, labeled by DN.
    #[must_use]
    pub const fn monitor_counter_object(&self) -> &GaugeVec {
        &self.monitor_counter_object
    }

    /// Per-entry gauge for `monitorOperation` entries, labeled by DN.
    #[must_use]
    pub const fn monitor_operation(&self) -> &GaugeVec {
        &self.monitor_operation
    }

    /// posixAccount entry count, labeled by search base DN.
    #[must_use]
    pub const fn posix_account_count(&self) -> &GaugeVec {
        &self.posix_account_count
    }

    /// posixAccount query wall-clock duration in nanoseconds, labeled by
    /// search base DN.
    #[must_use]
    pub const fn posix_account_query_duration(&self) -> &GaugeVec {
        &self.posix_account_query_duration
    }

    /// Scrape outcome counter, labeled `ok`, `fail`, or `timeout`.
    #[must_use]
    pub const fn scrape(&self) -> &IntCounterVec {
        &self.scrape
    }

    /// Gathers the current snapshot of every registered family.
    #[must_use]
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Encodes the current snapshot in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Metrics`] if encoding fails.
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|err| crate::Error::Metrics(err.to_string()))
    }
}
