//! The scrape engine.

use crate::catalog::{MonitorQuery, QueryCatalog};
use crate::client::{DirectoryConnector, DirectorySession, Ldap3Connector};
use crate::Result;
use ldap_exporter_core::config::{BindCredentials, LdapConfig};
use ldap_exporter_core::error::Error;
use ldap_exporter_core::metrics::{LdapMetrics, RESULT_FAIL, RESULT_OK, RESULT_TIMEOUT};
use prometheus::IntCounterVec;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// A single failure collected during one scrape tick.
#[derive(Debug)]
pub enum ScrapeFailure {
    /// Opening, upgrading, or authenticating the connection failed; no
    /// queries were attempted.
    Connection(Error),
    /// A catalog query that does not tolerate failure failed.
    Query {
        /// Base DN of the failing query.
        base_dn: String,
        /// The underlying error.
        error: Error,
    },
}

impl ScrapeFailure {
    fn error(&self) -> &Error {
        match self {
            Self::Connection(error) | Self::Query { error, .. } => error,
        }
    }
}

impl fmt::Display for ScrapeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(error) => write!(f, "{error}"),
            Self::Query { base_dn, error } => write!(f, "query `{base_dn}`: {error}"),
        }
    }
}

/// Every failure from one scrape tick, in the order it occurred.
///
/// Built fresh each tick and dropped once it has been folded into the
/// scrape-result counter. Kept as an explicit collection so each failing
/// query stays inspectable.
#[derive(Debug, Default)]
pub struct ScrapeFailures {
    failures: Vec<ScrapeFailure>,
}

impl ScrapeFailures {
    fn connection(error: Error) -> Self {
        Self {
            failures: vec![ScrapeFailure::Connection(error)],
        }
    }

    fn push_query(&mut self, base_dn: impl Into<String>, error: Error) {
        self.failures.push(ScrapeFailure::Query {
            base_dn: base_dn.into(),
            error,
        });
    }

    /// True when no failure was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// The collected failures.
    #[must_use]
    pub fn failures(&self) -> &[ScrapeFailure] {
        &self.failures
    }

    /// True when any failure carries the server-side time-limit result code.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        self.failures
            .iter()
            .any(|failure| failure.error().is_time_limit_exceeded())
    }
}

impl fmt::Display for ScrapeFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, failure) in self.failures.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

/// The scrape engine.
///
/// One connection per tick, the catalog in order, and every outcome folded
/// into the scrape-result counter; the scheduler above never sees an error.
pub struct Scraper {
    connector: Box<dyn DirectoryConnector>,
    catalog: QueryCatalog,
    credentials: Option<BindCredentials>,
    scrape: IntCounterVec,
}

impl Scraper {
    /// Creates a scraper that connects with the ldap3-backed connector.
    #[must_use]
    pub fn new(config: LdapConfig, metrics: &LdapMetrics) -> Self {
        let catalog = QueryCatalog::new(metrics, config.base_dn());
        let credentials = config.credentials().cloned();
        let scrape = metrics.scrape().clone();
        let connector: Box<dyn DirectoryConnector> =
            Box::new(Ldap3Connector::new(Arc::new(config)));
        Self {
            connector,
            catalog,
            credentials,
            scrape,
        }
    }

    #[cfg(test)]
    fn with_connector(
        connector: Box<dyn DirectoryConnector>,
        config: &LdapConfig,
        metrics: &LdapMetrics,
    ) -> Self {
        Self {
            connector,
            catalog: QueryCatalog::new(metrics, config.base_dn()),
            credentials: config.credentials().cloned(),
            scrape: metrics.scrape().clone(),
        }
    }

    /// Runs the fixed-interval scrape loop forever.
    ///
    /// An overrunning scrape delays the next tick; ticks are never queued or
    /// run concurrently.
    pub async fn run(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.scrape_once().await;
        }
    }

    /// Executes one scrape tick.
    ///
    /// Never returns an error: the outcome is exactly one increment of the
    /// scrape-result counter, plus a single log line when the tick failed.
    pub async fn scrape_once(&self) {
        match self.scrape_all().await {
            Ok(()) => {
                self.scrape.with_label_values(&[RESULT_OK]).inc();
            }
            Err(failures) => {
                self.catalog.reset_durations();
                let result = if failures.timed_out() {
                    RESULT_TIMEOUT
                } else {
                    RESULT_FAIL
                };
                warn!(error = %failures, "scrape failed");
                self.scrape.with_label_values(&[result]).inc();
            }
        }
    }

    async fn scrape_all(&self) -> std::result::Result<(), ScrapeFailures> {
        let mut session = self
            .connector
            .connect()
            .await
            .map_err(ScrapeFailures::connection)?;
        let outcome = self.scrape_session(&mut *session).await;
        // The connection is released on every path once it was opened.
        if let Err(error) = session.unbind().await {
            debug!(error = %error, "failed to close directory connection");
        }
        outcome
    }

    async fn scrape_session(
        &self,
        session: &mut dyn DirectorySession,
    ) -> std::result::Result<(), ScrapeFailures> {
        if let Some(credentials) = &self.credentials {
            session
                .simple_bind(credentials.username(), credentials.password())
                .await
                .map_err(ScrapeFailures::connection)?;
        }

        let mut failures = ScrapeFailures::default();
        for query in self.catalog.queries() {
            if let Err(error) = execute_query(session, query).await {
                failures.push_query(query.base_dn.clone(), error);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}

async fn execute_query(session: &mut dyn DirectorySession, query: &MonitorQuery) -> Result<()> {
    let started = Instant::now();
    let result = session
        .search(&query.base_dn, &query.filter, &query.attributes())
        .await;
    if let Some(gauge) = &query.duration_gauge {
        // Recorded for success and failure alike; a failed tick zeroes it
        // again afterwards.
        gauge
            .with_label_values(&[query.base_dn.as_str()])
            .set(started.elapsed().as_nanos() as f64);
    }

    let entries = match result {
        Ok(entries) => entries,
        // Expected on servers that do not expose this monitoring subtree.
        Err(_) if query.tolerates_failure => return Ok(()),
        Err(error) => return Err(error),
    };

    if let Some(gauge) = &query.count_gauge {
        gauge
            .with_label_values(&[query.base_dn.as_str()])
            .set(entries.len() as f64);
    }

    if let (Some(attribute), Some(gauge)) = (query.value_attribute, &query.value_gauge) {
        for entry in &entries {
            // Not every monitored entry carries the attribute.
            let Some(raw) = entry.first(attribute) else {
                continue;
            };
            // Some monitoring attributes are textual.
            let Ok(value) = raw.parse::<f64>() else {
                continue;
            };
            gauge.with_label_values(&[entry.dn.as_str()]).set(value);
        }
    }

    Ok(())
}
