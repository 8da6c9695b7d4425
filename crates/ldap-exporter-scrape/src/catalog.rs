//! The fixed catalog of monitoring queries.

use ldap_exporter_core::metrics::LdapMetrics;
use prometheus::GaugeVec;

/// Base DN of the server's own monitoring subtree.
pub const MONITOR_BASE_DN: &str = "cn=Monitor";
/// Base DN of the operation counters inside the monitoring subtree.
pub const OPERATIONS_BASE_DN: &str = "cn=Operations,cn=Monitor";

const MONITORED_OBJECT: &str = "monitoredObject";
const MONITORED_INFO: &str = "monitoredInfo";

const MONITOR_COUNTER_OBJECT: &str = "monitorCounterObject";
const MONITOR_COUNTER: &str = "monitorCounter";

const MONITOR_OPERATION: &str = "monitorOperation";
const MONITOR_OP_COMPLETED: &str = "monitorOpCompleted";

const POSIX_ACCOUNT: &str = "posixAccount";

fn object_class(name: &str) -> String {
    format!("(objectClass={name})")
}

/// One catalog entry: a subtree search and the metric updates it feeds.
pub struct MonitorQuery {
    pub(crate) base_dn: String,
    pub(crate) filter: String,
    pub(crate) value_attribute: Option<&'static str>,
    pub(crate) tolerates_failure: bool,
    pub(crate) value_gauge: Option<GaugeVec>,
    pub(crate) count_gauge: Option<GaugeVec>,
    pub(crate) duration_gauge: Option<GaugeVec>,
}

impl MonitorQuery {
    /// Base DN the search is scoped at.
    #[must_use]
    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// The objectClass equality filter.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Attribute read as a per-entry gauge value, when the query does so.
    #[must_use]
    pub const fn value_attribute(&self) -> Option<&'static str> {
        self.value_attribute
    }

    /// Whether a search failure is expected and swallowed for this query.
    #[must_use]
    pub const fn tolerates_failure(&self) -> bool {
        self.tolerates_failure
    }

    /// Attributes requested from the server: the DN, plus the value
    /// attribute when the query reads one.
    pub(crate) fn attributes(&self) -> Vec<&'static str> {
        let mut attributes = vec!["dn"];
        if let Some(attribute) = self.value_attribute {
            attributes.push(attribute);
        }
        attributes
    }
}

/// The fixed set of queries executed on every scrape tick, in order.
pub struct QueryCatalog {
    queries: Vec<MonitorQuery>,
}

impl QueryCatalog {
    /// Builds the catalog against the given metric set.
    ///
    /// The first three queries read the server's own monitoring subtree and
    /// tolerate search failure, since not every server build exposes
    /// `cn=Monitor`. The posixAccount query against the operator-supplied
    /// base does not tolerate failure; it is the one whose failure marks the
    /// whole scrape as failed.
    #[must_use]
    pub fn new(metrics: &LdapMetrics, base_dn: &str) -> Self {
        let queries = vec![
            MonitorQuery {
                base_dn: MONITOR_BASE_DN.to_string(),
                filter: object_class(MONITORED_OBJECT),
                value_attribute: Some(MONITORED_INFO),
                tolerates_failure: true,
                value_gauge: Some(metrics.monitored_object().clone()),
                count_gauge: None,
                duration_gauge: None,
            },
            MonitorQuery {
                base_dn: MONITOR_BASE_DN.to_string(),
                filter: object_class(MONITOR_COUNTER_OBJECT),
                value_attribute: Some(MONITOR_COUNTER),
                tolerates_failure: true,
                value_gauge: Some(metrics.monitor_counter_object().clone()),
                count_gauge: None,
                duration_gauge: None,
            },
            MonitorQuery {
                base_dn: OPERATIONS_BASE_DN.to_string(),
                filter: object_class(MONITOR_OPERATION),
                value_attribute: Some(MONITOR_OP_COMPLETED),
                tolerates_failure: true,
                value_gauge: Some(metrics.monitor_operation().clone()),
                count_gauge: None,
                duration_gauge: None,
            },
            MonitorQuery {
                base_dn: base_dn.to_string(),
                filter: object_class(POSIX_ACCOUNT),
                value_attribute: None,
                tolerates_failure: false,
                value_gauge: None,
                count_gauge: Some(metrics.posix_account_count().clone()),
                duration_gauge: Some(metrics.posix_account_query_duration().clone()),
            },
        ];
        Self { queries }
    }

    /// The queries, in execution order.
    #[must_use]
    pub fn queries(&self) -> &[MonitorQuery] {
        &self.queries
    }

    /// Zeroes every duration gauge, so a failed tick does not leave the
    /// timing of the last successful scrape standing.
    pub(crate) fn reset_durations(&self) {
        for query in &self.queries {
            if let Some(gauge) = &query.duration_gauge {
                gauge.with_label_values(&[query.base_dn.as_str()]).set(0.0);
            }
        }
    }
}
