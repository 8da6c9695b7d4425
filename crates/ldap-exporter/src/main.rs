//! OpenLDAP Prometheus exporter binary.
//!
//! Wires the pieces together: resolves the directory address, loads trust
//! material and credentials (all fatal at startup when unusable), then runs
//! the fixed-interval scrape loop and the metrics HTTP server as two
//! independent tasks for the process lifetime, sharing only the metric set.

use anyhow::Context;
use clap::Parser;
use ldap_exporter_core::addr::LdapAddress;
use ldap_exporter_core::config::{BindCredentials, LdapConfig};
use ldap_exporter_core::metrics::LdapMetrics;
use ldap_exporter_scrape::Scraper;
use ldap_exporter_server::{serve, AppState, MetricsServerConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Prometheus exporter for OpenLDAP monitoring counters.
#[derive(Parser, Debug)]
#[command(name = "ldap-exporter", version, about, long_about = None)]
struct Cli {
    /// Bind address for the Prometheus HTTP metrics server.
    #[arg(long, default_value = "0.0.0.0:9330", env = "LDAP_EXPORTER_PROM_ADDR")]
    prom_addr: SocketAddr,

    /// Path to a PEM certificate chain file to serve metrics over HTTPS
    /// (requires --prom-key).
    #[arg(long, env = "LDAP_EXPORTER_PROM_CERT")]
    prom_cert: Option<PathBuf>,

    /// Path to the PEM key file for --prom-cert.
    #[arg(long, env = "LDAP_EXPORTER_PROM_KEY")]
    prom_key: Option<PathBuf>,

    /// Address of the OpenLDAP server (ldap://, ldaps://, ldapi:// or
    /// host:port).
    #[arg(
        long,
        default_value = "ldap://localhost:389",
        env = "LDAP_EXPORTER_LDAP_ADDR"
    )]
    ldap_addr: String,

    /// Path to a CA certificate for LDAPS (optional).
    #[arg(long, env = "LDAP_EXPORTER_LDAP_CA_CERT")]
    ldap_ca_cert: Option<PathBuf>,

    /// OpenLDAP bind username (optional).
    #[arg(long, default_value = "", env = "LDAP_EXPORTER_LDAP_USER")]
    ldap_user: String,

    /// OpenLDAP bind password (optional).
    #[arg(long, default_value = "", env = "LDAP_EXPORTER_LDAP_PASS")]
    ldap_pass: String,

    /// Base DN for the posixAccount search. Optional, but without it the
    /// posixAccount query searches an empty base and every scrape fails.
    #[arg(long, default_value = "", env = "LDAP_EXPORTER_LDAP_BASE_DN")]
    ldap_base_dn: String,

    /// Upgrade the plaintext connection with StartTLS.
    #[arg(long, env = "LDAP_EXPORTER_LDAP_START_TLS")]
    ldap_start_tls: bool,

    /// Skip TLS certificate verification.
    #[arg(long, env = "LDAP_EXPORTER_INSECURE_SKIP_VERIFY")]
    insecure_skip_verify: bool,

    /// Scrape interval.
    #[arg(
        long,
        default_value = "30s",
        value_parser = humantime::parse_duration,
        env = "LDAP_EXPORTER_INTERVAL"
    )]
    interval: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let address = LdapAddress::resolve(&cli.ldap_addr)
        .with_context(|| format!("failed to parse LDAP address `{}`", cli.ldap_addr))?;

    let mut config = LdapConfig::new(address)
        .with_base_dn(cli.ldap_base_dn.as_str())
        .with_start_tls(cli.ldap_start_tls)
        .with_tls_verification(!cli.insecure_skip_verify);

    if let Some(path) = &cli.ldap_ca_cert {
        config = config
            .with_ca_cert_file(path)
            .context("failed to load CA certificate file")?;
        tracing::info!(path = %path.display(), "loaded CA certificate file");
    }

    if let Some(credentials) = BindCredentials::from_optional(&cli.ldap_user, &cli.ldap_pass)? {
        config = config.with_credentials(credentials);
    }

    let server_config =
        MetricsServerConfig::new(cli.prom_addr).with_tls_files(cli.prom_cert, cli.prom_key)?;

    let metrics = Arc::new(LdapMetrics::new()?);
    let state = AppState::new(
        Arc::clone(&metrics),
        format!("ldap-exporter v{}", env!("CARGO_PKG_VERSION")),
    );

    tracing::info!(addr = %cli.ldap_addr, interval = ?cli.interval, "starting OpenLDAP scraper");
    let scraper = Scraper::new(config, &metrics);
    let interval = cli.interval;
    tokio::spawn(async move { scraper.run(interval).await });

    tracing::info!(addr = %cli.prom_addr, "starting Prometheus metrics server");
    serve(server_config, state).await?;
    Ok(())
}
