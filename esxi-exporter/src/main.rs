/**
 * ESXI EXPORTER - Point d'entrée principal
 *
 * RÔLE : charge la config, installe le logging, construit le Collector et
 * expose l'endpoint Prometheus. Chaque scrape ouvre une session vSphere par
 * hôte, lit le résumé HostSystem, puis se déconnecte.
 *
 * UTILITÉ : surveiller l'état, l'uptime, le CPU et la mémoire d'hôtes ESXi
 * sans agent installé sur les hyperviseurs.
 */

mod collector;
mod config;
mod error;
mod exposition;
mod host;
mod http;
mod models;
mod vsphere;

use crate::collector::Collector;
use crate::config::{config_path, load_config, ExporterConfig};
use crate::host::{HostClient, VsphereBackend};
use crate::http::AppState;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "Prometheus exporter for VMware ESXi hosts")]
struct Cli {
    /// YAML config file (default: $ESXI_EXPORTER_CONFIG or esxi-exporter.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on for web interface and telemetry.
    #[arg(long = "web.listen-address")]
    listen_address: Option<String>,

    /// Path under which to expose metrics.
    #[arg(long = "web.telemetry-path")]
    metrics_path: Option<String>,
}

impl Cli {
    fn apply(&self, cfg: &mut ExporterConfig) {
        if let Some(addr) = &self.listen_address {
            cfg.listen_address = addr.clone();
        }
        if let Some(path) = &self.metrics_path {
            cfg.metrics_path = path.clone();
        }
    }
}

fn init_tracing(default_level: &str) {
    // RUST_LOG prend le dessus sur le niveau de la config
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Ok si .env n'existe pas
    let cli = Cli::parse();

    let path = config_path(cli.config.as_deref());
    let mut cfg = load_config(&path).await?;
    cli.apply(&mut cfg);
    cfg.validate()?;
    init_tracing(&cfg.log_level);

    if !path.exists() {
        warn!(path = %path.display(), "config file not found, running with defaults and no hosts");
    }

    info!(
        hosts = cfg.hosts.len(),
        scheme = cfg.scheme.as_str(),
        "loaded {} host target(s)",
        cfg.hosts.len()
    );

    let client = HostClient::new(
        Arc::new(VsphereBackend::new(cfg.scheme)),
        cfg.connect_timeout(),
        cfg.query_timeout(),
    );
    let collector = Collector::new(cfg.hosts.clone(), client);
    let app = http::build_router(AppState::new(collector, &cfg.metrics_path), &cfg.metrics_path);

    let bind = cfg.bind_address();
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("cannot bind {bind}"))?;
    info!("Starting server on http://{}{}", bind, cfg.metrics_path);
    axum::serve(listener, app).await.context("http server failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags_override_config() {
        let cli = Cli::parse_from([
            "esxi-exporter",
            "--web.listen-address",
            ":9700",
            "--web.telemetry-path",
            "/esxi",
        ]);
        let mut cfg = ExporterConfig::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg.listen_address, ":9700");
        assert_eq!(cfg.metrics_path, "/esxi");
    }

    #[tokio::test]
    async fn test_cli_fixes_invalid_metrics_path_from_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"metrics_path: metrics\n").unwrap();
        let mut cfg = load_config(file.path()).await.unwrap();
        assert!(cfg.validate().is_err());

        let cli = Cli::parse_from(["esxi-exporter", "--web.telemetry-path", "/metrics"]);
        cli.apply(&mut cfg);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.metrics_path, "/metrics");
    }

    #[test]
    fn test_cli_without_flags_keeps_config() {
        let cli = Cli::parse_from(["esxi-exporter"]);
        let mut cfg = ExporterConfig::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg.listen_address, "0.0.0.0:9601");
        assert!(cli.config.is_none());
    }
}
