/**
 * API HTTP - Endpoint de scrape Prometheus
 *
 * RÔLE :
 * - GET <metrics_path> : déclenche un cycle complet du Collector et renvoie
 *   les observations au format texte Prometheus (0.0.4)
 * - GET /              : page d'accueil statique avec lien vers les métriques
 * - GET /health        : liveness, ne touche à aucun hôte
 *
 * Pas d'authentification : l'exporter est fait pour être scrapé sur le LAN.
 */

use crate::collector::Collector;
use crate::exposition;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tracing::error;

const TITLE: &str = "ESXi Exporter";

#[derive(Clone)]
pub struct AppState {
    pub collector: Collector,
    pub landing_page: Arc<str>,
}

impl AppState {
    pub fn new(collector: Collector, metrics_path: &str) -> Self {
        Self {
            collector,
            landing_page: landing_page(metrics_path).into(),
        }
    }
}

pub fn landing_page(metrics_path: &str) -> String {
    format!(
        "<html><head><title>{TITLE}</title></head><body><h1>{TITLE}</h1>\
         <p><a href='{metrics_path}'>Metrics</a></p></body></html>"
    )
}

pub fn build_router(app_state: AppState, metrics_path: &str) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/health", get(|| async { "ok" }))
        .route(metrics_path, get(metrics))
        .with_state(app_state)
}

async fn landing(State(app): State<AppState>) -> Html<String> {
    Html(app.landing_page.to_string())
}

// GET /metrics (scrape complet, bloque jusqu'à la fin de tous les hôtes)
async fn metrics(State(app): State<AppState>) -> Response {
    let observations = app.collector.collect().await;
    match exposition::render(&observations) {
        Ok(body) => ([(header::CONTENT_TYPE, exposition::CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "cannot encode observations");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostTarget;
    use crate::host::tests::{Behavior, FakeBackend};
    use crate::config::Scheme;
    use crate::host::{HostClient, VsphereBackend};
    use esxi_devkit::{StubHost, VsphereStub};
    use std::time::Duration;
    use tokio::net::TcpListener;

    async fn serve(metrics_path: &str, backend: FakeBackend, hosts: &[&str]) -> String {
        let client = HostClient::new(Arc::new(backend), Duration::from_secs(5), Duration::from_secs(5));
        let targets = hosts.iter().map(|a| HostTarget::new(a, "root", "pw")).collect();
        serve_collector(metrics_path, Collector::new(targets, client)).await
    }

    async fn serve_collector(metrics_path: &str, collector: Collector) -> String {
        let app = build_router(AppState::new(collector, metrics_path), metrics_path);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let backend = FakeBackend::default().with("10.0.0.2", Behavior::RefuseConnect);
        let base = serve("/metrics", backend, &["10.0.0.1", "10.0.0.2"]).await;

        let response = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(
            response.headers()[reqwest::header::CONTENT_TYPE],
            exposition::CONTENT_TYPE
        );
        let body = response.text().await.unwrap();
        assert!(body.contains("# TYPE esxi_uptime gauge"));
        assert!(body.contains(r#"esxi_status{address="10.0.0.1",name="10.0.0.1-name"} 1"#));
        assert!(body.contains(r#"esxi_status{address="10.0.0.2",name=""} 5"#));
    }

    #[tokio::test]
    async fn test_custom_path_and_landing_page() {
        let base = serve("/probe", FakeBackend::default(), &["10.0.0.1"]).await;

        let landing = reqwest::get(format!("{base}/")).await.unwrap().text().await.unwrap();
        assert!(landing.contains("<a href='/probe'>Metrics</a>"));

        let probe = reqwest::get(format!("{base}/probe")).await.unwrap();
        assert_eq!(probe.status(), reqwest::StatusCode::OK);

        let old = reqwest::get(format!("{base}/metrics")).await.unwrap();
        assert_eq!(old.status(), reqwest::StatusCode::NOT_FOUND);

        let health = reqwest::get(format!("{base}/health")).await.unwrap().text().await.unwrap();
        assert_eq!(health, "ok");
    }

    #[tokio::test]
    async fn test_scrape_through_vsphere_stub() {
        let stub = VsphereStub::start(vec![StubHost::reference("esx-a.lab")]).await.unwrap();
        let client = HostClient::new(
            Arc::new(VsphereBackend::new(Scheme::Http)),
            Duration::from_secs(5),
            Duration::from_secs(5),
        );
        let collector = Collector::new(vec![HostTarget::new(&stub.address(), "root", "secret")], client);
        let base = serve_collector("/metrics", collector).await;

        let body = reqwest::get(format!("{base}/metrics")).await.unwrap().text().await.unwrap();
        let labels = format!(r#"{{address="{}",name="esx-a.lab"}}"#, stub.address());
        assert!(body.contains(&format!("esxi_uptime{labels} 2")));
        assert!(body.contains(&format!("esxi_cpu_usage_rate{labels} 0.375")));
        assert!(body.contains(&format!("esxi_memory_usage_rate{labels} 0.25")));

        let stats = stub.stats();
        assert_eq!((stats.logins, stats.logouts, stats.views_destroyed), (1, 1, 1));
        assert_eq!(stub.active_sessions(), 0);
    }
}
