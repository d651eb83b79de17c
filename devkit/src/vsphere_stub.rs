/*!
Stub vSphere SDK pour tests sans ESXi

Serveur axum local (127.0.0.1, port éphémère) qui répond à `POST /sdk` comme
un hôte ESXi : service content, login par cookie `vmware_soap_session`,
container view, RetrievePropertiesEx paginé, DestroyView et Logout.
Chaque appel est compté pour permettre des assertions sur le cycle de session.
*/

use crate::fixtures::{self, StubHost};
use anyhow::Result;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const XML: &str = "text/xml; charset=utf-8";
const SESSION_COOKIE: &str = "vmware_soap_session";
const INVALID_LOGIN: &str = "Cannot complete login due to an incorrect user name or password.";

/// Compteurs d'appels, par opération
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StubStats {
    pub logins: usize,
    pub failed_logins: usize,
    pub views_created: usize,
    pub queries: usize,
    pub views_destroyed: usize,
    pub logouts: usize,
    pub unauthenticated_calls: usize,
}

struct StubState {
    hosts: Vec<StubHost>,
    username: String,
    password: String,
    page_size: Option<usize>,
    fail_queries: bool,
    query_delay: Duration,
    sessions: Mutex<HashSet<String>>,
    next_id: Mutex<u64>,
    stats: Mutex<StubStats>,
}

impl StubState {
    fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock();
        *id += 1;
        *id
    }

    fn session_of(&self, headers: &HeaderMap) -> Option<String> {
        let sessions = self.sessions.lock();
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value.trim_matches('"').to_string())
            .find(|value| sessions.contains(value))
    }

    /// Page `index` of the inventory, with the token of the next page if any.
    fn page(&self, index: usize) -> (usize, &[StubHost], Option<String>) {
        let size = self.page_size.unwrap_or(self.hosts.len()).max(1);
        let start = (index * size).min(self.hosts.len());
        let end = (start + size).min(self.hosts.len());
        let token = (end < self.hosts.len()).then(|| (index + 1).to_string());
        (start, &self.hosts[start..end], token)
    }
}

pub struct VsphereStubBuilder {
    hosts: Vec<StubHost>,
    username: String,
    password: String,
    page_size: Option<usize>,
    fail_queries: bool,
    query_delay: Duration,
}

impl VsphereStubBuilder {
    pub fn credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    /// Nombre d'objets par page de RetrievePropertiesEx
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// RetrievePropertiesEx répond par un fault InvalidProperty
    pub fn fail_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    pub fn query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    pub async fn start(self) -> Result<VsphereStub> {
        let state = Arc::new(StubState {
            hosts: self.hosts,
            username: self.username,
            password: self.password,
            page_size: self.page_size,
            fail_queries: self.fail_queries,
            query_delay: self.query_delay,
            sessions: Mutex::new(HashSet::new()),
            next_id: Mutex::new(0),
            stats: Mutex::new(StubStats::default()),
        });

        let app = Router::new()
            .route("/sdk", post(sdk))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(error = %e, "vsphere stub stopped");
            }
        });
        tracing::debug!(%addr, "vsphere stub listening");

        Ok(VsphereStub { addr, state, server })
    }
}

/// Hôte ESXi simulé, arrêté au drop
pub struct VsphereStub {
    addr: SocketAddr,
    state: Arc<StubState>,
    server: JoinHandle<()>,
}

impl VsphereStub {
    /// Identifiants acceptés par défaut : `root` / `secret`
    pub fn builder(hosts: Vec<StubHost>) -> VsphereStubBuilder {
        VsphereStubBuilder {
            hosts,
            username: "root".to_string(),
            password: "secret".to_string(),
            page_size: None,
            fail_queries: false,
            query_delay: Duration::ZERO,
        }
    }

    pub async fn start(hosts: Vec<StubHost>) -> Result<Self> {
        Self::builder(hosts).start().await
    }

    /// `127.0.0.1:<port>`, usable as a host address
    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn sdk_url(&self) -> String {
        format!("http://{}/sdk", self.addr)
    }

    pub fn stats(&self) -> StubStats {
        self.state.stats.lock().clone()
    }

    pub fn active_sessions(&self) -> usize {
        self.state.sessions.lock().len()
    }
}

impl Drop for VsphereStub {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn xml(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, XML)], body).into_response()
}

fn fault(message: &str, detail: &str) -> Response {
    xml(StatusCode::INTERNAL_SERVER_ERROR, fixtures::fault(message, detail))
}

#[derive(Debug, Deserialize)]
struct RequestEnvelope {
    #[serde(rename = "Body")]
    body: RequestBody,
}

/// Un seul champ est présent : l'opération appelée
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RequestBody {
    #[serde(default)]
    retrieve_service_content: Option<Ignored>,
    #[serde(default)]
    login: Option<LoginRequest>,
    #[serde(default)]
    create_container_view: Option<Ignored>,
    #[serde(default)]
    retrieve_properties_ex: Option<Ignored>,
    #[serde(default)]
    continue_retrieve_properties_ex: Option<ContinueRequest>,
    #[serde(default)]
    destroy_view: Option<Ignored>,
    #[serde(default)]
    logout: Option<Ignored>,
}

#[derive(Debug, Deserialize)]
struct Ignored {}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(rename = "userName", default)]
    user_name: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct ContinueRequest {
    #[serde(default)]
    token: String,
}

#[derive(Debug, PartialEq)]
enum Request {
    RetrieveServiceContent,
    Login { user_name: String, password: String },
    CreateContainerView,
    RetrieveProperties { page: Option<usize> },
    DestroyView,
    Logout,
}

impl Request {
    /// Décode l'enveloppe SOAP reçue ; `None` si aucune opération connue.
    fn parse(xml: &str) -> Option<Self> {
        let body = serde_xml_rs::from_str::<RequestEnvelope>(xml).ok()?.body;
        let request = if body.retrieve_service_content.is_some() {
            Request::RetrieveServiceContent
        } else if let Some(login) = body.login {
            Request::Login {
                user_name: login.user_name,
                password: login.password,
            }
        } else if body.create_container_view.is_some() {
            Request::CreateContainerView
        } else if body.retrieve_properties_ex.is_some() {
            Request::RetrieveProperties { page: Some(0) }
        } else if let Some(next) = body.continue_retrieve_properties_ex {
            Request::RetrieveProperties {
                page: next.token.trim().parse().ok(),
            }
        } else if body.destroy_view.is_some() {
            Request::DestroyView
        } else if body.logout.is_some() {
            Request::Logout
        } else {
            return None;
        };
        Some(request)
    }
}

async fn sdk(State(state): State<Arc<StubState>>, headers: HeaderMap, body: String) -> Response {
    let Some(request) = Request::parse(&body) else {
        return fault("Unsupported or malformed request", "InvalidRequest");
    };

    match request {
        Request::RetrieveServiceContent => xml(StatusCode::OK, fixtures::service_content()),
        Request::Login { user_name, password } => login(&state, &user_name, &password),
        other => {
            if state.session_of(&headers).is_none() {
                state.stats.lock().unauthenticated_calls += 1;
                return fault("The session is not authenticated.", "NotAuthenticated");
            }
            authenticated(&state, &headers, other).await
        }
    }
}

fn login(state: &StubState, user: &str, password: &str) -> Response {
    if user != state.username || password != state.password {
        state.stats.lock().failed_logins += 1;
        return fault(INVALID_LOGIN, "InvalidLogin");
    }

    let session = format!("stub-{:08x}", state.next_id());
    state.sessions.lock().insert(session.clone());
    state.stats.lock().logins += 1;

    let cookie = format!("{SESSION_COOKIE}=\"{session}\"; Path=/; HttpOnly");
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, XML.to_string()), (header::SET_COOKIE, cookie)],
        fixtures::login(user),
    )
        .into_response()
}

async fn authenticated(state: &StubState, headers: &HeaderMap, request: Request) -> Response {
    match request {
        Request::CreateContainerView => {
            state.stats.lock().views_created += 1;
            xml(StatusCode::OK, fixtures::container_view(state.next_id()))
        }
        Request::RetrieveProperties { page } => {
            state.stats.lock().queries += 1;
            if !state.query_delay.is_zero() {
                tokio::time::sleep(state.query_delay).await;
            }
            if state.fail_queries {
                return fault("Property summary is not valid.", "InvalidProperty");
            }
            let Some(index) = page else {
                return fault("A specified parameter was not correct: token", "InvalidArgument");
            };
            let operation = if index == 0 {
                "RetrievePropertiesEx"
            } else {
                "ContinueRetrievePropertiesEx"
            };
            let (offset, hosts, token) = state.page(index);
            xml(
                StatusCode::OK,
                fixtures::properties(operation, hosts, offset, token.as_deref()),
            )
        }
        Request::DestroyView => {
            state.stats.lock().views_destroyed += 1;
            xml(StatusCode::OK, fixtures::empty("DestroyView"))
        }
        Request::Logout => {
            if let Some(session) = state.session_of(headers) {
                state.sessions.lock().remove(&session);
            }
            state.stats.lock().logouts += 1;
            xml(StatusCode::OK, fixtures::empty("Logout"))
        }
        Request::RetrieveServiceContent | Request::Login { .. } => {
            fault("Unexpected request", "InvalidRequest")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(inner: &str) -> String {
        fixtures::envelope(inner)
    }

    fn login_body(password: &str) -> String {
        request(&format!(
            r#"<Login xmlns="urn:vim25"><_this type="SessionManager">ha-sessionmgr</_this><userName>root</userName><password>{password}</password></Login>"#
        ))
    }

    async fn post(stub: &VsphereStub, body: String) -> reqwest::Response {
        reqwest::Client::new()
            .post(stub.sdk_url())
            .body(body)
            .send()
            .await
            .unwrap()
    }

    #[test]
    fn test_parse_operations() {
        let service = request(
            r#"<RetrieveServiceContent xmlns="urn:vim25"><_this type="ServiceInstance">ServiceInstance</_this></RetrieveServiceContent>"#,
        );
        assert_eq!(Request::parse(&service), Some(Request::RetrieveServiceContent));

        let next = request(
            r#"<ContinueRetrievePropertiesEx xmlns="urn:vim25"><_this type="PropertyCollector">ha-property-collector</_this><token>2</token></ContinueRetrievePropertiesEx>"#,
        );
        assert_eq!(Request::parse(&next), Some(Request::RetrieveProperties { page: Some(2) }));

        assert_eq!(Request::parse("<Envelope/>"), None);
        assert_eq!(Request::parse("not xml"), None);
    }

    #[test]
    fn test_login_credentials_are_unescaped() {
        let parsed = Request::parse(&login_body("a&amp;b&lt;c"));
        assert_eq!(
            parsed,
            Some(Request::Login {
                user_name: "root".to_string(),
                password: "a&b<c".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_service_content_needs_no_session() {
        let stub = VsphereStub::start(vec![StubHost::reference("esx-a")]).await.unwrap();
        let body = request(
            r#"<RetrieveServiceContent xmlns="urn:vim25"><_this type="ServiceInstance">ServiceInstance</_this></RetrieveServiceContent>"#,
        );
        let resp = post(&stub, body).await;
        assert_eq!(resp.status(), 200);
        assert!(resp.text().await.unwrap().contains("ha-property-collector"));
        assert_eq!(stub.stats().unauthenticated_calls, 0);
    }

    #[tokio::test]
    async fn test_login_sets_session_cookie() {
        let stub = VsphereStub::start(vec![]).await.unwrap();
        let resp = post(&stub, login_body("secret")).await;
        assert_eq!(resp.status(), 200);
        let cookie = resp.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        assert!(cookie.starts_with("vmware_soap_session="));
        assert_eq!(stub.stats().logins, 1);
        assert_eq!(stub.active_sessions(), 1);
    }

    #[tokio::test]
    async fn test_wrong_password_is_a_fault() {
        let stub = VsphereStub::start(vec![]).await.unwrap();
        let resp = post(&stub, login_body("nope")).await;
        assert_eq!(resp.status(), 500);
        assert!(resp.text().await.unwrap().contains("incorrect user name or password"));
        assert_eq!(stub.stats().failed_logins, 1);
    }

    #[tokio::test]
    async fn test_query_without_cookie_is_rejected() {
        let stub = VsphereStub::start(vec![StubHost::reference("esx-a")]).await.unwrap();
        let resp = post(&stub, request(r#"<RetrievePropertiesEx xmlns="urn:vim25"></RetrievePropertiesEx>"#)).await;
        assert_eq!(resp.status(), 500);
        let stats = stub.stats();
        assert_eq!(stats.unauthenticated_calls, 1);
        assert_eq!(stats.queries, 0);
    }

    #[tokio::test]
    async fn test_pages_cover_inventory() {
        let hosts = vec![
            StubHost::reference("a"),
            StubHost::reference("b"),
            StubHost::reference("c"),
        ];
        let stub = VsphereStub::builder(hosts).page_size(2).start().await.unwrap();
        let (offset, first, token) = stub.state.page(0);
        assert_eq!((offset, first.len(), token.as_deref()), (0, 2, Some("1")));
        let (offset, second, token) = stub.state.page(1);
        assert_eq!((offset, second.len(), token), (2, 1, None));
    }
}
