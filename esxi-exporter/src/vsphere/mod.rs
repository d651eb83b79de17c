//! Minimal vSphere Web Services client.
//!
//! Covers exactly what one scrape needs: log in, list the `summary` of every
//! `HostSystem` through a container view, destroy the view and log out.
//! Session continuity relies on the `vmware_soap_session` cookie, kept by the
//! per-session reqwest cookie store.

pub mod schema;

use crate::error::VimError;
use reqwest::header::CONTENT_TYPE;
use schema::{
    CreateContainerViewBody, Envelope, FaultBody, HostListSummary, MoRef, RetrievePropertiesBody,
    ServiceContent, ServiceContentBody,
};
use serde::de::DeserializeOwned;
use tracing::debug;

const SOAP_ACTION: &str = "urn:vim25/6.0";
const HOST_SYSTEM: &str = "HostSystem";

/// `summary` of one HostSystem, keyed by its managed object id.
#[derive(Debug, Clone)]
pub struct HostSystem {
    pub id: String,
    pub summary: HostListSummary,
}

/// One authenticated session against one `/sdk` endpoint.
pub struct VimSession {
    http: reqwest::Client,
    url: String,
    content: ServiceContent,
    view: Option<MoRef>,
}

impl VimSession {
    /// Retrieves the service content and logs in. Self-signed certificates are accepted.
    pub async fn login(url: &str, username: &str, password: &str) -> Result<Self, VimError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .cookie_store(true)
            .build()?;

        let content = call::<ServiceContentBody>(
            &http,
            url,
            "RetrieveServiceContent",
            schema::retrieve_service_content(),
        )
        .await?
        .response
        .returnval;

        invoke(
            &http,
            url,
            "Login",
            schema::login(&content.session_manager, username, password),
        )
        .await?;
        debug!(url, user = username, "vSphere session established");

        Ok(Self {
            http,
            url: url.to_string(),
            content,
            view: None,
        })
    }

    /// `summary` of every HostSystem reachable from the root folder.
    pub async fn host_summaries(&mut self) -> Result<Vec<HostSystem>, VimError> {
        let view = match &self.view {
            Some(view) => view.clone(),
            None => {
                let view = self
                    .call::<CreateContainerViewBody>(
                        "CreateContainerView",
                        schema::create_container_view(
                            &self.content.view_manager,
                            &self.content.root_folder,
                            HOST_SYSTEM,
                        ),
                    )
                    .await?
                    .response
                    .returnval;
                self.view = Some(view.clone());
                view
            }
        };

        let collector = self.content.property_collector.clone();
        let mut page = self
            .call::<RetrievePropertiesBody>(
                "RetrievePropertiesEx",
                schema::retrieve_properties(&collector, &view, HOST_SYSTEM, "summary"),
            )
            .await?
            .response
            .returnval
            .unwrap_or_default();

        let mut summaries = Vec::new();
        loop {
            for object in page.objects {
                let id = object.obj.value;
                summaries.extend(
                    object
                        .prop_set
                        .into_iter()
                        .filter(|prop| prop.name == "summary")
                        .map(|prop| HostSystem {
                            id: id.clone(),
                            summary: prop.val,
                        }),
                );
            }
            let Some(token) = page.token else { break };
            page = self
                .call::<RetrievePropertiesBody>(
                    "ContinueRetrievePropertiesEx",
                    schema::continue_retrieve_properties(&collector, &token),
                )
                .await?
                .response
                .returnval
                .unwrap_or_default();
        }

        Ok(summaries)
    }

    /// Destroys the container view (if any) then terminates the session.
    /// Logout is attempted even when the view cannot be destroyed.
    pub async fn logout(&mut self) -> Result<(), VimError> {
        let destroyed = match self.view.take() {
            Some(view) => self
                .invoke("DestroyView", schema::destroy_view(&view))
                .await
                .map(|_| ()),
            None => Ok(()),
        };
        self.invoke("Logout", schema::logout(&self.content.session_manager))
            .await?;
        destroyed
    }

    async fn call<B: DeserializeOwned>(
        &self,
        operation: &'static str,
        body: String,
    ) -> Result<B, VimError> {
        call(&self.http, &self.url, operation, body).await
    }

    async fn invoke(&self, operation: &'static str, body: String) -> Result<String, VimError> {
        invoke(&self.http, &self.url, operation, body).await
    }
}

async fn call<B: DeserializeOwned>(
    http: &reqwest::Client,
    url: &str,
    operation: &'static str,
    body: String,
) -> Result<B, VimError> {
    let text = invoke(http, url, operation, body).await?;
    serde_xml_rs::from_str::<Envelope<B>>(&text)
        .map(|envelope| envelope.body)
        .map_err(|source| VimError::Decode { operation, source })
}

async fn invoke(
    http: &reqwest::Client,
    url: &str,
    operation: &'static str,
    body: String,
) -> Result<String, VimError> {
    let response = http
        .post(url)
        .header(CONTENT_TYPE, "text/xml; charset=utf-8")
        .header("SOAPAction", SOAP_ACTION)
        .body(schema::envelope(&body))
        .send()
        .await?;

    let status = response.status();
    let text = response.text().await?;
    if status.is_success() {
        return Ok(text);
    }

    // SOAP faults come back as HTTP 500 with a Fault body
    match serde_xml_rs::from_str::<Envelope<FaultBody>>(&text) {
        Ok(envelope) => {
            let fault = envelope.body.fault;
            Err(VimError::Fault {
                operation,
                message: format!("{} ({})", fault.faultstring, fault.faultcode),
            })
        }
        Err(_) => Err(VimError::Status {
            operation,
            status: status.as_u16(),
        }),
    }
}
