//! Request bodies and response shapes for the handful of vim25 calls we make.
//!
//! Responses are decoded with `serde_xml_rs`, which matches on local element
//! names, so the `soapenv:` and `urn:vim25` namespaces need no special casing.
//! Only the fields the exporter reads are declared; everything else is skipped.

use serde::Deserialize;
use xml::escape::{escape_str_attribute, escape_str_pcdata};

pub const VIM_NAMESPACE: &str = "urn:vim25";

#[derive(Debug, Deserialize)]
pub struct Envelope<B> {
    #[serde(rename = "Body")]
    pub body: B,
}

#[derive(Debug, Deserialize)]
pub struct Returning<T> {
    pub returnval: T,
}

/// Managed object reference: `<x type="HostSystem">ha-host</x>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MoRef {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "$value")]
    pub value: String,
}

impl MoRef {
    pub fn new(kind: &str, value: &str) -> Self {
        Self {
            kind: kind.to_string(),
            value: value.to_string(),
        }
    }

    fn to_xml(&self, element: &str) -> String {
        format!(
            r#"<{element} type="{}">{}</{element}>"#,
            escape_str_attribute(&self.kind),
            escape_str_pcdata(&self.value)
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct FaultBody {
    #[serde(rename = "Fault")]
    pub fault: Fault,
}

#[derive(Debug, Deserialize)]
pub struct Fault {
    #[serde(default)]
    pub faultcode: String,
    #[serde(default)]
    pub faultstring: String,
}

#[derive(Debug, Deserialize)]
pub struct ServiceContentBody {
    #[serde(rename = "RetrieveServiceContentResponse")]
    pub response: Returning<ServiceContent>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceContent {
    pub root_folder: MoRef,
    pub property_collector: MoRef,
    pub view_manager: MoRef,
    pub session_manager: MoRef,
}

#[derive(Debug, Deserialize)]
pub struct CreateContainerViewBody {
    #[serde(rename = "CreateContainerViewResponse")]
    pub response: Returning<MoRef>,
}

#[derive(Debug, Deserialize)]
pub struct RetrievePropertiesBody {
    #[serde(
        rename = "RetrievePropertiesExResponse",
        alias = "ContinueRetrievePropertiesExResponse"
    )]
    pub response: RetrieveResponse,
}

/// `returnval` is absent altogether when the view holds no object.
#[derive(Debug, Deserialize)]
pub struct RetrieveResponse {
    #[serde(default)]
    pub returnval: Option<RetrieveResult>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetrieveResult {
    #[serde(default)]
    pub objects: Vec<ObjectContent>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectContent {
    #[serde(default)]
    pub obj: MoRef,
    #[serde(rename = "propSet", default)]
    pub prop_set: Vec<DynamicProperty>,
}

#[derive(Debug, Deserialize)]
pub struct DynamicProperty {
    pub name: String,
    pub val: HostListSummary,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostListSummary {
    #[serde(default)]
    pub hardware: HardwareSummary,
    #[serde(default)]
    pub config: ConfigSummary,
    #[serde(default)]
    pub quick_stats: QuickStats,
    #[serde(default)]
    pub overall_status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareSummary {
    #[serde(default)]
    pub memory_size: i64,
    #[serde(default)]
    pub cpu_mhz: i64,
    #[serde(default)]
    pub num_cpu_cores: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigSummary {
    #[serde(default)]
    pub name: String,
}

/// Quick stats are omitted by the server for disconnected hosts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickStats {
    #[serde(default)]
    pub overall_cpu_usage: i64,
    #[serde(default)]
    pub overall_memory_usage: i64,
    #[serde(default)]
    pub uptime: i64,
}

pub fn envelope(body: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" "#,
            r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
            r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema">"#,
            "<soapenv:Body>{}</soapenv:Body></soapenv:Envelope>"
        ),
        body
    )
}

pub fn retrieve_service_content() -> String {
    format!(
        r#"<RetrieveServiceContent xmlns="{VIM_NAMESPACE}">{}</RetrieveServiceContent>"#,
        MoRef::new("ServiceInstance", "ServiceInstance").to_xml("_this")
    )
}

pub fn login(session_manager: &MoRef, username: &str, password: &str) -> String {
    format!(
        r#"<Login xmlns="{VIM_NAMESPACE}">{}<userName>{}</userName><password>{}</password></Login>"#,
        session_manager.to_xml("_this"),
        escape_str_pcdata(username),
        escape_str_pcdata(password)
    )
}

pub fn logout(session_manager: &MoRef) -> String {
    format!(
        r#"<Logout xmlns="{VIM_NAMESPACE}">{}</Logout>"#,
        session_manager.to_xml("_this")
    )
}

pub fn create_container_view(view_manager: &MoRef, container: &MoRef, kind: &str) -> String {
    format!(
        r#"<CreateContainerView xmlns="{VIM_NAMESPACE}">{}{}<type>{}</type><recursive>true</recursive></CreateContainerView>"#,
        view_manager.to_xml("_this"),
        container.to_xml("container"),
        escape_str_pcdata(kind)
    )
}

pub fn destroy_view(view: &MoRef) -> String {
    format!(
        r#"<DestroyView xmlns="{VIM_NAMESPACE}">{}</DestroyView>"#,
        view.to_xml("_this")
    )
}

/// `RetrievePropertiesEx` for `path` on every object of type `kind` in `view`.
pub fn retrieve_properties(collector: &MoRef, view: &MoRef, kind: &str, path: &str) -> String {
    format!(
        concat!(
            r#"<RetrievePropertiesEx xmlns="{ns}">{this}"#,
            "<specSet>",
            "<propSet><type>{kind}</type><all>false</all><pathSet>{path}</pathSet></propSet>",
            "<objectSet>{obj}<skip>true</skip>",
            r#"<selectSet xsi:type="TraversalSpec"><name>traverseEntities</name>"#,
            "<type>ContainerView</type><path>view</path><skip>false</skip></selectSet>",
            "</objectSet>",
            "</specSet>",
            "<options/>",
            "</RetrievePropertiesEx>"
        ),
        ns = VIM_NAMESPACE,
        this = collector.to_xml("_this"),
        kind = escape_str_pcdata(kind),
        path = escape_str_pcdata(path),
        obj = view.to_xml("obj"),
    )
}

pub fn continue_retrieve_properties(collector: &MoRef, token: &str) -> String {
    format!(
        r#"<ContinueRetrievePropertiesEx xmlns="{VIM_NAMESPACE}">{}<token>{}</token></ContinueRetrievePropertiesEx>"#,
        collector.to_xml("_this"),
        escape_str_pcdata(token)
    )
}
