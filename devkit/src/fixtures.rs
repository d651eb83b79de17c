/*!
Builders pour les réponses SOAP vim25 renvoyées par le stub

Les réponses reprennent la forme de celles d'un ESXi 7 : enveloppe SOAP 1.1,
namespace `urn:vim25`, références d'objets `type="..."`.
*/

use xml::escape::escape_str_pcdata;

/// Un HostSystem tel qu'exposé par `summary`.
#[derive(Debug, Clone, PartialEq)]
pub struct StubHost {
    pub name: String,
    pub overall_status: String,
    pub uptime: i64,
    pub cpu_mhz: i64,
    pub num_cpu_cores: i64,
    pub overall_cpu_usage: i64,
    pub memory_size: i64,
    pub overall_memory_usage: i64,
}

impl StubHost {
    /// Green host, 2h uptime, 4 x 2000 MHz with 3000 MHz used, 16 GiB with 4096 MB used.
    pub fn reference(name: &str) -> Self {
        Self {
            name: name.to_string(),
            overall_status: "green".to_string(),
            uptime: 7200,
            cpu_mhz: 2000,
            num_cpu_cores: 4,
            overall_cpu_usage: 3000,
            memory_size: 17_179_869_184,
            overall_memory_usage: 4096,
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.overall_status = status.to_string();
        self
    }

    fn object_content(&self, index: usize) -> String {
        format!(
            concat!(
                r#"<objects><obj type="HostSystem">host-{idx}</obj><propSet><name>summary</name>"#,
                r#"<val xsi:type="HostListSummary"><host type="HostSystem">host-{idx}</host>"#,
                "<hardware><vendor>VMware, Inc.</vendor><memorySize>{mem}</memorySize>",
                "<cpuModel>Stub CPU</cpuModel><cpuMhz>{mhz}</cpuMhz><numCpuPkgs>1</numCpuPkgs>",
                "<numCpuCores>{cores}</numCpuCores></hardware>",
                "<config><name>{name}</name><port>443</port></config>",
                "<quickStats><overallCpuUsage>{cpu}</overallCpuUsage>",
                "<overallMemoryUsage>{used}</overallMemoryUsage><uptime>{uptime}</uptime></quickStats>",
                "<overallStatus>{status}</overallStatus>",
                "</val></propSet></objects>"
            ),
            idx = index,
            mem = self.memory_size,
            mhz = self.cpu_mhz,
            cores = self.num_cpu_cores,
            name = escape_str_pcdata(&self.name),
            cpu = self.overall_cpu_usage,
            used = self.overall_memory_usage,
            uptime = self.uptime,
            status = escape_str_pcdata(&self.overall_status),
        )
    }
}

pub(crate) fn envelope(body: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<soapenv:Envelope xmlns:soapenc="http://schemas.xmlsoap.org/soap/encoding/" "#,
            r#"xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" "#,
            r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
            r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
            "<soapenv:Body>{}</soapenv:Body></soapenv:Envelope>"
        ),
        body
    )
}

pub fn service_content() -> String {
    envelope(concat!(
        r#"<RetrieveServiceContentResponse xmlns="urn:vim25"><returnval>"#,
        r#"<rootFolder type="Folder">ha-folder-root</rootFolder>"#,
        r#"<propertyCollector type="PropertyCollector">ha-property-collector</propertyCollector>"#,
        r#"<viewManager type="ViewManager">ViewManager</viewManager>"#,
        "<about><name>VMware ESXi</name><fullName>VMware ESXi 7.0.3 stub</fullName>",
        "<apiType>HostAgent</apiType><apiVersion>7.0.3.0</apiVersion></about>",
        r#"<sessionManager type="SessionManager">ha-sessionmgr</sessionManager>"#,
        "</returnval></RetrieveServiceContentResponse>"
    ))
}

pub fn login(username: &str) -> String {
    envelope(&format!(
        concat!(
            r#"<LoginResponse xmlns="urn:vim25"><returnval><key>stub-session</key>"#,
            "<userName>{}</userName><fullName>{}</fullName></returnval></LoginResponse>"
        ),
        escape_str_pcdata(username),
        escape_str_pcdata(username)
    ))
}

pub fn container_view(id: u64) -> String {
    envelope(&format!(
        r#"<CreateContainerViewResponse xmlns="urn:vim25"><returnval type="ContainerView">session[stub]view-{id}</returnval></CreateContainerViewResponse>"#
    ))
}

/// `hosts` is the current page; `offset` numbers the objects, `token` marks more pages.
pub fn properties(operation: &str, hosts: &[StubHost], offset: usize, token: Option<&str>) -> String {
    if hosts.is_empty() && token.is_none() {
        return envelope(&format!(r#"<{operation}Response xmlns="urn:vim25"/>"#));
    }
    let objects: String = hosts
        .iter()
        .enumerate()
        .map(|(i, h)| h.object_content(offset + i))
        .collect();
    let token = token
        .map(|t| format!("<token>{t}</token>"))
        .unwrap_or_default();
    envelope(&format!(
        r#"<{operation}Response xmlns="urn:vim25"><returnval>{objects}{token}</returnval></{operation}Response>"#
    ))
}

pub fn empty(operation: &str) -> String {
    envelope(&format!(r#"<{operation}Response xmlns="urn:vim25"></{operation}Response>"#))
}

pub fn fault(message: &str, detail: &str) -> String {
    envelope(&format!(
        concat!(
            "<soapenv:Fault><faultcode>ServerFaultCode</faultcode>",
            "<faultstring>{}</faultstring>",
            r#"<detail><{} xmlns="urn:vim25" xsi:type="{}"/></detail></soapenv:Fault>"#
        ),
        escape_str_pcdata(message),
        detail,
        detail
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_host_document() {
        let xml = properties("RetrievePropertiesEx", &[StubHost::reference("esx-a")], 0, None);
        assert!(xml.contains("<config><name>esx-a</name>"));
        assert!(xml.contains("<numCpuCores>4</numCpuCores>"));
        assert!(xml.contains("<overallMemoryUsage>4096</overallMemoryUsage>"));
        assert!(!xml.contains("<token>"));
    }

    #[test]
    fn test_paged_document_carries_token() {
        let xml = properties("RetrievePropertiesEx", &[StubHost::reference("esx-a")], 0, Some("1"));
        assert!(xml.contains("<token>1</token>"));
    }

    #[test]
    fn test_empty_inventory_has_no_returnval() {
        let xml = properties("RetrievePropertiesEx", &[], 0, None);
        assert!(!xml.contains("returnval"));
    }

    #[test]
    fn test_host_name_is_escaped() {
        let xml = properties("RetrievePropertiesEx", &[StubHost::reference("a&b")], 0, None);
        assert!(xml.contains("<config><name>a&amp;b</name>"));
    }

    #[test]
    fn test_fault_document() {
        let xml = fault("Cannot complete login", "InvalidLogin");
        assert!(xml.contains("<faultstring>Cannot complete login</faultstring>"));
        assert!(xml.contains(r#"xsi:type="InvalidLogin""#));
    }
}
