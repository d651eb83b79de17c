//! Typed observations and the host summary they are derived from.
//!
//! A successful query turns every `HostSystem` summary into eight gauges;
//! a failed connect or query turns the host into the single `status = 5`
//! sentinel. Both paths share the same label set so the exposition layer
//! never sees two label schemas for one metric name.

use tracing::warn;

/// Prefix applied to every exposed metric name (`esxi_status`, ...).
pub const NAMESPACE: &str = "esxi";

/// Label names carried by every observation, in exposition order.
pub const LABEL_NAMES: [&str; 2] = ["address", "name"];

pub const STATUS_HELP: &str =
    "Gauge metric with ESXI server status(1:green,2:gray,3:yellow,4:red,5:connection fail)";
const UPTIME_HELP: &str = "Gauge metric with uptime info (unit: hours)";
const CPU_HELP: &str = "Gauge metric with cpu info (unit: MHz)";
const CPU_RATE_HELP: &str = "Gauge metric with cpu rate";
const MEMORY_HELP: &str = "Gauge metric with memory info (unit: bytes)";
const MEMORY_RATE_HELP: &str = "Gauge metric with memory rate";

const BYTES_PER_MB: i64 = 1024 * 1024;
const SECONDS_PER_HOUR: i64 = 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Gauge,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostLabels {
    pub address: String,
    /// Display name reported by the host; empty on the failure path.
    pub name: String,
}

impl HostLabels {
    pub fn values(&self) -> [&str; 2] {
        [self.address.as_str(), self.name.as_str()]
    }
}

/// One named, labeled sample destined for the metrics endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub name: &'static str,
    pub value: f64,
    pub help: &'static str,
    pub kind: ValueKind,
    pub labels: HostLabels,
}

impl Observation {
    fn gauge(name: &'static str, help: &'static str, value: f64, labels: &HostLabels) -> Self {
        Self {
            name,
            value,
            help,
            kind: ValueKind::Gauge,
            labels: labels.clone(),
        }
    }

    /// Observation standing in for a host that could not be scraped.
    pub fn connection_failure(address: &str) -> Self {
        Self::gauge(
            "status",
            STATUS_HELP,
            HostStatus::ConnectionFailed.ordinal(),
            &HostLabels {
                address: address.to_string(),
                name: String::new(),
            },
        )
    }

    pub fn is_connection_failure(&self) -> bool {
        self.name == "status"
            && self.value == HostStatus::ConnectionFailed.ordinal()
            && self.labels.name.is_empty()
    }
}

/// `ManagedEntityStatus` as reported in `summary.overallStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Green,
    Gray,
    Yellow,
    Red,
    /// Unknown status strings and unreachable hosts both land here.
    ConnectionFailed,
}

impl HostStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "green" => HostStatus::Green,
            "gray" => HostStatus::Gray,
            "yellow" => HostStatus::Yellow,
            "red" => HostStatus::Red,
            _ => HostStatus::ConnectionFailed,
        }
    }

    pub fn ordinal(self) -> f64 {
        match self {
            HostStatus::Green => 1.0,
            HostStatus::Gray => 2.0,
            HostStatus::Yellow => 3.0,
            HostStatus::Red => 4.0,
            HostStatus::ConnectionFailed => 5.0,
        }
    }
}

/// The subset of `HostListSummary` the exporter reports on.
#[derive(Debug, Clone, PartialEq)]
pub struct HostSummary {
    /// Managed object id (`ha-host`, `host-42`), unique behind one address.
    pub id: String,
    pub name: String,
    pub status: HostStatus,
    pub uptime_seconds: i64,
    pub cpu_mhz: i64,
    pub num_cpu_cores: i64,
    pub cpu_usage_mhz: i64,
    pub memory_size_bytes: i64,
    pub memory_usage_mb: i64,
}

impl HostSummary {
    pub fn cpu_total_mhz(&self) -> i64 {
        self.cpu_mhz * self.num_cpu_cores
    }

    pub fn memory_usage_bytes(&self) -> i64 {
        self.memory_usage_mb * BYTES_PER_MB
    }

    /// Whole hours, truncated.
    pub fn uptime_hours(&self) -> i64 {
        self.uptime_seconds / SECONDS_PER_HOUR
    }

    /// The eight gauges for this host, all labeled with `address`.
    pub fn observations(&self, address: &str) -> Vec<Observation> {
        let labels = HostLabels {
            address: address.to_string(),
            name: self.name.clone(),
        };

        let cpu_total = self.cpu_total_mhz() as f64;
        let cpu_usage = self.cpu_usage_mhz as f64;
        let memory_total = self.memory_size_bytes as f64;
        let memory_usage = self.memory_usage_bytes() as f64;

        let cpu_rate = ratio(cpu_usage, cpu_total);
        if cpu_rate.is_nan() {
            warn!(address, host = %self.name, "host reports zero cpu capacity, cpu_usage_rate is NaN");
        }
        let memory_rate = ratio(memory_usage, memory_total);
        if memory_rate.is_nan() {
            warn!(address, host = %self.name, "host reports zero memory size, memory_usage_rate is NaN");
        }

        vec![
            Observation::gauge("status", STATUS_HELP, self.status.ordinal(), &labels),
            Observation::gauge("uptime", UPTIME_HELP, self.uptime_hours() as f64, &labels),
            Observation::gauge("cpu_total", CPU_HELP, cpu_total, &labels),
            Observation::gauge("cpu_usage", CPU_HELP, cpu_usage, &labels),
            Observation::gauge("cpu_usage_rate", CPU_RATE_HELP, cpu_rate, &labels),
            Observation::gauge("memory_total", MEMORY_HELP, memory_total, &labels),
            Observation::gauge("memory_usage", MEMORY_HELP, memory_usage, &labels),
            Observation::gauge("memory_usage_rate", MEMORY_RATE_HELP, memory_rate, &labels),
        ]
    }
}

/// `used / total`, NaN when the capacity is zero.
fn ratio(used: f64, total: f64) -> f64 {
    if total == 0.0 {
        f64::NAN
    } else {
        used / total
    }
}
