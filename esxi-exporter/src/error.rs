use std::time::Duration;

/// Failures of the vSphere SOAP transport.
#[derive(Debug, thiserror::Error)]
pub enum VimError {
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SOAP fault from {operation}: {message}")]
    Fault { operation: &'static str, message: String },

    #[error("{operation} returned HTTP {status}")]
    Status { operation: &'static str, status: u16 },

    #[error("cannot decode {operation} response: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_xml_rs::Error,
    },
}

/// Per-host failure taxonomy. Every variant is downgraded to the
/// connection-failure sentinel by the host client.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("cannot connect to {address}: {source}")]
    Connection {
        address: String,
        #[source]
        source: VimError,
    },

    #[error("summary query on {address} failed: {reason}")]
    Query { address: String, reason: String },

    #[error("logout from {address} failed: {reason}")]
    Disconnect { address: String, reason: String },

    #[error("{stage} on {address} timed out after {after:?}")]
    Timeout {
        address: String,
        stage: &'static str,
        after: Duration,
    },
}

impl HostError {
    pub fn query(address: &str, source: impl std::fmt::Display) -> Self {
        HostError::Query {
            address: address.to_string(),
            reason: source.to_string(),
        }
    }

    pub fn disconnect(address: &str, source: impl std::fmt::Display) -> Self {
        HostError::Disconnect {
            address: address.to_string(),
            reason: source.to_string(),
        }
    }
}

pub type Result<T, E = HostError> = std::result::Result<T, E>;
