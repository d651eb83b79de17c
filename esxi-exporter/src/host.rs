//! Host client: one short-lived session per host per scrape.
//!
//! `HostBackend` is the seam between the scrape logic and the remote API.
//! Production uses [`VsphereBackend`]; tests plug in in-memory backends.

use crate::config::{HostTarget, Scheme};
use crate::error::{HostError, Result};
use crate::models::{HostStatus, HostSummary, Observation};
use crate::vsphere::{HostSystem, VimSession};
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[async_trait]
pub trait HostBackend: Send + Sync + 'static {
    async fn connect(&self, target: &HostTarget) -> Result<Box<dyn HostSession>>;
}

#[async_trait]
pub trait HostSession: Send {
    /// One read of the host summary data.
    async fn query_summaries(&mut self) -> Result<Vec<HostSummary>>;

    async fn disconnect(&mut self) -> Result<()>;
}

/// Talks vim25 SOAP to `<scheme>://<address>/sdk`.
pub struct VsphereBackend {
    scheme: Scheme,
}

impl VsphereBackend {
    pub fn new(scheme: Scheme) -> Self {
        Self { scheme }
    }
}

#[async_trait]
impl HostBackend for VsphereBackend {
    async fn connect(&self, target: &HostTarget) -> Result<Box<dyn HostSession>> {
        let url = target.sdk_url(self.scheme);
        let session = VimSession::login(&url, &target.username, &target.password)
            .await
            .map_err(|source| HostError::Connection {
                address: target.address.clone(),
                source,
            })?;
        Ok(Box::new(VsphereHostSession {
            address: target.address.clone(),
            session,
        }))
    }
}

struct VsphereHostSession {
    address: String,
    session: VimSession,
}

#[async_trait]
impl HostSession for VsphereHostSession {
    async fn query_summaries(&mut self) -> Result<Vec<HostSummary>> {
        let summaries = self
            .session
            .host_summaries()
            .await
            .map_err(|e| HostError::query(&self.address, e))?;
        Ok(summaries.into_iter().map(HostSummary::from).collect())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.session
            .logout()
            .await
            .map_err(|e| HostError::disconnect(&self.address, e))
    }
}

impl From<HostSystem> for HostSummary {
    fn from(host: HostSystem) -> Self {
        let raw = host.summary;
        HostSummary {
            id: host.id,
            name: raw.config.name,
            status: HostStatus::parse(&raw.overall_status),
            uptime_seconds: raw.quick_stats.uptime,
            cpu_mhz: raw.hardware.cpu_mhz,
            num_cpu_cores: raw.hardware.num_cpu_cores,
            cpu_usage_mhz: raw.quick_stats.overall_cpu_usage,
            memory_size_bytes: raw.hardware.memory_size,
            memory_usage_mb: raw.quick_stats.overall_memory_usage,
        }
    }
}

type PendingLogin = JoinHandle<Result<Box<dyn HostSession>>>;

/// How long a login that missed its deadline may still take before it is abandoned.
const LATE_LOGIN_GRACE: Duration = Duration::from_secs(30);

/// Produces the observation set of one host for one scrape.
#[derive(Clone)]
pub struct HostClient {
    backend: Arc<dyn HostBackend>,
    connect_timeout: Duration,
    query_timeout: Duration,
}

impl HostClient {
    pub fn new(backend: Arc<dyn HostBackend>, connect_timeout: Duration, query_timeout: Duration) -> Self {
        Self {
            backend,
            connect_timeout,
            query_timeout,
        }
    }

    /// Login bounded by the connect timeout. A login that completes after the
    /// deadline is logged out in the background so the session does not linger on the host.
    pub async fn connect(&self, target: &HostTarget) -> Result<Box<dyn HostSession>> {
        let backend = self.backend.clone();
        let owned = target.clone();
        let mut login: PendingLogin = tokio::spawn(async move { backend.connect(&owned).await });

        match timeout(self.connect_timeout, &mut login).await {
            Ok(Ok(result)) => result,
            // never aborted here, so the join error is a backend panic: hand it to the caller's task
            Ok(Err(join)) => std::panic::resume_unwind(join.into_panic()),
            Err(_) => {
                self.close_late_login(target, login);
                Err(HostError::Timeout {
                    address: target.address.clone(),
                    stage: "connect",
                    after: self.connect_timeout,
                })
            }
        }
    }

    fn close_late_login(&self, target: &HostTarget, mut login: PendingLogin) {
        let address = target.address.clone();
        let logout_timeout = self.connect_timeout;
        tokio::spawn(async move {
            match timeout(LATE_LOGIN_GRACE, &mut login).await {
                Ok(Ok(Ok(mut session))) => {
                    info!(%address, "login completed after the deadline, closing the session");
                    match timeout(logout_timeout, session.disconnect()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => warn!(%address, error = %e, "late logout failed"),
                        Err(_) => warn!(%address, "late logout timed out"),
                    }
                }
                Ok(_) => {}
                Err(_) => login.abort(),
            }
        });
    }

    /// Queries the summaries and converts them; an empty inventory is a query failure.
    /// Host names must be unique behind one address: later duplicates are dropped.
    pub async fn collect_metrics(
        &self,
        target: &HostTarget,
        session: &mut dyn HostSession,
    ) -> Result<Vec<Observation>> {
        let summaries = bounded(target, "query", self.query_timeout, session.query_summaries()).await?;
        if summaries.is_empty() {
            return Err(HostError::query(&target.address, "no HostSystem in inventory"));
        }

        let mut names = HashSet::new();
        let mut observations = Vec::new();
        for summary in &summaries {
            if !names.insert(summary.name.as_str()) {
                warn!(
                    address = %target.address,
                    host = %summary.name,
                    id = %summary.id,
                    "duplicate host name behind this address, keeping the first one"
                );
                continue;
            }
            observations.extend(summary.observations(&target.address));
        }
        debug!(address = %target.address, hosts = names.len(), "summary converted");
        Ok(observations)
    }

    pub async fn disconnect(&self, target: &HostTarget, session: &mut dyn HostSession) -> Result<()> {
        bounded(target, "disconnect", self.connect_timeout, session.disconnect()).await
    }

    /// Full per-host cycle. Never fails: every error becomes the sentinel.
    pub async fn scrape(&self, target: &HostTarget) -> Vec<Observation> {
        info!(address = %target.address, "start grab monitor data");

        let mut session = match self.connect(target).await {
            Ok(session) => session,
            Err(e) => {
                warn!(address = %target.address, error = %e, "connection failed");
                return vec![Observation::connection_failure(&target.address)];
            }
        };

        let observations = match self.collect_metrics(target, session.as_mut()).await {
            Ok(observations) => observations,
            Err(e) => {
                warn!(address = %target.address, error = %e, "query failed");
                vec![Observation::connection_failure(&target.address)]
            }
        };

        if let Err(e) = self.disconnect(target, session.as_mut()).await {
            warn!(address = %target.address, error = %e, "logout failed");
        }
        observations
    }
}

async fn bounded<T>(
    target: &HostTarget,
    stage: &'static str,
    after: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(HostError::Timeout {
            address: target.address.clone(),
            stage,
            after,
        }),
    }
}
