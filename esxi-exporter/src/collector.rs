/**
 * COLLECTOR - Cycle de scrape complet sur tous les hôtes configurés
 *
 * RÔLE : une tâche tokio par hôte, toutes lancées en parallèle, puis barrière
 * de jointure : le scrape n'est terminé que lorsque chaque hôte a été tenté.
 *
 * FONCTIONNEMENT :
 * - la liste d'hôtes est injectée à la construction (config statique)
 * - chaque tâche pousse ses observations dans un buffer partagé
 * - une tâche qui panique est remplacée par la sentinelle de son adresse
 * - aucune erreur d'hôte ne remonte : au pire, tous les hôtes valent status=5
 */

use crate::config::HostTarget;
use crate::host::HostClient;
use crate::models::Observation;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

#[derive(Clone)]
pub struct Collector {
    targets: Arc<Vec<HostTarget>>,
    client: HostClient,
}

impl Collector {
    pub fn new(targets: Vec<HostTarget>, client: HostClient) -> Self {
        Self {
            targets: Arc::new(targets),
            client,
        }
    }

    /// One scrape cycle. Returns only once every per-host task has finished.
    pub async fn collect(&self) -> Vec<Observation> {
        let started = Instant::now();
        let buffer: Arc<Mutex<Vec<Observation>>> = Arc::new(Mutex::new(Vec::new()));

        let mut tasks = Vec::with_capacity(self.targets.len());
        for target in self.targets.iter().cloned() {
            let client = self.client.clone();
            let buffer = buffer.clone();
            let address = target.address.clone();
            let task = tokio::spawn(async move {
                let observations = client.scrape(&target).await;
                buffer.lock().extend(observations);
            });
            tasks.push((address, task));
        }

        // barrière : on attend toutes les tâches, pas la première
        for (address, task) in tasks {
            if let Err(e) = task.await {
                error!(%address, error = %e, "host task aborted");
                buffer.lock().push(Observation::connection_failure(&address));
            }
        }

        let observations = std::mem::take(&mut *buffer.lock());
        let failed = observations.iter().filter(|o| o.is_connection_failure()).count();
        info!(
            hosts = self.targets.len(),
            failed,
            observations = observations.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scrape finished"
        );
        observations
    }
}
