//! Text exposition of one scrape's observations.
//!
//! A fresh `prometheus::Registry` is built per scrape, with one `GaugeVec`
//! per distinct metric name, so nothing from a previous scrape can leak into
//! the next one.

use crate::models::{Observation, ValueKind, LABEL_NAMES, NAMESPACE};
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub fn render(observations: &[Observation]) -> Result<String, prometheus::Error> {
    let registry = Registry::new();
    let mut families: BTreeMap<&'static str, GaugeVec> = BTreeMap::new();

    for obs in observations {
        let vec = match families.entry(obs.name) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let vec = match obs.kind {
                    ValueKind::Gauge => GaugeVec::new(
                        Opts::new(obs.name, obs.help).namespace(NAMESPACE),
                        &LABEL_NAMES,
                    )?,
                };
                registry.register(Box::new(vec.clone()))?;
                entry.insert(vec)
            }
        };
        vec.get_metric_with_label_values(&obs.labels.values())?
            .set(obs.value);
    }

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
