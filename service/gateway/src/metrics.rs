//! Per §4.3's "Metrics" list: connection outcome counters, an active
//! connection gauge, and a connection-duration histogram, exported over
//! `/metrics` in Prometheus text format.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelValue;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicI64;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    Success,
    NoCert,
    NoToken,
    LookupFailed,
    WorkerConnectFailed,
    HandshakeFailed,
    NonTls,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
struct OutcomeLabels {
    outcome: Outcome,
}

pub struct Metrics {
    connections: Family<OutcomeLabels, Counter>,
    active_connections: Gauge<i64, AtomicI64>,
    connection_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new(registry: &mut Registry) -> Self {
        let connections = Family::default();
        registry.register(
            "gateway_connections_total",
            "Count of proxied connections by terminal outcome",
            connections.clone(),
        );

        let active_connections = Gauge::default();
        registry.register(
            "gateway_active_connections",
            "Connections currently being proxied",
            active_connections.clone(),
        );

        let connection_duration_seconds = Histogram::new(
            [0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 300.0, 1800.0, 3600.0, 21600.0].into_iter(),
        );
        registry.register(
            "gateway_connection_duration_seconds",
            "Wall-clock duration of proxied connections",
            connection_duration_seconds.clone(),
        );

        Metrics {
            connections,
            active_connections,
            connection_duration_seconds,
        }
    }

    pub fn record(&self, outcome: Outcome) {
        self.connections.get_or_create(&OutcomeLabels { outcome }).inc();
    }

    pub fn connection_started(&self) {
        self.active_connections.inc();
    }

    pub fn connection_finished(&self, duration_secs: f64) {
        self.active_connections.dec();
        self.connection_duration_seconds.observe(duration_secs);
    }
}

pub fn encode_text(registry: &Registry) -> String {
    let mut buf = String::new();
    encode(&mut buf, registry).expect("writing to a String buffer never fails");
    buf
}
