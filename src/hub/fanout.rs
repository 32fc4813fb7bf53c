//! Registry of downstream clients and best-effort broadcast

use super::types::{BroadcastReport, ClientId, DownstreamClient, HubError, PricesFrame};
use crate::extractor::PriceRecord;
use crate::telemetry::{self, CounterMetric, GaugeMetric};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

/// Shared set of registered downstream clients.
///
/// Cloning yields another handle to the same registry. The lock is only
/// held for non-blocking operations and never across an await point.
#[derive(Debug, Clone, Default)]
pub struct FanoutHub {
    clients: Arc<Mutex<HashMap<ClientId, DownstreamClient>>>,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client; it receives every broadcast from now on
    pub fn register(&self, client: DownstreamClient) -> ClientId {
        let id = ClientId::new();
        let count = {
            let mut clients = self.clients.lock();
            clients.insert(id, client);
            clients.len()
        };

        telemetry::set_gauge(GaugeMetric::ConnectedClients, count as f64);
        tracing::info!(client = %id, clients = count, "Client registered");
        id
    }

    /// Remove a client. Returns false if it was already gone.
    pub fn unregister(&self, id: ClientId) -> bool {
        let (removed, count) = {
            let mut clients = self.clients.lock();
            let removed = clients.remove(&id);
            (removed, clients.len())
        };

        telemetry::set_gauge(GaugeMetric::ConnectedClients, count as f64);
        match removed {
            Some(client) => {
                let session_secs = (Utc::now() - client.connected_at).num_seconds();
                tracing::info!(
                    client = %id,
                    peer = ?client.peer,
                    session_secs,
                    clients = count,
                    "Client unregistered"
                );
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.clients.lock().contains_key(&id)
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Drop every client
    pub fn clear(&self) {
        let dropped = {
            let mut clients = self.clients.lock();
            let n = clients.len();
            clients.clear();
            n
        };
        telemetry::set_gauge(GaugeMetric::ConnectedClients, 0.0);
        if dropped > 0 {
            tracing::info!(clients = dropped, "Cleared all clients");
        }
    }

    /// Serialize a record to the `{"prices":[v]}` wire shape
    pub fn encode(record: &PriceRecord) -> String {
        let frame = PricesFrame {
            prices: vec![record.value],
        };
        // A Vec<u64> always serializes
        serde_json::to_string(&frame).unwrap_or_default()
    }

    /// Send a record to every registered client.
    ///
    /// Full queues drop this frame for that client only. Closed queues are
    /// treated as a disconnect and the client is removed.
    pub fn broadcast(&self, record: &PriceRecord) -> BroadcastReport {
        let payload = Self::encode(record);
        let mut report = BroadcastReport::default();

        let remaining = {
            let mut clients = self.clients.lock();
            for (id, client) in clients.iter() {
                match client.outbound.try_send(payload.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => report.dropped += 1,
                    Err(TrySendError::Closed(_)) => {
                        report.failures.push(HubError::SendFailure { client: *id });
                    }
                }
            }
            for failure in &report.failures {
                clients.remove(&failure.client());
            }
            clients.len()
        };

        for failure in &report.failures {
            tracing::debug!(error = %failure, "Removed client after send failure");
        }
        if report.dropped > 0 {
            tracing::debug!(dropped = report.dropped, "Client queues full, frame dropped");
        }
        if report.removed() > 0 {
            telemetry::set_gauge(GaugeMetric::ConnectedClients, remaining as f64);
        }

        telemetry::increment_by(CounterMetric::Deliveries, report.delivered as u64);
        telemetry::increment_by(CounterMetric::DroppedSends, report.dropped as u64);
        telemetry::increment_by(CounterMetric::SendFailures, report.removed() as u64);

        tracing::trace!(
            symbol = %record.symbol,
            value = record.value,
            delivered = report.delivered,
            "Broadcast price"
        );

        report
    }
}
