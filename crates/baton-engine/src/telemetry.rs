// Best-effort telemetry recorder
//
// Every state transition and token lifecycle event produces one row. A failed
// append must never fail the operation that produced it, so errors are logged
// and swallowed here.

use baton_store::telemetry_store::{self, NewEvent};
use baton_store::{now_ms, Database};
use tracing::warn;

#[derive(Clone)]
pub struct TelemetryRecorder {
    db: Database,
}

impl TelemetryRecorder {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append one event; failures are demoted to a process-log warning
    pub async fn record(&self, event: NewEvent) {
        if let Err(e) = telemetry_store::append(self.db.writer(), &event, now_ms()).await {
            warn!(event_type = %event.event_type, "failed to append telemetry event: {}", e);
        }
    }

    /// Append several events in order
    pub async fn record_all(&self, events: Vec<NewEvent>) {
        for event in events {
            self.record(event).await;
        }
    }
}
