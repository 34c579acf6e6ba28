//! Telemetry events emitted by the request pipeline.
//!
//! Every property map passed to a [`TelemetrySink`] has already been through
//! [`scrub_map`](crate::scrub::scrub_map).

use std::sync::{Mutex, PoisonError};

use serde_json::{Map, Value};

/// Event names.
pub mod events {
    /// A request attempt is about to be dispatched.
    pub const API_REQUEST: &str = "api_request";
    /// A 2xx response was received.
    pub const API_RESPONSE_SUCCESS: &str = "api_response_success";
    /// A request failed terminally.
    pub const API_RESPONSE_ERROR: &str = "api_response_error";
    /// An attempt got no response.
    pub const API_NETWORK_ERROR: &str = "api_network_error";
    /// A failed attempt is retried after a delay.
    pub const API_RETRY: &str = "api_retry";
    /// The local rate limiter refused a request.
    pub const API_RATE_LIMIT_EXCEEDED: &str = "api_rate_limit_exceeded";
}

/// Receives telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Record one event.
    fn track_event(&self, name: &str, properties: &Map<String, Value>);
}

/// Sink forwarding events to `tracing` under the
/// `penguin_api_client::telemetry` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn track_event(&self, name: &str, properties: &Map<String, Value>) {
        let properties = serde_json::to_string(properties).unwrap_or_default();
        tracing::info!(
            target: "penguin_api_client::telemetry",
            event = name,
            properties = %properties,
            "telemetry event"
        );
    }
}

/// A recorded event.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    /// Event name
    pub name: String,
    /// Scrubbed properties
    pub properties: Map<String, Value>,
}

/// Sink keeping events in memory, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far, oldest first.
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events with the given name.
    pub fn events_named(&self, name: &str) -> Vec<TelemetryEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.name == name)
            .collect()
    }

    /// Number of events with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|event| event.name == name)
            .count()
    }

    /// Forget all recorded events.
    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl TelemetrySink for RecordingSink {
    fn track_event(&self, name: &str, properties: &Map<String, Value>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(TelemetryEvent {
                name: name.to_string(),
                properties: properties.clone(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        let props = json!({"request_id": "r-1"});
        let props = props.as_object().unwrap();

        sink.track_event(events::API_REQUEST, props);
        sink.track_event(events::API_RETRY, props);
        sink.track_event(events::API_RETRY, props);

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.count(events::API_RETRY), 2);
        assert_eq!(sink.events_named(events::API_REQUEST)[0].properties["request_id"], "r-1");

        sink.clear();
        assert!(sink.events().is_empty());
    }
}
