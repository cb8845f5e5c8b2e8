//! Tracing layer that turns analytics events into channel messages.
//!
//! Stores emit analytics as ordinary `tracing` events on
//! [`ANALYTICS_TARGET`]. Installing [`AnalyticsLayer`] forwards those events to
//! a tokio channel so the host can ship them wherever it likes.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Target used by every analytics event.
pub const ANALYTICS_TARGET: &str = "shifter::analytics";

/// Analytics event as delivered to the host.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsEvent {
    /// Value of the `event` field (e.g. "energy_activated").
    pub name: String,
    pub level: String,
    pub message: String,
    pub fields: HashMap<String, Value>,
    pub timestamp: String,
}

impl AnalyticsEvent {
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Layer forwarding [`ANALYTICS_TARGET`] events; everything else is ignored.
pub struct AnalyticsLayer {
    sender: mpsc::UnboundedSender<AnalyticsEvent>,
}

impl AnalyticsLayer {
    pub fn new(sender: mpsc::UnboundedSender<AnalyticsEvent>) -> Self {
        Self { sender }
    }

    /// Creates a layer together with the receiving end of its channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AnalyticsEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl<S> Layer<S> for AnalyticsLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != ANALYTICS_TARGET {
            return;
        }

        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));

        let message = fields
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        let name = fields
            .get("event")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| message.clone());

        let analytics_event = AnalyticsEvent {
            name,
            level: event.metadata().level().to_string(),
            message,
            fields,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        // Receiver gone means nobody is listening; drop the event.
        let _ = self.sender.send(analytics_event);
    }
}

/// Collects event fields into JSON values.
struct FieldVisitor<'a>(&'a mut HashMap<String, Value>);

impl tracing::field::Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0.insert(
            field.name().to_string(),
            serde_json::json!(format!("{:?}", value)),
        );
    }
}
