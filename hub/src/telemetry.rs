use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use cerberus_event_bus::{EventPublisher, EventRecord};
use cerberus_logging::{JsonLogger, LogLevel, LogRecord, LogSink};
use serde_json::Value;

/// Builder for hub telemetry sinks.
pub struct HubTelemetryBuilder {
    component: String,
    log_path: Option<PathBuf>,
    log_sink: Option<Arc<dyn LogSink>>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
}

impl HubTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            log_path: None,
            log_sink: None,
            event_publisher: None,
        }
    }

    /// Appends JSON lines to `path`. Ignored when a sink is injected.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Uses an existing sink.
    #[must_use]
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Builds the telemetry handle, opening the log file if one was requested.
    pub fn build(self) -> Result<HubTelemetry> {
        let logger = match (self.log_sink, self.log_path) {
            (Some(sink), _) => Some(sink),
            (None, Some(path)) => Some(Arc::new(JsonLogger::new(path)?) as Arc<dyn LogSink>),
            (None, None) => None,
        };
        Ok(HubTelemetry {
            inner: Arc::new(TelemetryInner {
                component: self.component,
                logger,
                publisher: self.event_publisher,
            }),
        })
    }
}

/// Telemetry handle shared by the hub; cheap to clone.
#[derive(Clone)]
pub struct HubTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for HubTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubTelemetry")
            .field("component", &self.inner.component)
            .field("logger", &self.inner.logger.is_some())
            .field("publisher", &self.inner.publisher.is_some())
            .finish()
    }
}

struct TelemetryInner {
    component: String,
    logger: Option<Arc<dyn LogSink>>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl HubTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(component: impl Into<String>) -> HubTelemetryBuilder {
        HubTelemetryBuilder::new(component)
    }

    /// Writes a structured log record.
    pub fn log(&self, level: LogLevel, event: &str, fields: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            logger.write(&LogRecord::new(&self.inner.component, level, event).with_fields(fields))?;
        }
        Ok(())
    }

    /// Publishes a lifecycle event.
    pub async fn event(&self, kind: &str, payload: Value) -> Result<()> {
        if let Some(publisher) = &self.inner.publisher {
            publisher
                .publish(EventRecord::new(&self.inner.component, kind, payload))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cerberus_event_bus::MemoryEventBus;
    use cerberus_logging::MemoryLogger;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn telemetry_writes_log_and_event() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("hub.log");
        let bus = Arc::new(MemoryEventBus::new(16));
        let telemetry = HubTelemetry::builder("hub")
            .log_path(&path)
            .event_publisher(bus.clone())
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Warn, "hub.guardian.spawned", json!({ "pool_size": 6 }))
            .unwrap();
        telemetry
            .event("hub.guardian.spawned", json!({ "pool_size": 6 }))
            .await
            .unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("hub.guardian.spawned"));
        assert_eq!(bus.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn injected_sink_wins_over_path() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("unused.log");
        let sink = Arc::new(MemoryLogger::new());
        let telemetry = HubTelemetry::builder("hub")
            .log_path(&path)
            .log_sink(sink.clone())
            .build()
            .unwrap();
        telemetry.log(LogLevel::Info, "x", Value::Null).unwrap();
        assert_eq!(sink.records().len(), 1);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn empty_telemetry_is_a_no_op() {
        let telemetry = HubTelemetry::builder("hub").build().unwrap();
        telemetry.log(LogLevel::Error, "x", json!({})).unwrap();
        telemetry.event("x", json!({})).await.unwrap();
    }
}
