//! Shared logging utilities for consistent tracing across engine components

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, Event, Subscriber};
use tracing_subscriber::layer::Context;

/// Engine component that emitted a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Component {
    Engine,
    Miner,
    Interpreter,
    Orchestrator,
    Verification,
    Scheduler,
    Persistence,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::Engine => "engine",
            Component::Miner => "miner",
            Component::Interpreter => "interpreter",
            Component::Orchestrator => "orchestrator",
            Component::Verification => "verification",
            Component::Scheduler => "scheduler",
            Component::Persistence => "persistence",
        };
        write!(f, "{name}")
    }
}

/// Tracing endpoint configuration
#[derive(Debug, Clone)]
pub struct TracingEndpoint {
    pub url: String,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl TracingEndpoint {
    pub fn new(url: String) -> Self {
        Self {
            url,
            batch_size: 20,
            flush_interval: Duration::from_millis(500),
        }
    }
}

/// Structured trace event shipped to a collector
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TraceEvent {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
    pub component: String,
    pub fields: HashMap<String, serde_json::Value>,
}

/// Tracing layer that batches component events and posts them to an HTTP collector
pub struct HttpTracingLayer {
    sender: mpsc::UnboundedSender<TraceEvent>,
}

impl HttpTracingLayer {
    /// Must be called from inside a tokio runtime
    pub fn new(endpoint: TracingEndpoint) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<TraceEvent>();

        tokio::spawn(async move {
            let client = reqwest::Client::new();
            let mut buffer = Vec::with_capacity(endpoint.batch_size);
            let mut flush_timer = tokio::time::interval(endpoint.flush_interval);

            loop {
                tokio::select! {
                    event = rx.recv() => {
                        match event {
                            Some(event) => {
                                buffer.push(event);
                                if buffer.len() >= endpoint.batch_size {
                                    Self::send_batch(&client, &endpoint.url, &mut buffer).await;
                                }
                            }
                            None => {
                                if !buffer.is_empty() {
                                    Self::send_batch(&client, &endpoint.url, &mut buffer).await;
                                }
                                break;
                            }
                        }
                    }
                    _ = flush_timer.tick() => {
                        if !buffer.is_empty() {
                            Self::send_batch(&client, &endpoint.url, &mut buffer).await;
                        }
                    }
                }
            }
        });

        HttpTracingLayer { sender: tx }
    }

    async fn send_batch(client: &reqwest::Client, url: &str, buffer: &mut Vec<TraceEvent>) {
        let batch = std::mem::take(buffer);

        // Logging through tracing here would feed the layer back into itself
        match client.post(url).json(&batch).send().await {
            Ok(response) if !response.status().is_success() => {
                eprintln!("Failed to ship {} trace events: HTTP {}", batch.len(), response.status());
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("Failed to ship {} trace events: {e}", batch.len());
            }
        }
    }
}

impl<S> tracing_subscriber::Layer<S> for HttpTracingLayer
where
    S: Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut fields = HashMap::new();
        let mut message = String::new();

        let mut visitor = TraceVisitor {
            message: &mut message,
            fields: &mut fields,
        };
        event.record(&mut visitor);

        // Only events emitted through the component_* macros are shipped
        let component = match fields.remove("component") {
            Some(serde_json::Value::String(component)) => component,
            _ => return,
        };

        let trace_event = TraceEvent {
            timestamp: Utc::now(),
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message,
            component,
            fields,
        };

        let _ = self.sender.send(trace_event);
    }
}

/// Visitor to extract event fields and message
struct TraceVisitor<'a> {
    message: &'a mut String,
    fields: &'a mut HashMap<String, serde_json::Value>,
}

impl tracing::field::Visit for TraceVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message.push_str(&format!("{value:?}"));
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::String(format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.fields
                .insert(field.name().to_string(), serde_json::Value::String(value.to_string()));
        }
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        self.fields.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(field.name().to_string(), serde_json::json!(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields.insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

fn level_filter(log_level: Option<&str>) -> String {
    let base_level = log_level.unwrap_or("info");
    format!("labeler={base_level},shared={base_level},reqwest=warn")
}

/// Initialize tracing with an optional collector endpoint and log level
///
/// `RUST_LOG` takes precedence over the computed filter when set.
pub fn init_tracing(log_level: Option<&str>, endpoint: Option<TracingEndpoint>) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = level_filter(log_level);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter));

    match endpoint {
        Some(endpoint) => {
            let url = endpoint.url.clone();
            let fmt_layer = fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact();

            tracing_subscriber::registry()
                .with(env_filter)
                .with(HttpTracingLayer::new(endpoint))
                .with(fmt_layer)
                .init();
            info!("Tracing endpoint configured: {}", url);
        }
        None => {
            let fmt_layer = fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact();

            tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
        }
    }
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for component-aware info logging
#[macro_export]
macro_rules! component_info {
    ($component:expr, $($arg:tt)*) => {
        tracing::info!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        )
    };
}

/// Macro for component-aware warning logging
#[macro_export]
macro_rules! component_warn {
    ($component:expr, $($arg:tt)*) => {
        tracing::warn!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        )
    };
}

/// Macro for component-aware error logging
#[macro_export]
macro_rules! component_error {
    ($component:expr, $($arg:tt)*) => {
        tracing::error!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        )
    };
}

/// Macro for component-aware debug logging
#[macro_export]
macro_rules! component_debug {
    ($component:expr, $($arg:tt)*) => {
        tracing::debug!(
            component = %$component,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        )
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(component: Component, details: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(component: Component, reason: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(component: Component, context: &str, error: &dyn std::fmt::Display) {
    error!(
        component = %component,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Contextual logging helper for success conditions
pub fn log_success(component: Component, message: &str) {
    info!(
        component = %component,
        timestamp = format_timestamp(),
        "✅ {}",
        message
    );
}
