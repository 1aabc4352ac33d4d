use std::collections::BTreeMap;
use tracing::{debug, error, info, trace, warn};

/// Context information for log messages
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component name (e.g., "session", "fetcher", "scheduler")
    pub component: String,
    /// Additional context fields, rendered in key order
    pub extra_fields: BTreeMap<String, String>,
}

impl LogContext {
    /// Create a new log context
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            extra_fields: BTreeMap::new(),
        }
    }

    /// Add extra field
    pub fn with_field(mut self, key: &str, value: impl ToString) -> Self {
        self.extra_fields.insert(key.to_string(), value.to_string());
        self
    }
}

/// Structured logger with context
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    pub(crate) context: LogContext,
}

impl StructuredLogger {
    /// Create a new structured logger with context
    pub fn new(context: LogContext) -> Self {
        Self { context }
    }

    /// Derive a logger with one more context field
    pub fn with_field(&self, key: &str, value: impl ToString) -> Self {
        Self::new(self.context.clone().with_field(key, value))
    }

    pub fn info(&self, message: &str) {
        info!(component = %self.context.component, fields = %self.extra(), "{}", message);
    }

    pub fn warn(&self, message: &str) {
        warn!(component = %self.context.component, fields = %self.extra(), "{}", message);
    }

    pub fn error(&self, message: &str) {
        error!(component = %self.context.component, fields = %self.extra(), "{}", message);
    }

    pub fn debug(&self, message: &str) {
        debug!(component = %self.context.component, fields = %self.extra(), "{}", message);
    }

    pub fn trace(&self, message: &str) {
        trace!(component = %self.context.component, fields = %self.extra(), "{}", message);
    }

    pub fn component(&self) -> &str {
        &self.context.component
    }

    fn extra(&self) -> String {
        self.context
            .extra_fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Create a logger for a specific component
pub fn get_logger(component: &str) -> StructuredLogger {
    StructuredLogger::new(LogContext::new(component))
}

/// Create a logger with full context
pub fn get_logger_with_context(context: LogContext) -> StructuredLogger {
    StructuredLogger::new(context)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_render_in_key_order() {
        let logger = get_logger("fetcher")
            .with_field("path", "/Chart")
            .with_field("attempt", 1);
        assert_eq!(logger.component(), "fetcher");
        assert_eq!(logger.extra(), "attempt=1,path=/Chart");
    }
}
