//! An explicit logger handle passed through the environment, in place of
//! a global logging singleton. Backed by `tracing`, the way the rest of
//! this workspace logs.

use tracing::Span;

#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
}

impl Logger {
    pub fn new(component: &'static str) -> Self {
        Self {
            span: tracing::info_span!("remap_core", component),
        }
    }

    pub fn info(&self, message: &str) {
        let _enter = self.span.enter();
        tracing::info!("{message}");
    }

    pub fn warn(&self, message: &str) {
        let _enter = self.span.enter();
        tracing::warn!("{message}");
    }

    pub fn error(&self, message: &str) {
        let _enter = self.span.enter();
        tracing::error!("{message}");
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new("core")
    }
}
