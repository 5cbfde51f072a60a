//! Finding output.
//!
//! This module handles:
//! - Severity routed log lines
//! - JSON lines output files

pub mod console;
pub mod jsonl;

pub use console::ConsoleSink;
pub use jsonl::JsonlSink;

use crate::types::Finding;

/// Receives every finding of a scan, possibly from many tasks at once.
pub trait FindingSink: Send + Sync {
    fn emit(&self, finding: &Finding);
}

impl<T: FindingSink + ?Sized> FindingSink for std::sync::Arc<T> {
    fn emit(&self, finding: &Finding) {
        (**self).emit(finding);
    }
}

/// Forwards each finding to several sinks in order.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn FindingSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl FindingSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl FindingSink for MultiSink {
    fn emit(&self, finding: &Finding) {
        for sink in &self.sinks {
            sink.emit(finding);
        }
    }
}

/// Sink that keeps findings in memory.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CollectingSink {
    pub findings: std::sync::Mutex<Vec<Finding>>,
}

#[cfg(test)]
impl CollectingSink {
    pub fn findings(&self) -> Vec<Finding> {
        self.findings.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl FindingSink for CollectingSink {
    fn emit(&self, finding: &Finding) {
        self.findings.lock().unwrap().push(finding.clone());
    }
}
