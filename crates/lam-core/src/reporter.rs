//! Reporter trait for dependency injection
//!
//! Long-running operations report progress through this trait so the core
//! stays independent of any particular terminal UI.

use lam_schema::{Addon, AddonId};

pub trait Reporter: Send + Sync {
    /// A new phase has started (e.g. "Resolving", "Fetching").
    fn section(&self, title: &str);

    /// An archive download has started.
    fn fetching(&self, id: &AddonId, label: &str);

    /// An addon was fetched and recorded.
    fn installed(&self, addon: &Addon);

    /// An item could not be installed.
    fn failed(&self, id: &AddonId, reason: &str);

    /// An item was deliberately not processed (nested collection, cancelled).
    fn skipped(&self, id: &AddonId, reason: &str);

    fn info(&self, msg: &str);

    fn success(&self, msg: &str);

    fn warning(&self, msg: &str);

    fn error(&self, msg: &str);

    /// Final summary of a batch.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title)
    }
    fn fetching(&self, id: &AddonId, label: &str) {
        (**self).fetching(id, label)
    }
    fn installed(&self, addon: &Addon) {
        (**self).installed(addon)
    }
    fn failed(&self, id: &AddonId, reason: &str) {
        (**self).failed(id, reason)
    }
    fn skipped(&self, id: &AddonId, reason: &str) {
        (**self).skipped(id, reason)
    }
    fn info(&self, msg: &str) {
        (**self).info(msg)
    }
    fn success(&self, msg: &str) {
        (**self).success(msg)
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg)
    }
    fn error(&self, msg: &str) {
        (**self).error(msg)
    }
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        (**self).summary(count, action, elapsed_secs)
    }
}

/// Reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _title: &str) {}
    fn fetching(&self, _id: &AddonId, _label: &str) {}
    fn installed(&self, _addon: &Addon) {}
    fn failed(&self, _id: &AddonId, _reason: &str) {}
    fn skipped(&self, _id: &AddonId, _reason: &str) {}
    fn info(&self, _msg: &str) {}
    fn success(&self, _msg: &str) {}
    fn warning(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
    fn summary(&self, _count: usize, _action: &str, _elapsed_secs: f64) {}
}
