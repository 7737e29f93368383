//! Unified UI output interface.
//!
//! Commands and the core's [`Reporter`] callbacks both go through
//! [`Output`], which forwards events to the UI actor.

use super::actor::{UiActor, UiEvent};
use lam_core::Reporter;
use lam_schema::{Addon, AddonId};
use std::sync::{OnceLock, mpsc};

static UI_ACTOR: OnceLock<mpsc::Sender<UiEvent>> = OnceLock::new();

fn get_actor_sender() -> mpsc::Sender<UiEvent> {
    UI_ACTOR
        .get_or_init(|| {
            let actor = UiActor::spawn();
            let sender = actor.sender();
            // Keep actor alive for program duration
            std::mem::forget(actor);
            sender
        })
        .clone()
}

/// A cloneable handle for sending UI events to the terminal actor.
#[derive(Clone, Debug)]
pub struct Output {
    sender: mpsc::Sender<UiEvent>,
    quiet: bool,
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

impl Output {
    pub fn new() -> Self {
        Self {
            sender: get_actor_sender(),
            quiet: false,
        }
    }

    /// Drop progress and info lines; warnings, errors and results still print.
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    fn send(&self, event: UiEvent) {
        let _ = self.sender.send(event);
    }

    fn chatty(&self, event: UiEvent) {
        if !self.quiet {
            self.send(event);
        }
    }

    pub fn section(&self, title: &str) {
        self.chatty(UiEvent::Header {
            title: title.to_string(),
        });
    }

    pub fn info(&self, msg: &str) {
        self.chatty(UiEvent::Info(msg.to_string()));
    }

    pub fn success(&self, msg: &str) {
        self.send(UiEvent::Success(msg.to_string()));
    }

    pub fn warning(&self, msg: &str) {
        self.send(UiEvent::Warning(msg.to_string()));
    }

    pub fn error(&self, msg: &str) {
        self.send(UiEvent::Error(msg.to_string()));
    }

    /// Resolves once every event sent so far has been printed.
    pub async fn wait_async(&self) {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.send(UiEvent::Sync(tx));
        let _ = rx.await;
    }
}

impl Reporter for Output {
    fn section(&self, title: &str) {
        Output::section(self, title);
    }

    fn fetching(&self, id: &AddonId, label: &str) {
        self.chatty(UiEvent::Fetching {
            id: id.to_string(),
            label: label.to_string(),
        });
    }

    fn installed(&self, addon: &Addon) {
        self.send(UiEvent::Installed {
            id: addon.id.to_string(),
            label: addon.display_name().to_string(),
            size: addon.size_bytes,
        });
    }

    fn failed(&self, id: &AddonId, reason: &str) {
        self.send(UiEvent::Failed {
            id: id.to_string(),
            reason: reason.to_string(),
        });
    }

    fn skipped(&self, id: &AddonId, reason: &str) {
        self.send(UiEvent::Skipped {
            id: id.to_string(),
            reason: reason.to_string(),
        });
    }

    fn info(&self, msg: &str) {
        Output::info(self, msg);
    }

    fn success(&self, msg: &str) {
        Output::success(self, msg);
    }

    fn warning(&self, msg: &str) {
        Output::warning(self, msg);
    }

    fn error(&self, msg: &str) {
        Output::error(self, msg);
    }

    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        self.send(UiEvent::Summary {
            count,
            action: action.to_string(),
            elapsed_secs,
        });
    }
}
