//! UI Actor - Single-threaded event processing
//!
//! Parallel fetch tasks report progress concurrently; routing every line
//! through one thread keeps their output from interleaving.

use super::theme::{Theme, format_size};
use crossterm::style::Stylize;
use std::sync::mpsc;
use std::thread;

/// Events that can be sent to the UI actor
#[derive(Debug)]
pub enum UiEvent {
    /// Print a section header
    Header { title: String },
    /// A download started
    Fetching { id: String, label: String },
    /// An addon was recorded
    Installed { id: String, label: String, size: u64 },
    Failed { id: String, reason: String },
    Skipped { id: String, reason: String },
    Info(String),
    Success(String),
    Warning(String),
    Error(String),
    /// Print summary with timing
    Summary {
        count: usize,
        action: String,
        elapsed_secs: f64,
    },
    /// Synchronize (wait for all pending prints)
    Sync(tokio::sync::oneshot::Sender<()>),
    /// Shutdown the actor
    Shutdown,
}

/// Handle to the UI actor thread
#[derive(Debug)]
pub struct UiActor {
    sender: mpsc::Sender<UiEvent>,
}

impl UiActor {
    /// Spawn a new UI actor thread
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || run_event_loop(receiver));
        Self { sender }
    }

    /// Get a cloneable sender for this actor
    pub fn sender(&self) -> mpsc::Sender<UiEvent> {
        self.sender.clone()
    }
}

impl Drop for UiActor {
    fn drop(&mut self) {
        let _ = self.sender.send(UiEvent::Shutdown);
    }
}

#[allow(clippy::needless_pass_by_value)]
fn run_event_loop(receiver: mpsc::Receiver<UiEvent>) {
    let theme = Theme::default();
    let colors = &theme.colors;
    let icons = &theme.icons;

    while let Ok(event) = receiver.recv() {
        match event {
            UiEvent::Header { title } => {
                println!();
                println!("{} {}", title.bold(), "─".repeat(40).with(colors.header));
            }
            UiEvent::Fetching { id, label } => {
                println!(
                    "  {} {} {}",
                    icons.enabled.with(colors.active),
                    format!("{id:<12}").with(colors.id),
                    label.with(colors.secondary)
                );
            }
            UiEvent::Installed { id, label, size } => {
                println!(
                    "  {} {} {} {}",
                    icons.success.with(colors.success),
                    format!("{id:<12}").with(colors.id),
                    label.with(colors.name),
                    format_size(size).with(colors.secondary)
                );
            }
            UiEvent::Failed { id, reason } => {
                eprintln!(
                    "  {} {} {}",
                    icons.error.with(colors.error),
                    format!("{id:<12}").with(colors.id),
                    reason.with(colors.error)
                );
            }
            UiEvent::Skipped { id, reason } => {
                println!(
                    "  {} {} {}",
                    icons.skipped.with(colors.warning),
                    format!("{id:<12}").with(colors.id),
                    reason.with(colors.secondary)
                );
            }
            UiEvent::Info(msg) => println!("  {} {msg}", icons.info),
            UiEvent::Success(msg) => {
                println!("  {} {}", icons.success.with(colors.success), msg.with(colors.success));
            }
            UiEvent::Warning(msg) => {
                eprintln!("  {} {}", icons.warning.with(colors.warning), msg.with(colors.warning));
            }
            UiEvent::Error(msg) => {
                eprintln!("  {} {}", icons.error.with(colors.error), msg.with(colors.error));
            }
            UiEvent::Summary {
                count,
                action,
                elapsed_secs,
            } => {
                let msg = format!(
                    "{count} addon{} {action} in {elapsed_secs:.1}s",
                    if count == 1 { "" } else { "s" }
                );
                println!();
                println!("  {} {}", icons.success.with(colors.success), msg.bold());
            }
            UiEvent::Sync(tx) => {
                let _ = tx.send(());
            }
            UiEvent::Shutdown => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_sync() {
        let actor = UiActor::spawn();
        let sender = actor.sender();
        sender.send(UiEvent::Info("test".to_string())).unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel();
        sender.send(UiEvent::Sync(tx)).unwrap();
        rx.blocking_recv().unwrap();
        drop(actor);
    }
}
