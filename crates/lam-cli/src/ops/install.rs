//! Addon installation.
//!
//! References are resolved one after another, then every resulting item is
//! fetched in parallel (bounded by a semaphore) and committed to the
//! registry through the actor. A failure only affects its own item; the
//! rest of the batch carries on.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use lam_schema::{Addon, AddonId, ItemDescriptor, ItemKind, WorkshopId};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::ops::{Context, InstallError};
use crate::store::RegistryHandle;
use lam_core::store::ArchiveStore;

/// Outcome of an install batch.
#[derive(Debug, Default)]
pub struct InstallReport {
    /// Recorded addons, in resolution order.
    pub installed: Vec<Addon>,
    /// References or items that failed, with the reason.
    pub failed: Vec<(String, String)>,
    /// Collections found inside collections; never expanded.
    pub nested: Vec<WorkshopId>,
    /// Items whose download never started because of cancellation.
    pub cancelled: Vec<AddonId>,
}

impl InstallReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.cancelled.is_empty()
    }
}

enum Outcome {
    Installed(Addon),
    Failed(InstallError),
    Cancelled,
}

/// Resolves `references` into items and installs all of them.
pub async fn install_references(
    ctx: &Context,
    references: &[String],
    workers: usize,
    cancel: &CancellationToken,
) -> InstallReport {
    let start = Instant::now();
    let mut report = InstallReport::default();

    ctx.reporter.section("Resolving");
    let queue = resolve_all(ctx, references, cancel, &mut report).await;
    if queue.is_empty() {
        return report;
    }

    ctx.reporter.section("Fetching");
    let results = fetch_all(ctx, queue, workers, cancel).await;

    for (descriptor, outcome) in results {
        let id = descriptor.addon_id();
        match outcome {
            Outcome::Installed(addon) => {
                ctx.reporter.installed(&addon);
                report.installed.push(addon);
            }
            Outcome::Failed(e) => {
                ctx.reporter.failed(&id, &e.to_string());
                report.failed.push((id.to_string(), e.to_string()));
            }
            Outcome::Cancelled => {
                ctx.reporter.skipped(&id, "cancelled");
                report.cancelled.push(id);
            }
        }
    }

    if !report.installed.is_empty() {
        ctx.reporter
            .summary(report.installed.len(), "installed", start.elapsed().as_secs_f64());
    }
    report
}

async fn resolve_all(
    ctx: &Context,
    references: &[String],
    cancel: &CancellationToken,
    report: &mut InstallReport,
) -> Vec<ItemDescriptor> {
    let mut seen = HashSet::new();
    let mut queue = Vec::new();

    for reference in references {
        if cancel.is_cancelled() {
            report
                .failed
                .push((reference.clone(), "cancelled before resolution".to_string()));
            continue;
        }
        let items = match ctx.resolver.resolve(reference).await {
            Ok(items) => items,
            Err(e) => {
                ctx.reporter.error(&format!("{reference}: {e}"));
                report.failed.push((reference.clone(), e.to_string()));
                continue;
            }
        };
        debug!("{reference} resolved to {} items", items.len());

        for item in items {
            if !seen.insert(item.id) {
                continue;
            }
            if item.kind == ItemKind::Collection {
                ctx.reporter
                    .skipped(&item.addon_id(), "nested collection, install it separately");
                report.nested.push(item.id);
                continue;
            }
            if let Some(reason) = &item.unavailable {
                ctx.reporter.failed(&item.addon_id(), reason);
                report.failed.push((item.id.to_string(), reason.clone()));
                continue;
            }
            queue.push(item);
        }
    }
    queue
}

async fn fetch_all(
    ctx: &Context,
    queue: Vec<ItemDescriptor>,
    workers: usize,
    cancel: &CancellationToken,
) -> Vec<(ItemDescriptor, Outcome)> {
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();
    let total = queue.len();

    for (idx, descriptor) in queue.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let store = ctx.store.clone();
        let registry = ctx.registry.clone();
        let reporter = ctx.reporter.clone();
        let cancel = cancel.clone();

        set.spawn(async move {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            };
            let Some(_permit) = permit else {
                return (idx, descriptor, Outcome::Cancelled);
            };
            if cancel.is_cancelled() {
                return (idx, descriptor, Outcome::Cancelled);
            }

            let label = descriptor.title.clone().unwrap_or_default();
            reporter.fetching(&descriptor.addon_id(), &label);
            let outcome = match install_one(&store, &registry, &descriptor).await {
                Ok(addon) => Outcome::Installed(addon),
                Err(e) => Outcome::Failed(e),
            };
            (idx, descriptor, outcome)
        });
    }

    let mut results = Vec::with_capacity(total);
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!("install task panicked: {e}"),
        }
    }
    results.sort_by_key(|(idx, _, _)| *idx);
    results
        .into_iter()
        .map(|(_, descriptor, outcome)| (descriptor, outcome))
        .collect()
}

async fn install_one(
    store: &ArchiveStore,
    registry: &RegistryHandle,
    descriptor: &ItemDescriptor,
) -> Result<Addon, InstallError> {
    let handle = store.fetch(descriptor).await?;
    let addon = registry.install(descriptor.clone(), handle).await?;
    Ok(addon)
}
