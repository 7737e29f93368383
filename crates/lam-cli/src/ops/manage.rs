//! Registry maintenance: uninstall, adoption of orphans and the patch cycle.

use lam_core::patcher::PatchReport;
use lam_core::store::{ArchiveKind, StoreError, Uninstalled};
use lam_schema::{Addon, AddonId};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::ops::{Context, InstallError};

/// Writes the current enabled set into the manifest.
pub async fn sync_manifest(ctx: &Context) -> Result<PatchReport, InstallError> {
    let addons = ctx.registry.snapshot().await?;
    let patcher = ctx.patcher.clone();
    let report = tokio::task::spawn_blocking(move || patcher.patch(&addons))
        .await
        .map_err(|e| InstallError::context("Patch task failed", e))??;
    ctx.registry.mark_patched().await?;
    Ok(report)
}

/// Removes `id` from disk and from the registry.
///
/// An entry whose archive is already gone is still dropped from the
/// registry.
pub async fn uninstall(ctx: &Context, id: &AddonId) -> Result<Addon, InstallError> {
    if ctx.registry.get(id.clone()).await?.is_none() {
        return Err(lam_core::registry::RegistryError::NotFound { id: id.clone() }.into());
    }
    match ctx.store.uninstall(id) {
        Ok(Uninstalled::Removed(path)) => debug!("deleted {}", path.display()),
        Ok(Uninstalled::AlreadyRemoved) => {}
        Err(StoreError::NotFound { .. }) => warn!("archive for {id} was already missing"),
        Err(e) => return Err(e.into()),
    }
    Ok(ctx.registry.uninstall(id.clone()).await?)
}

/// Registers every untracked VPK archive on disk.
///
/// Files that do not look like VPK archives are reported and left alone.
pub async fn adopt_orphans(ctx: &Context) -> Result<Vec<Addon>, InstallError> {
    let tracked: HashSet<AddonId> = ctx
        .registry
        .snapshot()
        .await?
        .into_iter()
        .map(|a| a.id)
        .collect();
    let orphans = ctx.store.list_orphans(|id| tracked.contains(id))?;

    let mut adopted = Vec::new();
    for info in orphans {
        if info.kind != ArchiveKind::Vpk {
            ctx.reporter
                .skipped(&info.id, "not a VPK archive, left untouched");
            continue;
        }
        let handle = ctx.store.inspect(&info)?;
        let addon = ctx.registry.register_local(handle).await?;
        ctx.reporter.installed(&addon);
        adopted.push(addon);
    }
    Ok(adopted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::testing::{GAMEINFO, context, payload};
    use lam_core::transport::MemoryTransport;
    use lam_schema::{MANAGED_MARKER, WorkshopId};

    #[tokio::test]
    async fn test_adopt_enable_patch_uninstall() {
        let (_dir, ctx) = context(MemoryTransport::new());
        let addons = ctx.root.addons_dir();
        std::fs::write(addons.join("Tank_Skin.vpk"), payload("Tank Skin")).unwrap();
        std::fs::write(addons.join("notes.vpk"), b"plain text").unwrap();

        let adopted = adopt_orphans(&ctx).await.unwrap();
        assert_eq!(adopted.len(), 1);
        let id = adopted[0].id.clone();
        assert_eq!(id.as_str(), "local:tank_skin");
        assert_eq!(adopted[0].title, "Tank Skin");

        ctx.registry.set_enabled(id.clone(), true).await.unwrap();
        let report = sync_manifest(&ctx).await.unwrap();
        assert_eq!(report.written, [id.clone()]);
        assert!(!ctx.registry.is_dirty().await.unwrap());
        let manifest = std::fs::read_to_string(ctx.root.manifest_path()).unwrap();
        assert!(manifest.contains(MANAGED_MARKER));
        assert!(manifest.contains("Tank_Skin.vpk"));

        uninstall(&ctx, &id).await.unwrap();
        assert!(!addons.join("Tank_Skin.vpk").exists());
        sync_manifest(&ctx).await.unwrap();
        let manifest = std::fs::read_to_string(ctx.root.manifest_path()).unwrap();
        assert_eq!(manifest, GAMEINFO);
    }

    #[tokio::test]
    async fn test_uninstall_unknown_id() {
        let (_dir, ctx) = context(MemoryTransport::new());
        let err = uninstall(&ctx, &AddonId::workshop(WorkshopId::new(5)))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not installed"));
    }

    #[tokio::test]
    async fn test_uninstall_with_missing_archive() {
        let (_dir, ctx) = context(MemoryTransport::new());
        let path = ctx.root.addons_dir().join("gone.vpk");
        std::fs::write(&path, payload("Gone")).unwrap();
        let adopted = adopt_orphans(&ctx).await.unwrap();
        std::fs::remove_file(&path).unwrap();

        let removed = uninstall(&ctx, &adopted[0].id).await.unwrap();
        assert_eq!(removed.id, adopted[0].id);
        assert!(ctx.registry.snapshot().await.unwrap().is_empty());
    }
}
