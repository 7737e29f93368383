//! Shared session context.
//!
//! Groups the engine components one command works with, so the game root
//! and configuration are passed explicitly instead of living in globals.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use lam_core::Reporter;
use lam_core::patcher::ConfigPatcher;
use lam_core::registry::AddonRegistry;
use lam_core::root::GameRoot;
use lam_core::store::ArchiveStore;
use lam_core::transport::Transport;
use lam_core::workshop::WorkshopResolver;

use crate::config::Config;
use crate::ops::InstallError;
use crate::store::RegistryHandle;

#[derive(Clone)]
pub struct Context {
    pub home: PathBuf,
    pub config: Config,
    pub root: GameRoot,
    pub resolver: WorkshopResolver,
    pub store: Arc<ArchiveStore>,
    pub patcher: Arc<ConfigPatcher>,
    pub registry: RegistryHandle,
    pub reporter: Arc<dyn Reporter>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("home", &self.home)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Wires the engine together and starts the registry actor.
    pub fn new(
        home: PathBuf,
        config: Config,
        root: GameRoot,
        registry: AddonRegistry,
        transport: Arc<dyn Transport>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            home,
            config,
            resolver: WorkshopResolver::new(transport.clone()),
            store: Arc::new(ArchiveStore::new(root.clone(), transport)),
            patcher: Arc::new(ConfigPatcher::new(root.clone())),
            registry: RegistryHandle::spawn(registry),
            root,
            reporter,
        }
    }

    /// Like [`new`](Self::new), loading the registry from `<home>/registry.json`.
    pub fn open(
        home: PathBuf,
        config: Config,
        root: GameRoot,
        transport: Arc<dyn Transport>,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, InstallError> {
        let registry = AddonRegistry::load(&crate::registry_path(&home))?;
        Ok(Self::new(home, config, root, registry, transport, reporter))
    }
}
