//! Command implementations.
//!
//! Every command gets a [`Session`] (home dir, config, output) and, when it
//! touches the game, an [`ops::Context`](crate::ops::Context) built from it.

pub mod clean;
pub mod completions;
pub mod install;
pub mod list;
pub mod orphans;
pub mod patch;
pub mod rename;
pub mod self_update;
pub mod status;
pub mod toggle;
pub mod uninstall;

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lam_core::root::GameRoot;
use lam_core::steam::SteamTransport;
use lam_schema::AddonId;

use crate::config::Config;
use crate::ops::{self, Context};
use crate::ui::Output;

/// Per-invocation state shared by every command.
#[derive(Debug, Clone)]
pub struct Session {
    pub home: PathBuf,
    pub config: Config,
    pub output: Output,
}

impl Session {
    /// Resolves the lam home and reads its config file.
    pub fn load(quiet: bool) -> Result<Self> {
        let home = crate::try_lam_home()
            .context("Could not determine the lam home directory; set LAM_HOME")?;
        std::fs::create_dir_all(&home)
            .with_context(|| format!("Failed to create {}", home.display()))?;
        let config = Config::load(&crate::config_path(&home))?;
        Ok(Self {
            home,
            config,
            output: Output::new().with_quiet(quiet),
        })
    }

    /// The game root from `--game-root`/`LAM_GAME_ROOT`, else the config file.
    pub fn game_root(&self, flag: Option<&Path>) -> Result<GameRoot> {
        let path = flag
            .map(Path::to_path_buf)
            .or_else(|| self.config.game_root.clone())
            .context("No game root configured; pass --game-root or set game_root in config.toml")?;
        Ok(GameRoot::open(path, &self.config.content_dir)?)
    }

    /// Opens the registry and wires the engine for `flag`'s game root.
    pub fn context(&self, flag: Option<&Path>) -> Result<Context> {
        let root = self.game_root(flag)?;
        let transport = SteamTransport::new(self.config.timeout())?;
        Context::open(
            self.home.clone(),
            self.config.clone(),
            root,
            Arc::new(transport),
            Arc::new(self.output.clone()),
        )
        .context("Failed to open the addon registry")
    }
}

/// Parses command-line addon ids (`123`, a Workshop URL or `local:<stem>`).
pub fn parse_ids(raw: &[String]) -> Result<Vec<AddonId>> {
    raw.iter()
        .map(|s| {
            s.parse::<AddonId>()
                .with_context(|| format!("Invalid addon id '{s}'"))
        })
        .collect()
}

/// Runs the patch cycle after a mutation unless the user opted out.
pub async fn repatch(ctx: &Context, output: &Output, no_patch: bool) -> Result<()> {
    if no_patch {
        output.info("Manifest not updated (--no-patch); run 'lam patch' to apply");
        return Ok(());
    }
    let report = ops::sync_manifest(ctx)
        .await
        .context("Failed to update gameinfo.txt")?;
    for id in &report.skipped_broken {
        output.warning(&format!("{id} is enabled but its archive is missing"));
    }
    if report.changed {
        output.info(&format!(
            "gameinfo.txt updated (+{} -{})",
            report.added.len(),
            report.removed.len()
        ));
    }
    Ok(())
}
