//! lam - Left 4 Dead 2 addon manager
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! Installs Steam Workshop addons, keeps track of which ones are enabled,
//! and writes the enabled set into the game's `gameinfo.txt`.
//!
//! # Architecture
//!
//! - **Actor Pattern**: Registry access is serialized through
//!   `RegistryHandle`, so parallel collection downloads commit one at a time.
//! - **Owned lines**: the manifest patcher only ever rewrites lines carrying
//!   the `// lam:managed` marker.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.lam/
//! ├── config.toml     # User configuration
//! ├── registry.json   # Addon registry
//! └── updates/        # Staged self-updates
//!
//! <game root>/left4dead2/
//! ├── gameinfo.txt    # Engine manifest (patched)
//! └── addons/
//!     ├── *.vpk       # Loose archives
//!     └── workshop/   # Archives fetched by lam
//! ```

pub mod cmd;
pub mod config;
pub mod ops;
pub mod store;
pub mod ui;

pub use crate::store::RegistryHandle;
pub use lam_core::paths::*;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Version reported by the binary and compared by the self-updater.
pub const VERSION: &str = env!("LAM_VERSION");

#[derive(Debug, Parser)]
#[command(name = "lam")]
#[command(author, version = VERSION, about = "lam - Left 4 Dead 2 addon manager")]
pub struct Cli {
    /// Game installation directory
    #[arg(long, global = true, env = "LAM_GAME_ROOT")]
    pub game_root: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install Workshop items or collections
    Install {
        /// Item id, Workshop URL or steam:// link
        #[arg(required = true)]
        references: Vec<String>,
        /// Enable the installed addons and patch the manifest
        #[arg(long, short = 'e')]
        enable: bool,
        /// Parallel downloads (overrides config)
        #[arg(long, short = 'j')]
        workers: Option<usize>,
    },
    /// Remove addons and their archives
    Uninstall {
        /// Addon ids
        #[arg(required = true)]
        ids: Vec<String>,
        /// Do not update the manifest
        #[arg(long)]
        no_patch: bool,
    },
    /// Enable addons
    Enable {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Do not update the manifest
        #[arg(long)]
        no_patch: bool,
    },
    /// Disable addons
    Disable {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Do not update the manifest
        #[arg(long)]
        no_patch: bool,
    },
    /// Enable every installed addon
    EnableAll {
        #[arg(long)]
        no_patch: bool,
    },
    /// Disable every installed addon
    DisableAll {
        #[arg(long)]
        no_patch: bool,
    },
    /// Give an addon a custom name
    Rename {
        id: String,
        /// New name; omit to restore the archive title
        name: Option<String>,
    },
    /// List installed addons
    List {
        #[arg(long, value_enum, default_value_t = SortArg::Installed)]
        sort: SortArg,
        /// Only show enabled addons
        #[arg(long)]
        enabled: bool,
    },
    /// Search installed addons by name
    Search {
        query: String,
        #[arg(long, value_enum, default_value_t = SortArg::Installed)]
        sort: SortArg,
    },
    /// Write enabled addons into gameinfo.txt
    Patch {
        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove every lam entry from gameinfo.txt
    Unpatch,
    /// List archives on disk that lam does not track
    Orphans {
        /// Register them instead of listing
        #[arg(long)]
        adopt: bool,
    },
    /// Remove leftovers from interrupted downloads
    Clean,
    /// Show registry and manifest health
    Status,
    /// Update lam itself to the latest release
    #[command(name = "self-update")]
    SelfUpdate {
        /// Only check, do not download
        #[arg(long)]
        check: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SortArg {
    Installed,
    Name,
    Size,
    Newest,
}

impl From<SortArg> for lam_core::registry::SortKey {
    fn from(arg: SortArg) -> Self {
        use lam_core::registry::SortKey;
        match arg {
            SortArg::Installed => SortKey::Installed,
            SortArg::Name => SortKey::Name,
            SortArg::Size => SortKey::Size,
            SortArg::Newest => SortKey::Newest,
        }
    }
}
