//! End-to-end tests that run the `lam` binary against a temporary game root.
//!
//! Nothing here touches the network: archives are placed on disk and
//! adopted, which exercises the same registry and patch paths as installs.

use std::path::PathBuf;
use std::process::{Command, Output};

use lam_core::io::vpk::build_single_file;
use tempfile::TempDir;

const GAMEINFO: &str = "\"GameInfo\"\r\n{\r\n\tFileSystem\r\n\t{\r\n\t\tSearchPaths\r\n\t\t{\r\n\t\t\tGame\tupdate\r\n\t\t\tGame\t|gameinfo_path|.\r\n\t\t}\r\n\t}\r\n}\r\n";

/// An isolated lam home and a minimal game installation.
struct TestContext {
    temp_dir: TempDir,
    lam_home: PathBuf,
    game_root: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let lam_home = temp_dir.path().join(".lam");
        let game_root = temp_dir.path().join("Left 4 Dead 2");
        let content = game_root.join("left4dead2");
        std::fs::create_dir_all(&content).expect("failed to create content dir");
        std::fs::write(content.join("gameinfo.txt"), GAMEINFO).expect("failed to write manifest");
        Self {
            temp_dir,
            lam_home,
            game_root,
        }
    }

    fn lam(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_lam"))
            .args(args)
            .env("HOME", self.temp_dir.path())
            .env("LAM_HOME", &self.lam_home)
            .env("LAM_GAME_ROOT", &self.game_root)
            .env_remove("LAM_LOG")
            .output()
            .expect("failed to run lam")
    }

    fn manifest(&self) -> String {
        std::fs::read_to_string(self.game_root.join("left4dead2/gameinfo.txt")).unwrap()
    }

    fn place_archive(&self, file: &str, title: &str) {
        let info = format!("\"AddonInfo\"\n{{\n\taddontitle \"{title}\"\n}}\n");
        let bytes = build_single_file(&[("addoninfo.txt", info.as_bytes())]);
        std::fs::write(self.game_root.join("left4dead2/addons").join(file), bytes).unwrap();
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.lam(&["--help"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Usage:"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    assert!(ctx.lam(&["--version"]).status.success());
}

#[test]
fn test_list_empty() {
    let ctx = TestContext::new();
    let output = ctx.lam(&["list"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("No addons installed"));
}

#[test]
fn test_invalid_game_root() {
    let ctx = TestContext::new();
    let missing = ctx.temp_dir.path().join("nowhere");
    let output = ctx.lam(&["--game-root", missing.to_str().unwrap(), "list"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid game root"));
}

#[test]
fn test_adopt_enable_patch_flow() {
    let ctx = TestContext::new();
    // Creates the addon directories.
    assert!(ctx.lam(&["status"]).status.success());
    ctx.place_archive("SpeedySurvivors.vpk", "Speedy Survivors");

    let output = ctx.lam(&["orphans"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("local:speedysurvivors"));

    assert!(ctx.lam(&["orphans", "--adopt"]).status.success());
    assert!(ctx.lam(&["enable", "local:speedysurvivors"]).status.success());

    let manifest = ctx.manifest();
    assert!(manifest.contains("SpeedySurvivors.vpk\"\t// lam:managed local:speedysurvivors\r\n"));
    assert!(ctx.lam(&["patch"]).status.success());
    assert_eq!(ctx.manifest(), manifest);

    let output = ctx.lam(&["search", "speedy"]);
    assert!(stdout(&output).contains("Speedy Survivors"));

    assert!(ctx.lam(&["rename", "local:speedysurvivors", "Fast"]).status.success());
    assert!(stdout(&ctx.lam(&["list"])).contains("Fast"));

    assert!(ctx.lam(&["disable", "local:speedysurvivors"]).status.success());
    assert_eq!(ctx.manifest(), GAMEINFO);
}

#[test]
fn test_enable_unknown_addon_fails() {
    let ctx = TestContext::new();
    let output = ctx.lam(&["enable", "123456"]);
    assert!(!output.status.success());
    assert_eq!(ctx.manifest(), GAMEINFO);
}

#[test]
fn test_unpatch_restores_manifest() {
    let ctx = TestContext::new();
    assert!(ctx.lam(&["status"]).status.success());
    ctx.place_archive("a.vpk", "A");
    assert!(ctx.lam(&["orphans", "--adopt"]).status.success());
    assert!(ctx.lam(&["enable-all", "--no-patch"]).status.success());
    assert_eq!(ctx.manifest(), GAMEINFO);

    assert!(ctx.lam(&["patch"]).status.success());
    assert_ne!(ctx.manifest(), GAMEINFO);
    assert!(ctx.lam(&["unpatch"]).status.success());
    assert_eq!(ctx.manifest(), GAMEINFO);
}
